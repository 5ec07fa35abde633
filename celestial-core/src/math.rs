/// Composite Simpson integration of `f` over `[a, b]` with `intervals`
/// sub-intervals (rounded up to the next even number, minimum 2).
pub fn simpson<F: Fn(f64) -> f64>(f: F, a: f64, b: f64, intervals: usize) -> f64 {
    if a == b {
        return 0.0;
    }
    let n = intervals.max(2) + intervals.max(2) % 2;
    let h = (b - a) / n as f64;

    let mut sum = f(a) + f(b);
    for i in 1..n {
        let x = a + i as f64 * h;
        sum += if i % 2 == 1 { 4.0 * f(x) } else { 2.0 * f(x) };
    }
    sum * h / 3.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_simpson_polynomial_is_exact() {
        let integral = simpson(|x| x * x * x - 2.0 * x, 0.0, 2.0, 3);
        assert_relative_eq!(integral, 0.0, epsilon = 1e-12);

        let integral = simpson(|x| x * x, 0.0, 3.0, 10);
        assert_relative_eq!(integral, 9.0, epsilon = 1e-12);
    }

    #[test]
    fn test_simpson_empty_interval() {
        assert_eq!(simpson(|x| x, 1.0, 1.0, 8), 0.0);
    }
}
