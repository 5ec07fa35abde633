//! Pixel-aligned point trees for pair counting.
//!
//! A [`TreePixel`] indexes catalog points under one root pixel. Nodes live in
//! an arena and refer to each other by index: a leaf holds its points until
//! it has more than `capacity`, then splits into its four child pixels and
//! hands the points down. Every node keeps its point count, weight sum and
//! a bounding cap, so a separation query can accept or reject whole subtrees
//! and only scans the leaves its bins cut through.
//!
//! [`TreeMap`] spreads a catalog over as many roots as needed at a fixed
//! level, optionally restricted to a footprint [`Map`].

use std::collections::BTreeMap;

use celestial_core::constants::PI;
use celestial_core::{spherical, Vector3};
use tracing::debug;

use crate::bins::Bin;
use crate::coordinate::{AngularCoordinate, CatalogPoint, WeightedAngularCoordinate};
use crate::errors::{ClusteringError, ClusteringResult};
use crate::map::Map;
use crate::pixel::{check_level, locate, Pixel, MAX_LEVEL};
use crate::region::RegionMap;

/// Points a leaf holds before it splits.
pub const DEFAULT_NODE_CAPACITY: usize = 200;

const ROOT: usize = 0;

/// The intensity-weighted tree.
pub type ITreePixel = TreePixel<WeightedAngularCoordinate>;

/// Point count and weight of one jackknife region inside a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct RegionTally {
    pub region: u16,
    pub count: u64,
    pub weight: f64,
}

fn add_tally(tallies: &mut Vec<RegionTally>, region: u16, count: u64, weight: f64) {
    match tallies.iter_mut().find(|t| t.region == region) {
        Some(t) => {
            t.count += count;
            t.weight += weight;
        }
        None => tallies.push(RegionTally {
            region,
            count,
            weight,
        }),
    }
}

#[derive(Debug, Clone)]
struct Entry<P> {
    point: P,
    /// Grid position at the finest level.
    xy: (u64, u64),
    region: Option<u16>,
}

#[derive(Debug, Clone)]
struct Node<P> {
    pixel: Pixel,
    parent: Option<usize>,
    children: Option<[usize; 4]>,
    entries: Vec<Entry<P>>,
    count: u64,
    weight: f64,
    center: Vector3,
    radius: f64,
    regions: Vec<RegionTally>,
}

impl<P> Node<P> {
    fn new(pixel: Pixel, parent: Option<usize>) -> Self {
        Self {
            pixel,
            parent,
            children: None,
            entries: Vec::new(),
            count: 0,
            weight: 0.0,
            center: pixel.center_vector(),
            radius: pixel.bounding_radius(),
            regions: Vec::new(),
        }
    }
}

/// Slot of the child of `parent` holding grid position `xy`.
fn child_slot(parent: &Pixel, xy: (u64, u64)) -> usize {
    let child = Pixel::from_max_xy(xy.0, xy.1, parent.level() + 1);
    (child.index() & 3) as usize
}

/// Index of the window holding `separation`.
pub(crate) fn window_of(windows: &[(f64, f64)], separation: f64) -> Option<usize> {
    let index = windows.partition_point(|w| w.1 <= separation);
    windows
        .get(index)
        .filter(|w| separation >= w.0)
        .map(|_| index)
}

/// A hierarchical point index under one root pixel.
#[derive(Debug, Clone)]
pub struct TreePixel<P> {
    nodes: Vec<Node<P>>,
    capacity: usize,
}

impl<P: CatalogPoint> TreePixel<P> {
    /// An empty tree rooted at `pixel`.
    pub fn new(pixel: Pixel, capacity: usize) -> ClusteringResult<Self> {
        if capacity == 0 {
            return Err(ClusteringError::invalid_pixel(
                "node capacity must be at least one",
            ));
        }
        Ok(Self {
            nodes: vec![Node::new(pixel, None)],
            capacity,
        })
    }

    pub fn pixel(&self) -> Pixel {
        self.nodes[ROOT].pixel
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn point_count(&self) -> u64 {
        self.nodes[ROOT].count
    }

    /// Sum of point weights.
    pub fn weight(&self) -> f64 {
        self.nodes[ROOT].weight
    }

    pub fn is_empty(&self) -> bool {
        self.point_count() == 0
    }

    /// Number of nodes, leaves included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Finest level reached by any node.
    pub fn depth(&self) -> u8 {
        self.nodes.iter().map(|n| n.pixel.level()).max().unwrap_or(0)
    }

    /// Every stored point, leaf by leaf.
    pub fn points(&self) -> impl Iterator<Item = &P> {
        self.nodes
            .iter()
            .flat_map(|n| n.entries.iter().map(|e| &e.point))
    }

    /// Inserts `point`. Fails without touching the tree when the point lies
    /// outside the root pixel or has a non-finite weight.
    pub fn add_point(&mut self, point: P) -> ClusteringResult<()> {
        let weight = point.weight();
        if !weight.is_finite() {
            return Err(ClusteringError::invalid_weight(
                weight,
                "point weights must be finite",
            ));
        }
        let xy = locate(point.coordinate());
        let root = self.nodes[ROOT].pixel;
        if Pixel::from_max_xy(xy.0, xy.1, root.level()) != root {
            return Err(ClusteringError::out_of_bounds(format!(
                "point ({:.6}, {:.6}) lies outside {}",
                point.coordinate().longitude(),
                point.coordinate().latitude(),
                root
            )));
        }
        self.insert_from(
            ROOT,
            Entry {
                point,
                xy,
                region: None,
            },
        );
        Ok(())
    }

    fn insert_from(&mut self, start: usize, entry: Entry<P>) {
        let weight = entry.point.weight();
        let mut id = start;
        loop {
            let node = &mut self.nodes[id];
            node.count += 1;
            node.weight += weight;
            if let Some(region) = entry.region {
                add_tally(&mut node.regions, region, 1, weight);
            }
            match node.children {
                Some(children) => id = children[child_slot(&node.pixel, entry.xy)],
                None => {
                    node.entries.push(entry);
                    let full = node.entries.len() > self.capacity && node.pixel.level() < MAX_LEVEL;
                    if full {
                        self.split(id);
                    }
                    return;
                }
            }
        }
    }

    /// Turns leaf `id` into an internal node and pushes its points down.
    /// Counts on `id` already include them, so they are re-added from the
    /// children only.
    fn split(&mut self, id: usize) {
        let pixel = self.nodes[id].pixel;
        let Ok(child_pixels) = pixel.children() else {
            return;
        };
        let first = self.nodes.len();
        self.nodes
            .extend(child_pixels.iter().map(|c| Node::new(*c, Some(id))));
        let ids = [first, first + 1, first + 2, first + 3];
        let entries = std::mem::take(&mut self.nodes[id].entries);
        self.nodes[id].children = Some(ids);
        for entry in entries {
            let slot = child_slot(&pixel, entry.xy);
            self.insert_from(ids[slot], entry);
        }
    }

    /// Tags every point with its jackknife region and rebuilds the per-node
    /// region tallies, walking up from each leaf.
    pub fn assign_regions(&mut self, regions: &RegionMap) {
        for node in &mut self.nodes {
            node.regions.clear();
            for entry in &mut node.entries {
                entry.region = regions.region_of(entry.point.coordinate());
            }
        }
        for leaf in 0..self.nodes.len() {
            let tallies: Vec<(u16, f64)> = self.nodes[leaf]
                .entries
                .iter()
                .filter_map(|e| e.region.map(|r| (r, e.point.weight())))
                .collect();
            for (region, weight) in tallies {
                let mut id = Some(leaf);
                while let Some(current) = id {
                    let node = &mut self.nodes[current];
                    add_tally(&mut node.regions, region, 1, weight);
                    id = node.parent;
                }
            }
        }
    }

    /// Walks the tree against sorted, disjoint angular `windows` (radians)
    /// about `center`. `visit(window, count, weight, regions)` receives each
    /// accepted node or point.
    pub(crate) fn walk<F>(&self, center: &Vector3, windows: &[(f64, f64)], visit: &mut F)
    where
        F: FnMut(usize, u64, f64, &[RegionTally]),
    {
        let (Some(first), Some(last)) = (windows.first(), windows.last()) else {
            return;
        };
        if self.is_empty() {
            return;
        }
        let (lo_all, hi_all) = (first.0, last.1);
        let mut stack = vec![ROOT];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            if node.count == 0 {
                continue;
            }
            let d = spherical::angular_separation(center, &node.center);
            let near = (d - node.radius).max(0.0);
            let far = (d + node.radius).min(PI);
            if far < lo_all || near >= hi_all {
                continue;
            }
            let whole = window_of(windows, near)
                .filter(|k| Some(*k) == window_of(windows, far));
            if let Some(k) = whole {
                visit(k, node.count, node.weight, &node.regions);
                continue;
            }
            match node.children {
                Some(children) => stack.extend(children),
                None => {
                    for entry in &node.entries {
                        let s = spherical::angular_separation(
                            center,
                            entry.point.coordinate().unit_vector(),
                        );
                        if let Some(k) = window_of(windows, s) {
                            let weight = entry.point.weight();
                            match entry.region {
                                Some(region) => visit(
                                    k,
                                    1,
                                    weight,
                                    &[RegionTally {
                                        region,
                                        count: 1,
                                        weight,
                                    }],
                                ),
                                None => visit(k, 1, weight, &[]),
                            }
                        }
                    }
                }
            }
        }
    }

    /// Number of points whose separation from `center` falls in `bin`
    /// (degrees).
    pub fn find_pairs(&self, center: &AngularCoordinate, bin: &Bin) -> u64 {
        let mut pairs = 0;
        self.walk(
            center.unit_vector(),
            &[(bin.lower().to_radians(), bin.upper().to_radians())],
            &mut |_, count, _, _| pairs += count,
        );
        pairs
    }

    /// Sum of point weights whose separation from `center` falls in `bin`.
    pub fn find_weighted_pairs(&self, center: &AngularCoordinate, bin: &Bin) -> f64 {
        let mut weight = 0.0;
        self.walk(
            center.unit_vector(),
            &[(bin.lower().to_radians(), bin.upper().to_radians())],
            &mut |_, _, w, _| weight += w,
        );
        weight
    }
}

/// A catalog spread over tree roots at a fixed level.
#[derive(Debug, Clone)]
pub struct TreeMap<P> {
    roots: BTreeMap<Pixel, TreePixel<P>>,
    root_level: u8,
    capacity: usize,
    footprint: Option<Map>,
}

impl<P: CatalogPoint> TreeMap<P> {
    pub fn new(root_level: u8, capacity: usize) -> ClusteringResult<Self> {
        check_level(root_level)?;
        if capacity == 0 {
            return Err(ClusteringError::invalid_pixel(
                "node capacity must be at least one",
            ));
        }
        Ok(Self {
            roots: BTreeMap::new(),
            root_level,
            capacity,
            footprint: None,
        })
    }

    /// A tree that only accepts points inside `footprint`.
    pub fn bounded(footprint: Map, root_level: u8, capacity: usize) -> ClusteringResult<Self> {
        let mut tree = Self::new(root_level, capacity)?;
        tree.footprint = Some(footprint);
        Ok(tree)
    }

    /// Builds an unbounded tree from `points`.
    pub fn from_points<I>(points: I, root_level: u8, capacity: usize) -> ClusteringResult<Self>
    where
        I: IntoIterator<Item = P>,
    {
        let mut tree = Self::new(root_level, capacity)?;
        for point in points {
            tree.add_point(point)?;
        }
        debug!(
            points = tree.point_count(),
            roots = tree.roots.len(),
            "built point tree"
        );
        Ok(tree)
    }

    pub fn add_point(&mut self, point: P) -> ClusteringResult<()> {
        if let Some(footprint) = &self.footprint {
            if !footprint.contains(point.coordinate()) {
                return Err(ClusteringError::out_of_bounds(format!(
                    "point ({:.6}, {:.6}) lies outside the footprint",
                    point.coordinate().longitude(),
                    point.coordinate().latitude()
                )));
            }
        }
        let pixel = Pixel::from_coordinate(point.coordinate(), self.root_level)?;
        match self.roots.get_mut(&pixel) {
            Some(root) => root.add_point(point),
            None => {
                let mut root = TreePixel::new(pixel, self.capacity)?;
                root.add_point(point)?;
                self.roots.insert(pixel, root);
                Ok(())
            }
        }
    }

    pub fn root_level(&self) -> u8 {
        self.root_level
    }

    pub fn roots(&self) -> impl Iterator<Item = &TreePixel<P>> {
        self.roots.values()
    }

    pub fn point_count(&self) -> u64 {
        self.roots.values().map(TreePixel::point_count).sum()
    }

    pub fn weight(&self) -> f64 {
        self.roots.values().map(TreePixel::weight).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn points(&self) -> impl Iterator<Item = &P> {
        self.roots.values().flat_map(TreePixel::points)
    }

    pub fn assign_regions(&mut self, regions: &RegionMap) {
        for root in self.roots.values_mut() {
            root.assign_regions(regions);
        }
    }

    pub(crate) fn walk<F>(&self, center: &Vector3, windows: &[(f64, f64)], visit: &mut F)
    where
        F: FnMut(usize, u64, f64, &[RegionTally]),
    {
        for root in self.roots.values() {
            root.walk(center, windows, visit);
        }
    }

    pub fn find_pairs(&self, center: &AngularCoordinate, bin: &Bin) -> u64 {
        self.roots.values().map(|r| r.find_pairs(center, bin)).sum()
    }

    pub fn find_weighted_pairs(&self, center: &AngularCoordinate, bin: &Bin) -> f64 {
        self.roots
            .values()
            .map(|r| r.find_weighted_pairs(center, bin))
            .sum()
    }
}
