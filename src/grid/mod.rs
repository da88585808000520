//! Uniform grid index over ways.
//!
//! Coordinate space is cut into square cells of `cell_size` fixed-point
//! units. Every cell touched by at least one node of a way holds that way in
//! its bucket. A bbox query enumerates the cells covering the box and unions
//! their buckets, so its cost follows the covered area, not the dataset size.

use crate::model::{NodeTable, Way, WayId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::num::NonZeroU32;

/// Axis-aligned box in 1e-7 degree units, bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bbox {
    pub west: i64,
    pub south: i64,
    pub east: i64,
    pub north: i64,
}

impl Bbox {
    pub fn new(west: i64, south: i64, east: i64, north: i64) -> Self {
        Bbox {
            west,
            south,
            east,
            north,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.west <= self.east && self.south <= self.north
    }
}

impl fmt::Display for Bbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bbox {{{} {} {} {}}}",
            self.west, self.south, self.east, self.north
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub lat: i64,
    pub lon: i64,
}

impl CellKey {
    /// Floor division, so cells stay uniform on both sides of zero. Negative
    /// coordinates that are not multiples of the cell size land one cell lower
    /// than with truncating division, which folds `-size+1..size` into cell 0.
    pub fn of(lat: i64, lon: i64, cell_size: i64) -> Self {
        CellKey {
            lat: lat.div_euclid(cell_size),
            lon: lon.div_euclid(cell_size),
        }
    }

    fn within(&self, start: &CellKey, end: &CellKey) -> bool {
        (start.lat..=end.lat).contains(&self.lat) && (start.lon..=end.lon).contains(&self.lon)
    }
}

#[derive(Debug)]
pub struct Grid {
    cell_size: i64,
    ways: Vec<Way>,
    by_id: HashMap<WayId, usize>,
    cells: HashMap<CellKey, Vec<usize>>,
}

impl Grid {
    pub fn new(cell_size: NonZeroU32) -> Self {
        Grid {
            cell_size: i64::from(cell_size.get()),
            ways: Vec::new(),
            by_id: HashMap::new(),
            cells: HashMap::new(),
        }
    }

    fn cells_of(&self, way: &Way, nodes: &NodeTable) -> BTreeSet<CellKey> {
        way.nodes
            .iter()
            .map(|idx| {
                let node = nodes.node(*idx);
                CellKey::of(node.lat, node.lon, self.cell_size)
            })
            .collect()
    }

    /// Indexes a way under every distinct cell its nodes fall into.
    ///
    /// A way whose id is already indexed replaces the earlier one, including
    /// its cell memberships.
    pub fn add_way(&mut self, way: Way, nodes: &NodeTable) {
        let keys = self.cells_of(&way, nodes);
        let slot = match self.by_id.get(&way.id) {
            Some(&slot) => {
                for key in self.cells_of(&self.ways[slot], nodes) {
                    if let Some(bucket) = self.cells.get_mut(&key) {
                        bucket.retain(|s| *s != slot);
                        if bucket.is_empty() {
                            self.cells.remove(&key);
                        }
                    }
                }
                self.ways[slot] = way;
                slot
            }
            None => {
                let slot = self.ways.len();
                self.by_id.insert(way.id, slot);
                self.ways.push(way);
                slot
            }
        };
        for key in keys {
            self.cells.entry(key).or_default().push(slot);
        }
    }

    /// Ways indexed in any cell covered by one of the boxes, each once,
    /// ordered by way id.
    pub fn select_by_bboxes(&self, bboxes: &[Bbox]) -> Vec<&Way> {
        let mut slots = HashSet::new();
        for bbox in bboxes {
            let start = CellKey::of(bbox.south, bbox.west, self.cell_size);
            let end = CellKey::of(bbox.north, bbox.east, self.cell_size);
            if start.lat > end.lat || start.lon > end.lon {
                continue;
            }
            let lat_span = (i128::from(end.lat) - i128::from(start.lat) + 1) as u128;
            let lon_span = (i128::from(end.lon) - i128::from(start.lon) + 1) as u128;
            if lat_span.saturating_mul(lon_span) > self.cells.len() as u128 {
                for (key, bucket) in &self.cells {
                    if key.within(&start, &end) {
                        slots.extend(bucket.iter().copied());
                    }
                }
            } else {
                for lat in start.lat..=end.lat {
                    for lon in start.lon..=end.lon {
                        if let Some(bucket) = self.cells.get(&CellKey { lat, lon }) {
                            slots.extend(bucket.iter().copied());
                        }
                    }
                }
            }
        }
        let mut ways: Vec<&Way> = slots.into_iter().map(|slot| &self.ways[slot]).collect();
        ways.sort_by_key(|way| way.id);
        ways
    }

    pub fn way(&self, id: WayId) -> Option<&Way> {
        self.by_id.get(&id).map(|slot| &self.ways[*slot])
    }

    pub fn way_count(&self) -> usize {
        self.ways.len()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    #[cfg(test)]
    fn bucket(&self, key: CellKey) -> &[usize] {
        self.cells.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Node;

    const CELL: i64 = 10;

    fn grid() -> Grid {
        Grid::new(NonZeroU32::new(CELL as u32).unwrap())
    }

    fn way(id: WayId, nodes: &mut NodeTable, coords: &[(i64, i64)]) -> Way {
        let nodes = coords
            .iter()
            .enumerate()
            .map(|(i, (lat, lon))| {
                nodes.insert(Node {
                    id: id * 1000 + i as i64,
                    lat: *lat,
                    lon: *lon,
                    tags: vec![],
                })
            })
            .collect();
        Way {
            id,
            nodes,
            tags: vec![],
        }
    }

    fn ids(ways: Vec<&Way>) -> Vec<WayId> {
        ways.into_iter().map(|way| way.id).collect()
    }

    #[test]
    fn way_is_bucketed_once_per_cell() {
        let mut nodes = NodeTable::new();
        let mut grid = grid();
        // zig-zags across the 0/1 cell border
        let w = way(1, &mut nodes, &[(1, 1), (12, 1), (2, 2), (13, 3)]);
        grid.add_way(w, &nodes);

        assert_eq!(grid.cell_count(), 2);
        assert_eq!(grid.bucket(CellKey { lat: 0, lon: 0 }), &[0]);
        assert_eq!(grid.bucket(CellKey { lat: 1, lon: 0 }), &[0]);
    }

    #[test]
    fn adding_the_same_way_twice_does_not_duplicate() {
        let mut nodes = NodeTable::new();
        let mut grid = grid();
        let w = way(1, &mut nodes, &[(1, 1), (25, 25)]);
        grid.add_way(w.clone(), &nodes);
        grid.add_way(w, &nodes);

        assert_eq!(grid.way_count(), 1);
        assert_eq!(grid.bucket(CellKey { lat: 0, lon: 0 }), &[0]);
        assert_eq!(grid.bucket(CellKey { lat: 2, lon: 2 }), &[0]);
    }

    #[test]
    fn replaced_way_leaves_its_old_cells() {
        let mut nodes = NodeTable::new();
        let mut grid = grid();
        grid.add_way(way(1, &mut nodes, &[(1, 1)]), &nodes);
        grid.add_way(way(1, &mut nodes, &[(55, 55)]), &nodes);

        assert_eq!(grid.way_count(), 1);
        assert!(grid.select_by_bboxes(&[Bbox::new(0, 0, 9, 9)]).is_empty());
        assert_eq!(ids(grid.select_by_bboxes(&[Bbox::new(50, 50, 59, 59)])), [1]);
    }

    #[test]
    fn selects_ways_inside_and_skips_ways_outside() {
        let mut nodes = NodeTable::new();
        let mut grid = grid();
        grid.add_way(way(1, &mut nodes, &[(12, 12), (15, 18)]), &nodes);
        grid.add_way(way(2, &mut nodes, &[(500, 500), (510, 505)]), &nodes);

        let bbox = Bbox::new(10, 10, 20, 20);
        assert_eq!(ids(grid.select_by_bboxes(&[bbox])), [1]);
        assert!(grid
            .select_by_bboxes(&[Bbox::new(-100, -100, -50, -50)])
            .is_empty());
    }

    #[test]
    fn overlapping_boxes_return_way_once() {
        let mut nodes = NodeTable::new();
        let mut grid = grid();
        grid.add_way(way(3, &mut nodes, &[(12, 12), (35, 35)]), &nodes);
        grid.add_way(way(1, &mut nodes, &[(14, 14)]), &nodes);

        let boxes = [Bbox::new(0, 0, 20, 20), Bbox::new(10, 10, 40, 40)];
        assert_eq!(ids(grid.select_by_bboxes(&boxes)), [1, 3]);
    }

    #[test]
    fn node_on_cell_boundary_is_found_from_both_sides() {
        let mut nodes = NodeTable::new();
        let mut grid = grid();
        grid.add_way(way(1, &mut nodes, &[(20, 20)]), &nodes);

        // boxes ending or starting exactly on the node both cover its cell
        assert_eq!(ids(grid.select_by_bboxes(&[Bbox::new(15, 15, 20, 20)])), [1]);
        assert_eq!(ids(grid.select_by_bboxes(&[Bbox::new(20, 20, 25, 25)])), [1]);
    }

    #[test]
    fn negative_coordinates_use_floor_cells() {
        let mut nodes = NodeTable::new();
        let mut grid = grid();
        grid.add_way(way(1, &mut nodes, &[(-5, -5)]), &nodes);

        assert_eq!(CellKey::of(-5, -5, CELL), CellKey { lat: -1, lon: -1 });
        assert_eq!(ids(grid.select_by_bboxes(&[Bbox::new(-9, -9, -1, -1)])), [1]);
        assert!(grid.select_by_bboxes(&[Bbox::new(0, 0, 9, 9)]).is_empty());
    }

    #[test]
    fn huge_box_scans_populated_cells() {
        let mut nodes = NodeTable::new();
        let mut grid = grid();
        grid.add_way(way(1, &mut nodes, &[(12, 12)]), &nodes);
        grid.add_way(way(2, &mut nodes, &[(-900_000, 900_000)]), &nodes);

        let world = Bbox::new(i64::MIN, i64::MIN, i64::MAX, i64::MAX);
        assert_eq!(ids(grid.select_by_bboxes(&[world])), [1, 2]);
    }

    #[test]
    fn inverted_box_selects_nothing() {
        let mut nodes = NodeTable::new();
        let mut grid = grid();
        grid.add_way(way(1, &mut nodes, &[(12, 12)]), &nodes);
        assert!(grid.select_by_bboxes(&[Bbox::new(20, 20, 10, 10)]).is_empty());
    }
}
