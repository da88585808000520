use super::Dataset;
use crate::error::{Error, Result};
use crate::grid::Grid;
use crate::model::{Node, NodeIdx, NodeTable, StrIdx, StringTable, Tag, Way};
use crate::pbf::proto::{DenseNodes, HeaderBlock, PrimitiveBlock, Way as PbfWay};
use crate::pbf::TypedBlock;
use crate::state::StateMarker;
use std::num::NonZeroU32;
use std::str;
use tracing::{debug, info};

const SUPPORTED_FEATURES: &[&str] = &["OsmSchema-V0.6", "DenseNodes"];

/// Nanodegrees per coordinate unit of the dataset.
const NANODEGREES_PER_UNIT: i64 = 100;

/// Accumulates decoded blocks into a `Dataset`.
pub struct DatasetBuilder {
    strings: StringTable,
    nodes: NodeTable,
    grid: Grid,
    skipped_ways: usize,
    partial_ways: usize,
}

/// Node references of a way after resolution against the node table.
#[derive(Debug, PartialEq)]
pub struct ResolvedRefs {
    pub nodes: Vec<NodeIdx>,
    /// At least one reference did not resolve.
    pub missing: bool,
}

/// Resolves delta-encoded way refs.
///
/// Unresolved refs before the first hit are skipped. An unresolved ref after
/// a hit ends the way there, keeping the contiguous prefix.
pub fn resolve_refs(refs: &[i64], nodes: &NodeTable) -> ResolvedRefs {
    let mut resolved = Vec::with_capacity(refs.len());
    let mut missing = false;
    let mut id = 0i64;
    for delta in refs {
        id = id.wrapping_add(*delta);
        match nodes.index_of(id) {
            Some(idx) => resolved.push(idx),
            None => {
                missing = true;
                if !resolved.is_empty() {
                    break;
                }
            }
        }
    }
    ResolvedRefs {
        nodes: resolved,
        missing,
    }
}

/// Undoes the delta coding of dense nodes, yielding raw `(id, lat, lon)`.
pub fn decode_dense(dense: &DenseNodes) -> Result<Vec<(i64, i64, i64)>> {
    if dense.lat.len() != dense.id.len() || dense.lon.len() != dense.id.len() {
        return Err(Error::framing(format!(
            "dense nodes have {} ids, {} lats and {} lons",
            dense.id.len(),
            dense.lat.len(),
            dense.lon.len()
        )));
    }
    let (mut id, mut lat, mut lon) = (0i64, 0i64, 0i64);
    let decoded = dense
        .id
        .iter()
        .zip(&dense.lat)
        .zip(&dense.lon)
        .map(|((d_id, d_lat), d_lon)| {
            id = id.wrapping_add(*d_id);
            lat = lat.wrapping_add(*d_lat);
            lon = lon.wrapping_add(*d_lon);
            (id, lat, lon)
        })
        .collect();
    Ok(decoded)
}

/// Maps raw block coordinates to 1e-7 degree units.
struct Projection {
    granularity: i64,
    lat_offset: i64,
    lon_offset: i64,
}

impl Projection {
    fn of(block: &PrimitiveBlock) -> Self {
        Projection {
            granularity: i64::from(block.granularity.unwrap_or(100)),
            lat_offset: block.lat_offset.unwrap_or(0),
            lon_offset: block.lon_offset.unwrap_or(0),
        }
    }

    fn is_identity(&self) -> bool {
        self.granularity == NANODEGREES_PER_UNIT && self.lat_offset == 0 && self.lon_offset == 0
    }

    fn scale(&self, offset: i64, raw: i64) -> i64 {
        offset
            .wrapping_add(self.granularity.wrapping_mul(raw))
            .div_euclid(NANODEGREES_PER_UNIT)
    }

    fn lat(&self, raw: i64) -> i64 {
        self.scale(self.lat_offset, raw)
    }

    fn lon(&self, raw: i64) -> i64 {
        self.scale(self.lon_offset, raw)
    }
}

fn lookup(strings: &[StrIdx], idx: u32) -> Result<StrIdx> {
    strings.get(idx as usize).copied().ok_or_else(|| {
        Error::framing(format!(
            "string index {} out of range, block has {} strings",
            idx,
            strings.len()
        ))
    })
}

/// Translates block-local key/value indices into dataset-wide tags.
fn translate_tags(keys: &[u32], vals: &[u32], strings: &[StrIdx]) -> Result<Vec<Tag>> {
    if keys.len() != vals.len() {
        return Err(Error::framing(format!(
            "{} tag keys but {} tag values",
            keys.len(),
            vals.len()
        )));
    }
    keys.iter()
        .zip(vals)
        .map(|(key, value)| {
            Ok(Tag {
                key: lookup(strings, *key)?,
                value: lookup(strings, *value)?,
            })
        })
        .collect()
}

impl DatasetBuilder {
    pub fn new(cell_size: NonZeroU32) -> Self {
        DatasetBuilder {
            strings: StringTable::new(),
            nodes: NodeTable::new(),
            grid: Grid::new(cell_size),
            skipped_ways: 0,
            partial_ways: 0,
        }
    }

    pub fn add_block(&mut self, block: TypedBlock) -> Result<()> {
        match block {
            TypedBlock::Header(header) => check_header(&header),
            TypedBlock::Data(block) => self.add_primitive_block(&block),
            TypedBlock::Unknown { kind, payload } => {
                debug!(kind = %kind, bytes = payload.len(), "skipping block of unknown type");
                Ok(())
            }
        }
    }

    fn add_primitive_block(&mut self, block: &PrimitiveBlock) -> Result<()> {
        let strings = self.intern_strings(block)?;
        let projection = Projection::of(block);
        for group in &block.primitivegroup {
            if !group.nodes.is_empty() {
                return Err(Error::Unsupported(format!(
                    "non-dense node groups ({} nodes)",
                    group.nodes.len()
                )));
            }
            if let Some(dense) = &group.dense {
                self.add_dense_nodes(dense, &projection)?;
            }
            for way in &group.ways {
                self.add_way(way, &strings)?;
            }
        }
        Ok(())
    }

    fn intern_strings(&mut self, block: &PrimitiveBlock) -> Result<Vec<StrIdx>> {
        block
            .stringtable
            .s
            .iter()
            .map(|bytes| {
                let s = str::from_utf8(bytes)
                    .map_err(|e| Error::framing(format!("string table entry: {}", e)))?;
                Ok(self.strings.intern(s))
            })
            .collect()
    }

    fn add_dense_nodes(&mut self, dense: &DenseNodes, projection: &Projection) -> Result<()> {
        let identity = projection.is_identity();
        for (id, lat, lon) in decode_dense(dense)? {
            let (lat, lon) = if identity {
                (lat, lon)
            } else {
                (projection.lat(lat), projection.lon(lon))
            };
            self.nodes.insert(Node {
                id,
                lat,
                lon,
                tags: Vec::new(),
            });
        }
        Ok(())
    }

    fn add_way(&mut self, way: &PbfWay, strings: &[StrIdx]) -> Result<()> {
        let resolved = resolve_refs(&way.refs, &self.nodes);
        if resolved.nodes.is_empty() {
            self.skipped_ways += 1;
            return Ok(());
        }
        if resolved.missing {
            self.partial_ways += 1;
        }
        let tags = translate_tags(&way.keys, &way.vals, strings)?;
        let way = Way {
            id: way.id,
            nodes: resolved.nodes,
            tags,
        };
        self.grid.add_way(way, &self.nodes);
        Ok(())
    }

    pub fn finish(self, marker: StateMarker) -> Dataset {
        info!(
            state = marker.sequence,
            strings = self.strings.len(),
            nodes = self.nodes.len(),
            ways = self.grid.way_count(),
            skipped_ways = self.skipped_ways,
            partial_ways = self.partial_ways,
            "dataset built"
        );
        Dataset {
            strings: self.strings,
            nodes: self.nodes,
            grid: self.grid,
            skipped_ways: self.skipped_ways,
            partial_ways: self.partial_ways,
            state: marker.sequence,
            timestamp: marker.timestamp,
        }
    }
}

fn check_header(header: &HeaderBlock) -> Result<()> {
    debug!(
        writingprogram = header.writingprogram.as_deref().unwrap_or(""),
        source = header.source.as_deref().unwrap_or(""),
        replication_sequence = header.osmosis_replication_sequence_number.unwrap_or(0),
        required_features = ?header.required_features,
        "read header block"
    );
    match header
        .required_features
        .iter()
        .find(|feature| !SUPPORTED_FEATURES.contains(&feature.as_str()))
    {
        Some(feature) => Err(Error::Unsupported(format!(
            "required feature {:?}",
            feature
        ))),
        None => Ok(()),
    }
}
