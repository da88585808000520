//! Writes a selection of ways, with the nodes they reference, as a standalone
//! PBF file that `BlockReader` and `DatasetBuilder` load again.
//!
//! Nodes are written first in dense blocks sorted by id, ways after them, so
//! every way ref resolves against nodes already read.

use crate::dataset::Dataset;
use crate::error::Result;
use crate::model::{Node, Way};
use crate::pbf::proto::{
    DenseNodes, HeaderBBox, HeaderBlock, PrimitiveBlock, PrimitiveGroup, StringTable,
    Way as PbfWay,
};
use crate::pbf::BlockWriter;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

const NODES_PER_BLOCK: usize = 8000;
const WAYS_PER_BLOCK: usize = 8000;

/// Nanodegrees per stored coordinate unit.
const NANODEGREES_PER_UNIT: i64 = 100;

/// Block-local string table; index 0 is reserved for the empty string.
struct BlockStrings<'a> {
    strings: Vec<&'a str>,
    index: HashMap<&'a str, u32>,
}

impl<'a> BlockStrings<'a> {
    fn new() -> Self {
        BlockStrings {
            strings: vec![""],
            index: HashMap::new(),
        }
    }

    fn index(&mut self, s: &'a str) -> u32 {
        if let Some(idx) = self.index.get(s) {
            return *idx;
        }
        let idx = self.strings.len() as u32;
        self.strings.push(s);
        self.index.insert(s, idx);
        idx
    }

    fn into_table(self) -> StringTable {
        StringTable {
            s: self.strings.into_iter().map(|s| s.as_bytes().to_vec()).collect(),
        }
    }
}

fn delta_encode(values: impl IntoIterator<Item = i64>) -> Vec<i64> {
    let mut last = 0i64;
    values
        .into_iter()
        .map(|value| {
            let delta = value.wrapping_sub(last);
            last = value;
            delta
        })
        .collect()
}

/// The nodes referenced by `ways`, keyed by id. The first occurrence of an id
/// wins.
fn referenced_nodes<'a>(dataset: &'a Dataset, ways: &[&'a Way]) -> BTreeMap<i64, &'a Node> {
    let mut nodes = BTreeMap::new();
    for way in ways {
        for node in dataset.way_nodes(way) {
            nodes.entry(node.id).or_insert(node);
        }
    }
    nodes
}

fn header_block(dataset: &Dataset, nodes: &BTreeMap<i64, &Node>) -> HeaderBlock {
    let bbox = nodes.values().fold(None, |bbox: Option<HeaderBBox>, node| {
        let (lat, lon) = (
            node.lat * NANODEGREES_PER_UNIT,
            node.lon * NANODEGREES_PER_UNIT,
        );
        Some(match bbox {
            None => HeaderBBox {
                left: lon,
                right: lon,
                top: lat,
                bottom: lat,
            },
            Some(bbox) => HeaderBBox {
                left: bbox.left.min(lon),
                right: bbox.right.max(lon),
                top: bbox.top.max(lat),
                bottom: bbox.bottom.min(lat),
            },
        })
    });
    HeaderBlock {
        bbox,
        required_features: vec!["OsmSchema-V0.6".into(), "DenseNodes".into()],
        writingprogram: Some(env!("CARGO_PKG_NAME").into()),
        osmosis_replication_sequence_number: Some(dataset.state()).filter(|state| *state > 0),
        ..Default::default()
    }
}

fn node_block(nodes: &[&Node]) -> PrimitiveBlock {
    let dense = DenseNodes {
        id: delta_encode(nodes.iter().map(|node| node.id)),
        lat: delta_encode(nodes.iter().map(|node| node.lat)),
        lon: delta_encode(nodes.iter().map(|node| node.lon)),
        keys_vals: Vec::new(),
    };
    PrimitiveBlock {
        stringtable: BlockStrings::new().into_table(),
        primitivegroup: vec![PrimitiveGroup {
            dense: Some(dense),
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn way_block(dataset: &Dataset, ways: &[&Way]) -> PrimitiveBlock {
    let mut strings = BlockStrings::new();
    let ways = ways
        .iter()
        .map(|way| {
            let (keys, vals) = dataset
                .tag_pairs(&way.tags)
                .map(|(key, value)| (strings.index(key), strings.index(value)))
                .unzip();
            PbfWay {
                id: way.id,
                keys,
                vals,
                refs: delta_encode(dataset.way_nodes(way).map(|node| node.id)),
            }
        })
        .collect();
    PrimitiveBlock {
        stringtable: strings.into_table(),
        primitivegroup: vec![PrimitiveGroup {
            ways,
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// Encodes `ways` and their nodes into `writer`.
pub fn encode_extract<W: Write>(
    writer: &mut BlockWriter<W>,
    dataset: &Dataset,
    ways: &[&Way],
) -> Result<()> {
    let nodes = referenced_nodes(dataset, ways);
    writer.write_header(&header_block(dataset, &nodes))?;

    let nodes: Vec<&Node> = nodes.into_values().collect();
    for chunk in nodes.chunks(NODES_PER_BLOCK) {
        writer.write_data(&node_block(chunk))?;
    }
    for chunk in ways.chunks(WAYS_PER_BLOCK) {
        writer.write_data(&way_block(dataset, chunk))?;
    }
    writer.flush()?;
    info!(ways = ways.len(), nodes = nodes.len(), "extract written");
    Ok(())
}

pub fn write_extract(path: impl AsRef<Path>, dataset: &Dataset, ways: &[&Way]) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BlockWriter::new(BufWriter::new(file));
    encode_extract(&mut writer, dataset, ways)
}
