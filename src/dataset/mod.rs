//! One immutable, queryable build of the index.

mod builder;

pub use builder::{decode_dense, resolve_refs, DatasetBuilder, ResolvedRefs};

use crate::error::Result;
use crate::grid::{Bbox, Grid};
use crate::model::{Feature, FeatureDisplay, Node, NodeTable, StringTable, Tag, Way};
use crate::pbf::BlockReader;
use crate::state::StateMarker;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::num::NonZeroU32;
use std::path::PathBuf;
use tracing::{debug, info, instrument};

/// Where a dataset is loaded from.
#[derive(Debug, Clone)]
pub struct DataSource {
    pub data_path: PathBuf,
    pub state_path: PathBuf,
    pub cell_size: NonZeroU32,
}

#[derive(Debug)]
pub struct Dataset {
    strings: StringTable,
    nodes: NodeTable,
    grid: Grid,
    skipped_ways: usize,
    partial_ways: usize,
    state: i64,
    timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetStats {
    pub state: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub strings: usize,
    pub nodes: usize,
    pub ways: usize,
    pub cells: usize,
    pub skipped_ways: usize,
    pub partial_ways: usize,
}

impl Dataset {
    pub fn strings(&self) -> &StringTable {
        &self.strings
    }

    pub fn nodes(&self) -> &NodeTable {
        &self.nodes
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Ways that were dropped because none of their nodes resolved.
    pub fn skipped_ways(&self) -> usize {
        self.skipped_ways
    }

    /// Ways that lost nodes to unresolved references.
    pub fn partial_ways(&self) -> usize {
        self.partial_ways
    }

    pub fn state(&self) -> i64 {
        self.state
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }

    pub fn select_by_bboxes(&self, bboxes: &[Bbox]) -> Vec<&Way> {
        self.grid.select_by_bboxes(bboxes)
    }

    pub fn way_nodes<'a>(&'a self, way: &'a Way) -> impl Iterator<Item = &'a Node> + 'a {
        way.nodes.iter().map(move |idx| self.nodes.node(*idx))
    }

    pub fn tag_pairs<'a>(&'a self, tags: &'a [Tag]) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        tags.iter()
            .map(move |tag| (self.strings.get(tag.key), self.strings.get(tag.value)))
    }

    pub fn display<'a>(&'a self, feature: Feature<'a>) -> FeatureDisplay<'a> {
        feature.display(&self.strings, &self.nodes)
    }

    pub fn stats(&self) -> DatasetStats {
        DatasetStats {
            state: self.state,
            timestamp: self.timestamp.clone(),
            strings: self.strings.len(),
            nodes: self.nodes.len(),
            ways: self.grid.way_count(),
            cells: self.grid.cell_count(),
            skipped_ways: self.skipped_ways,
            partial_ways: self.partial_ways,
        }
    }
}

/// Builds a dataset from a PBF stream. Any block error aborts the build.
pub fn build_dataset<R: Read>(
    reader: R,
    cell_size: NonZeroU32,
    marker: StateMarker,
) -> Result<Dataset> {
    let mut builder = DatasetBuilder::new(cell_size);
    let mut blocks = BlockReader::new(reader);
    while let Some(block) = blocks.next_block()? {
        builder.add_block(block)?;
    }
    debug!(blocks = blocks.blocks_read(), "read all blocks");
    Ok(builder.finish(marker))
}

#[instrument(skip_all, fields(path = %source.data_path.display(), state = marker.sequence))]
pub fn load_dataset(source: &DataSource, marker: StateMarker) -> Result<Dataset> {
    info!("loading dataset");
    if let Some(timestamp) = &marker.timestamp {
        info!(timestamp = %timestamp, "data timestamp");
    }
    let file = File::open(&source.data_path)?;
    build_dataset(BufReader::new(file), source.cell_size, marker)
}
