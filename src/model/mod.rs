use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub type NodeId = i64;
pub type WayId = i64;

/// Fixed-point coordinate units per degree.
pub const COORD_SCALE: f64 = 1e7;

pub fn to_degrees(units: i64) -> f64 {
    units as f64 / COORD_SCALE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StrIdx(u32);

/// Dataset-wide interned strings. Every distinct text is stored once.
#[derive(Debug, Default)]
pub struct StringTable {
    strings: Vec<Arc<str>>,
    index: HashMap<Arc<str>, StrIdx>,
}

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, s: &str) -> StrIdx {
        if let Some(idx) = self.index.get(s) {
            return *idx;
        }
        let idx = StrIdx(self.strings.len() as u32);
        let s: Arc<str> = Arc::from(s);
        self.strings.push(s.clone());
        self.index.insert(s, idx);
        idx
    }

    pub fn get(&self, idx: StrIdx) -> &str {
        &self.strings[idx.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag {
    pub key: StrIdx,
    pub value: StrIdx,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    /// Latitude in 1e-7 degrees.
    pub lat: i64,
    /// Longitude in 1e-7 degrees.
    pub lon: i64,
    pub tags: Vec<Tag>,
}

impl Node {
    pub fn lat_degrees(&self) -> f64 {
        to_degrees(self.lat)
    }

    pub fn lon_degrees(&self) -> f64 {
        to_degrees(self.lon)
    }
}

/// Stable position of a node in a `NodeTable` arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIdx(usize);

/// Append-only node arena with last-write-wins lookup by id.
///
/// Re-inserting an id stores the new node in a fresh slot and repoints the
/// id, so indices handed out earlier keep resolving to the node they were
/// created for.
#[derive(Debug, Default)]
pub struct NodeTable {
    arena: Vec<Node>,
    by_id: HashMap<NodeId, NodeIdx>,
}

impl NodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: Node) -> NodeIdx {
        let idx = NodeIdx(self.arena.len());
        self.by_id.insert(node.id, idx);
        self.arena.push(node);
        idx
    }

    pub fn index_of(&self, id: NodeId) -> Option<NodeIdx> {
        self.by_id.get(&id).copied()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.index_of(id).map(|idx| self.node(idx))
    }

    pub fn node(&self, idx: NodeIdx) -> &Node {
        &self.arena[idx.0]
    }

    /// Number of distinct node ids.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Way {
    pub id: WayId,
    /// Ordered geometry, never empty.
    pub nodes: Vec<NodeIdx>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Copy)]
pub enum Feature<'a> {
    Node(&'a Node),
    Way(&'a Way),
}

impl<'a> Feature<'a> {
    pub fn display(self, strings: &'a StringTable, nodes: &'a NodeTable) -> FeatureDisplay<'a> {
        FeatureDisplay {
            feature: self,
            strings,
            nodes,
        }
    }
}

/// Human readable rendering of a feature; `{:#}` also lists a way's nodes.
pub struct FeatureDisplay<'a> {
    feature: Feature<'a>,
    strings: &'a StringTable,
    nodes: &'a NodeTable,
}

impl FeatureDisplay<'_> {
    fn write_tags(&self, f: &mut fmt::Formatter<'_>, tags: &[Tag]) -> fmt::Result {
        if tags.is_empty() {
            return Ok(());
        }
        write!(f, " {{")?;
        for (i, tag) in tags.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(
                f,
                "{}={}",
                self.strings.get(tag.key),
                self.strings.get(tag.value)
            )?;
        }
        write!(f, "}}")
    }
}

impl fmt::Display for FeatureDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.feature {
            Feature::Node(node) => {
                write!(
                    f,
                    "node {} at {:.7},{:.7}",
                    node.id,
                    node.lat_degrees(),
                    node.lon_degrees()
                )?;
                self.write_tags(f, &node.tags)
            }
            Feature::Way(way) => {
                write!(f, "way {} with {} nodes", way.id, way.nodes.len())?;
                self.write_tags(f, &way.tags)?;
                if f.alternate() {
                    for idx in &way.nodes {
                        let node = Feature::Node(self.nodes.node(*idx))
                            .display(self.strings, self.nodes);
                        write!(f, "\n  {}", node)?;
                    }
                }
                Ok(())
            }
        }
    }
}
