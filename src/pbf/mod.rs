//! OSM PBF block framing: reading and writing of length-framed, optionally
//! zlib compressed protobuf blocks.

pub mod proto;
mod reader;
mod writer;

pub use reader::{blob_payload, BlockReader, TypedBlock};
pub use writer::BlockWriter;

pub const OSM_HEADER: &str = "OSMHeader";
pub const OSM_DATA: &str = "OSMData";

pub(crate) const MAX_BLOB_HEADER_SIZE: usize = 64 * 1024;
pub(crate) const MAX_BLOB_SIZE: usize = 32 * 1024 * 1024;
