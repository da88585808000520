use super::proto::{Blob, BlobHeader, HeaderBlock, PrimitiveBlock};
use super::{MAX_BLOB_HEADER_SIZE, MAX_BLOB_SIZE, OSM_DATA, OSM_HEADER};
use crate::error::{Error, Result};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use prost::Message;
use std::convert::TryFrom;
use std::io::Write;

/// Writes length-framed blocks in the layout `BlockReader` consumes.
pub struct BlockWriter<W> {
    inner: W,
    compress: bool,
}

impl<W: Write> BlockWriter<W> {
    /// A writer emitting zlib compressed blobs.
    pub fn new(inner: W) -> Self {
        BlockWriter {
            inner,
            compress: true,
        }
    }

    /// A writer emitting raw blobs.
    pub fn uncompressed(inner: W) -> Self {
        BlockWriter {
            inner,
            compress: false,
        }
    }

    pub fn write_header(&mut self, block: &HeaderBlock) -> Result<()> {
        self.write_block(OSM_HEADER, &block.encode_to_vec())
    }

    pub fn write_data(&mut self, block: &PrimitiveBlock) -> Result<()> {
        self.write_block(OSM_DATA, &block.encode_to_vec())
    }

    pub fn write_block(&mut self, kind: &str, payload: &[u8]) -> Result<()> {
        if payload.len() > MAX_BLOB_SIZE {
            return Err(Error::framing(format!(
                "payload of {} bytes exceeds the blob size limit",
                payload.len()
            )));
        }
        let blob = if self.compress {
            Blob {
                raw_size: Some(payload.len() as i32),
                zlib_data: Some(deflate(payload)?),
                ..Default::default()
            }
        } else {
            Blob {
                raw: Some(payload.to_vec()),
                ..Default::default()
            }
        };
        let blob = blob.encode_to_vec();
        let header = BlobHeader {
            r#type: kind.to_string(),
            indexdata: None,
            datasize: i32::try_from(blob.len())
                .map_err(|_| Error::framing("blob does not fit the size field"))?,
        }
        .encode_to_vec();
        if header.len() > MAX_BLOB_HEADER_SIZE {
            return Err(Error::framing("blob header exceeds the size limit"));
        }

        self.inner.write_all(&(header.len() as u32).to_be_bytes())?;
        self.inner.write_all(&header)?;
        self.inner.write_all(&blob)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

pub(crate) fn deflate(payload: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload)?;
    Ok(encoder.finish()?)
}
