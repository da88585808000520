use super::proto::{Blob, BlobHeader, HeaderBlock, PrimitiveBlock};
use super::{MAX_BLOB_HEADER_SIZE, MAX_BLOB_SIZE, OSM_DATA, OSM_HEADER};
use crate::error::{Error, Result};
use flate2::read::ZlibDecoder;
use prost::Message;
use std::convert::TryFrom;
use std::io::{self, Read};

/// A decompressed, decoded block of a PBF stream.
#[derive(Debug)]
pub enum TypedBlock {
    Header(HeaderBlock),
    Data(PrimitiveBlock),
    /// A block type this reader does not know; the payload is kept as is.
    Unknown { kind: String, payload: Vec<u8> },
}

/// Reads length-framed blocks from a PBF stream.
///
/// Every block starts with a 4-byte big-endian length of the `BlobHeader`
/// that follows. The header names the block type and the size of the `Blob`
/// after it, whose payload is either raw or zlib compressed.
pub struct BlockReader<R> {
    inner: R,
    blocks_read: usize,
}

impl<R: Read> BlockReader<R> {
    pub fn new(inner: R) -> Self {
        BlockReader {
            inner,
            blocks_read: 0,
        }
    }

    pub fn blocks_read(&self) -> usize {
        self.blocks_read
    }

    /// Returns `Ok(None)` once the stream is exhausted at a block boundary.
    pub fn next_block(&mut self) -> Result<Option<TypedBlock>> {
        let header_size = match self.read_header_size()? {
            Some(size) => size,
            None => return Ok(None),
        };
        if header_size > MAX_BLOB_HEADER_SIZE {
            return Err(Error::framing(format!(
                "blob header of {} bytes exceeds the limit of {} bytes",
                header_size, MAX_BLOB_HEADER_SIZE
            )));
        }

        let buf = self.read_vec(header_size, "blob header")?;
        let header = BlobHeader::decode(buf.as_slice()).map_err(Error::decode("blob header"))?;
        if header.r#type.is_empty() {
            return Err(Error::framing("missing type in blob header"));
        }
        let datasize = usize::try_from(header.datasize)
            .ok()
            .filter(|size| *size <= MAX_BLOB_SIZE)
            .ok_or_else(|| {
                Error::framing(format!("invalid blob size {}", header.datasize))
            })?;

        let buf = self.read_vec(datasize, "blob")?;
        let blob = Blob::decode(buf.as_slice()).map_err(Error::decode("blob"))?;
        let payload = blob_payload(blob)?;
        self.blocks_read += 1;

        let block = match header.r#type.as_str() {
            OSM_HEADER => TypedBlock::Header(
                HeaderBlock::decode(payload.as_slice()).map_err(Error::decode("header block"))?,
            ),
            OSM_DATA => TypedBlock::Data(
                PrimitiveBlock::decode(payload.as_slice())
                    .map_err(Error::decode("primitive block"))?,
            ),
            _ => TypedBlock::Unknown {
                kind: header.r#type,
                payload,
            },
        };
        Ok(Some(block))
    }

    fn read_header_size(&mut self) -> Result<Option<usize>> {
        let mut buf = [0u8; 4];
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        match filled {
            0 => Ok(None),
            4 => Ok(Some(u32::from_be_bytes(buf) as usize)),
            n => Err(Error::framing(format!(
                "truncated block length, got {} of 4 bytes",
                n
            ))),
        }
    }

    fn read_vec(&mut self, len: usize, what: &str) -> Result<Vec<u8>> {
        let mut buf = vec![0; len];
        self.inner.read_exact(&mut buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => {
                Error::framing(format!("truncated {}, expected {} bytes", what, len))
            }
            _ => Error::Io(e),
        })?;
        Ok(buf)
    }
}

impl<R: Read> Iterator for BlockReader<R> {
    type Item = Result<TypedBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_block().transpose()
    }
}

/// Extracts the uncompressed payload of a blob.
pub fn blob_payload(blob: Blob) -> Result<Vec<u8>> {
    if let Some(raw) = blob.raw {
        return Ok(raw);
    }
    if let Some(zlib_data) = blob.zlib_data {
        let expected = match blob.raw_size {
            Some(size) => Some(
                usize::try_from(size)
                    .map_err(|_| Error::framing(format!("invalid raw size {}", size)))?,
            ),
            None => None,
        };
        let mut out = Vec::with_capacity(expected.unwrap_or(0).min(MAX_BLOB_SIZE));
        ZlibDecoder::new(zlib_data.as_slice())
            .take(MAX_BLOB_SIZE as u64 + 1)
            .read_to_end(&mut out)
            .map_err(|e| Error::framing(format!("could not inflate zlib data: {}", e)))?;
        if out.len() > MAX_BLOB_SIZE {
            return Err(Error::framing("inflated blob exceeds the size limit"));
        }
        if let Some(expected) = expected {
            if out.len() != expected {
                return Err(Error::framing(format!(
                    "inflated blob has {} bytes, raw_size says {}",
                    out.len(),
                    expected
                )));
            }
        }
        return Ok(out);
    }

    let compression = if blob.lzma_data.is_some() {
        Some("lzma")
    } else if blob.lz4_data.is_some() {
        Some("lz4")
    } else if blob.zstd_data.is_some() {
        Some("zstd")
    } else if blob.obsolete_bzip2_data.is_some() {
        Some("bzip2")
    } else {
        None
    };
    match compression {
        Some(name) => Err(Error::Unsupported(format!("{} compressed blobs", name))),
        None => Err(Error::framing("blob has no data")),
    }
}
