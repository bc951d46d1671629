//! Snappy + protobuf encoding of [`WriteRequest`] payloads.
use bytes::Bytes;
use prost::Message;
use thiserror::Error;

use crate::{WriteRequest, pool::BufferPool};

/// The largest decompressed payload accepted by default (8 MiB).
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 8 * 1024 * 1024;

/// Errors decoding an inbound remote-write payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The snappy header declares a decompressed size above the configured limit.
    #[error("decompressed payload of {len} bytes exceeds the limit of {max} bytes")]
    TooLarge { len: usize, max: usize },

    #[error("unable to unpack snappy: {0}")]
    Decompress(#[source] snap::Error),

    #[error("unable to unmarshal protobuf: {0}")]
    Deserialize(#[source] prost::DecodeError),
}

/// Errors encoding an outbound remote-write payload.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("unable to marshal protobuf: {0}")]
    Serialize(#[source] prost::EncodeError),

    #[error("unable to pack snappy: {0}")]
    Compress(#[source] snap::Error),
}

/// Converts between the snappy-compressed protobuf wire format and [`WriteRequest`].
///
/// Every step works in buffers leased from the codec's [`BufferPool`], so a steady stream of
/// requests settles into reusing the same allocations.
#[derive(Debug)]
pub struct Codec {
    pool: BufferPool,
    max_request_bytes: usize,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUEST_BYTES)
    }
}

impl Codec {
    /// Create a [`Codec`] rejecting payloads that decompress to more than `max_request_bytes`.
    pub fn new(max_request_bytes: usize) -> Self {
        Self {
            pool: BufferPool::new(),
            max_request_bytes,
        }
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn max_request_bytes(&self) -> usize {
        self.max_request_bytes
    }

    /// Decompress and deserialize `raw`.
    ///
    /// The decompressed length is read from the snappy header and checked against the limit
    /// before any decompression work is done.
    pub fn decode(&self, raw: &[u8]) -> Result<WriteRequest, DecodeError> {
        let len = snap::raw::decompress_len(raw).map_err(DecodeError::Decompress)?;
        if len > self.max_request_bytes {
            return Err(DecodeError::TooLarge {
                len,
                max: self.max_request_bytes,
            });
        }

        let mut buf = self.pool.lease();
        buf.resize(len, 0);
        let n = snap::raw::Decoder::new()
            .decompress(raw, &mut buf[..])
            .map_err(DecodeError::Decompress)?;

        WriteRequest::decode(&buf[..n]).map_err(DecodeError::Deserialize)
    }

    /// Serialize and compress `req`, returning an owned copy of the compressed bytes.
    pub fn encode(&self, req: &WriteRequest) -> Result<Bytes, EncodeError> {
        let mut pb = self.pool.lease();
        pb.reserve(req.encoded_len());
        req.encode(&mut *pb).map_err(EncodeError::Serialize)?;

        let mut compressed = self.pool.lease();
        compressed.resize(snap::raw::max_compress_len(pb.len()), 0);
        let n = snap::raw::Encoder::new()
            .compress(&pb, &mut compressed[..])
            .map_err(EncodeError::Compress)?;

        // The pooled buffer is reused once this returns.
        Ok(Bytes::copy_from_slice(&compressed[..n]))
    }
}
