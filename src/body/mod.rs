//! Request body intake.
//!
//! # Data Flow
//! ```text
//! transport ──▶ RequestBody { prebuffered, stream, content_length }
//!                   │
//!                   ▼
//!           BodyAccumulator (PooledBuffer, capped)
//!              │                          │
//!     non-binary: Bytes            binary: ContentChunk flushes
//!     ──▶ LazyResourceState        ──▶ BinaryResource::update_content
//! ```
//!
//! # Design Decisions
//! - Accumulation buffers come from a pre-allocated `BufferPool` and return
//!   to it on drop, on every exit path.
//! - A non-binary body over the cap is a client error; nothing is handed to
//!   the resource.
//! - A body equal to the cap is accepted.

pub mod accumulator;
pub mod pool;

use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;

use crate::error::{ErrorKind, ResourceError};

pub use accumulator::{AccumulatorState, BodyAccumulator};
pub use pool::{BufferPool, PooledBuffer};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum BodyError {
    #[error("body exceeds size limit of {limit} bytes")]
    TooLarge { limit: usize },

    #[error("body ended after {received} of {expected} bytes")]
    Truncated { received: u64, expected: u64 },

    #[error("body read failed: {0}")]
    Transport(String),

    #[error("buffer pool is closed")]
    PoolClosed,
}

impl From<BodyError> for ResourceError {
    fn from(err: BodyError) -> Self {
        match err {
            BodyError::TooLarge { .. } => {
                ResourceError::with_message(ErrorKind::InvalidRequest, err.to_string())
            }
            _ => ResourceError::internal("request body could not be read").with_cause(err),
        }
    }
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, BodyError>> + Send>>;

/// A request body as handed over by the transport: bytes it already read
/// plus the remainder as a stream.
pub struct RequestBody {
    prebuffered: Bytes,
    stream: Option<ChunkStream>,
    content_length: Option<u64>,
}

impl RequestBody {
    pub fn new(stream: ChunkStream, content_length: Option<u64>) -> Self {
        Self {
            prebuffered: Bytes::new(),
            stream: Some(stream),
            content_length,
        }
    }

    /// A body that is already fully in memory.
    pub fn full(content: Bytes) -> Self {
        Self {
            content_length: Some(content.len() as u64),
            prebuffered: content,
            stream: None,
        }
    }

    pub fn empty() -> Self {
        Self::full(Bytes::new())
    }

    /// Bytes the transport read ahead of the stream.
    pub fn with_prebuffered(mut self, bytes: Bytes) -> Self {
        self.prebuffered = bytes;
        self
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Whether the whole body is already available without reading.
    pub fn is_complete(&self) -> bool {
        self.stream.is_none()
            || self
                .content_length
                .is_some_and(|len| self.prebuffered.len() as u64 >= len)
    }

    pub(crate) fn into_parts(self) -> (Bytes, Option<ChunkStream>, Option<u64>) {
        (self.prebuffered, self.stream, self.content_length)
    }
}

impl std::fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBody")
            .field("prebuffered", &self.prebuffered.len())
            .field("streaming", &self.stream.is_some())
            .field("content_length", &self.content_length)
            .finish()
    }
}
