//! Incremental, size-capped body reader.
//!
//! ```text
//! AwaitingHeaders ──▶ Accumulating ──────────────────────▶ Complete
//!                 └─▶ StreamingToResource ─(flush)─┐  ──▶ Complete
//!                          ▲──────────────────────┘
//! ```
//!
//! Non-binary bodies are read whole with [`BodyAccumulator::read_all`].
//! Binary bodies are pulled chunk by chunk with
//! [`BodyAccumulator::next_chunk`]; each chunk is at most the size limit and
//! carries its offset and whether it completes the body.

use bytes::Bytes;
use futures_util::StreamExt;

use crate::body::{BodyError, ChunkStream, PooledBuffer, RequestBody};
use crate::observability::metrics;
use crate::resource::ContentChunk;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorState {
    AwaitingHeaders,
    Accumulating,
    StreamingToResource,
    Complete,
}

pub struct BodyAccumulator {
    state: AccumulatorState,
    buffer: PooledBuffer,
    limit: usize,
    pending: Bytes,
    stream: Option<ChunkStream>,
    content_length: Option<u64>,
    /// Bytes moved into the buffer so far.
    total: u64,
    /// Bytes already flushed to the resource.
    offset: u64,
}

impl BodyAccumulator {
    /// `limit` is clamped to the buffer's capacity.
    pub fn new(body: RequestBody, buffer: PooledBuffer, limit: usize) -> Self {
        let (prebuffered, stream, content_length) = body.into_parts();
        let limit = limit.min(buffer.capacity());
        Self {
            state: AccumulatorState::AwaitingHeaders,
            buffer,
            limit,
            pending: prebuffered,
            stream,
            content_length,
            total: 0,
            offset: 0,
        }
    }

    pub fn state(&self) -> AccumulatorState {
        self.state
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Total bytes read from the transport so far.
    pub fn bytes_read(&self) -> u64 {
        self.total
    }

    /// Read the entire body into memory. Fails with `TooLarge` as soon as the
    /// body is known to exceed the limit; no further bytes are read.
    pub async fn read_all(mut self) -> Result<Bytes, BodyError> {
        self.state = AccumulatorState::Accumulating;
        if let Some(len) = self.content_length {
            if len > self.limit as u64 {
                return Err(self.reject());
            }
        }
        loop {
            if self.length_reached() {
                break;
            }
            match self.next_piece().await? {
                Some(piece) => {
                    if piece.len() > self.room() {
                        return Err(self.reject());
                    }
                    self.absorb(piece)?;
                }
                None => {
                    self.check_truncated()?;
                    break;
                }
            }
        }
        self.state = AccumulatorState::Complete;
        Ok(self.buffer.drain())
    }

    /// Next chunk destined for a binary resource, or `None` once the final
    /// chunk (the one with `complete == true`) has been produced. An empty
    /// body yields a single empty, complete chunk.
    pub async fn next_chunk(&mut self) -> Result<Option<ContentChunk>, BodyError> {
        if self.state == AccumulatorState::Complete {
            return Ok(None);
        }
        self.state = AccumulatorState::StreamingToResource;
        loop {
            if self.length_reached() {
                return Ok(Some(self.flush(true)));
            }
            if self.room() == 0 {
                if self.content_length.is_some() {
                    return Ok(Some(self.flush(false)));
                }
                // Unknown length: only more data proves this chunk is not the last.
                return match self.next_piece().await? {
                    Some(piece) => {
                        self.pending = piece;
                        Ok(Some(self.flush(false)))
                    }
                    None => Ok(Some(self.flush(true))),
                };
            }
            match self.next_piece().await? {
                Some(piece) => self.absorb(piece)?,
                None => {
                    self.check_truncated()?;
                    return Ok(Some(self.flush(true)));
                }
            }
        }
    }

    fn room(&self) -> usize {
        self.limit.saturating_sub(self.buffer.len())
    }

    fn length_reached(&self) -> bool {
        self.content_length == Some(self.total)
    }

    async fn next_piece(&mut self) -> Result<Option<Bytes>, BodyError> {
        if !self.pending.is_empty() {
            return Ok(Some(std::mem::take(&mut self.pending)));
        }
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };
        while let Some(item) = stream.next().await {
            let piece = item?;
            if !piece.is_empty() {
                return Ok(Some(piece));
            }
        }
        self.stream = None;
        Ok(None)
    }

    fn absorb(&mut self, mut piece: Bytes) -> Result<(), BodyError> {
        let take = piece.len().min(self.room());
        let rest = piece.split_off(take);
        self.buffer.fill(&piece);
        self.total += take as u64;
        self.pending = rest;
        if let Some(len) = self.content_length {
            if self.total > len {
                return Err(BodyError::Transport(format!(
                    "body longer than declared length {}",
                    len
                )));
            }
        }
        Ok(())
    }

    fn check_truncated(&self) -> Result<(), BodyError> {
        match self.content_length {
            Some(expected) if self.total < expected => Err(BodyError::Truncated {
                received: self.total,
                expected,
            }),
            _ => Ok(()),
        }
    }

    fn flush(&mut self, complete: bool) -> ContentChunk {
        let data = self.buffer.drain();
        let chunk = ContentChunk {
            offset: self.offset,
            complete,
            data,
        };
        self.offset += chunk.data.len() as u64;
        if complete {
            self.state = AccumulatorState::Complete;
        }
        chunk
    }

    fn reject(&mut self) -> BodyError {
        self.state = AccumulatorState::Complete;
        metrics::record_body_rejected();
        tracing::warn!(
            limit = self.limit,
            content_length = ?self.content_length,
            "Request body exceeds size limit"
        );
        BodyError::TooLarge { limit: self.limit }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BufferPool;
    use futures_util::stream;
    use proptest::prelude::*;

    fn streamed(pieces: Vec<&'static str>, content_length: Option<u64>) -> RequestBody {
        let items = pieces
            .into_iter()
            .map(|p| Ok::<_, BodyError>(Bytes::from_static(p.as_bytes())));
        RequestBody::new(Box::pin(stream::iter(items)), content_length)
    }

    async fn accumulator(body: RequestBody, limit: usize) -> BodyAccumulator {
        let pool = BufferPool::new(1, limit);
        BodyAccumulator::new(body, pool.acquire().await.unwrap(), limit)
    }

    #[tokio::test]
    async fn reads_whole_body() {
        let acc = accumulator(streamed(vec!["ab", "", "cd"], None), 8).await;
        assert_eq!(&acc.read_all().await.unwrap()[..], b"abcd");
    }

    #[tokio::test]
    async fn body_equal_to_limit_is_accepted() {
        let acc = accumulator(streamed(vec!["abcd"], None), 4).await;
        assert_eq!(acc.read_all().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let acc = accumulator(streamed(vec!["abc", "de"], None), 4).await;
        assert_eq!(acc.read_all().await.unwrap_err(), BodyError::TooLarge { limit: 4 });

        // Declared length over the limit fails before anything is read.
        let acc = accumulator(streamed(vec!["abcde"], Some(5)), 4).await;
        assert_eq!(acc.read_all().await.unwrap_err(), BodyError::TooLarge { limit: 4 });
    }

    #[tokio::test]
    async fn stops_at_declared_length_without_polling_further() {
        let items = vec![
            Ok(Bytes::from_static(b"abc")),
            Err(BodyError::Transport("must not be polled".into())),
        ];
        let body = RequestBody::new(Box::pin(stream::iter(items)), Some(3));
        let acc = accumulator(body, 8).await;
        assert_eq!(&acc.read_all().await.unwrap()[..], b"abc");
    }

    #[tokio::test]
    async fn prebuffered_body_skips_the_stream() {
        let body = RequestBody::full(Bytes::from_static(b"{}"));
        assert!(body.is_complete());
        let acc = accumulator(body, 8).await;
        assert_eq!(&acc.read_all().await.unwrap()[..], b"{}");
    }

    #[tokio::test]
    async fn truncated_and_failed_streams_are_errors() {
        let acc = accumulator(streamed(vec!["ab"], Some(5)), 8).await;
        assert_eq!(
            acc.read_all().await.unwrap_err(),
            BodyError::Truncated {
                received: 2,
                expected: 5
            }
        );

        let items = vec![Err(BodyError::Transport("reset".into()))];
        let body = RequestBody::new(Box::pin(stream::iter(items)), None);
        let acc = accumulator(body, 8).await;
        assert!(matches!(acc.read_all().await, Err(BodyError::Transport(_))));
    }

    #[tokio::test]
    async fn empty_binary_body_is_one_complete_chunk() {
        let mut acc = accumulator(streamed(vec![], None), 4).await;
        let chunk = acc.next_chunk().await.unwrap().unwrap();
        assert!(chunk.complete);
        assert!(chunk.data.is_empty());
        assert!(acc.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn binary_body_larger_than_limit_streams() {
        let mut acc = accumulator(streamed(vec!["abcdefghij"], Some(10)), 4).await;
        let mut chunks = Vec::new();
        while let Some(chunk) = acc.next_chunk().await.unwrap() {
            chunks.push(chunk);
        }
        let offsets: Vec<_> = chunks.iter().map(|c| c.offset).collect();
        assert_eq!(offsets, vec![0, 4, 8]);
        assert_eq!(chunks.iter().filter(|c| c.complete).count(), 1);
        assert!(chunks[2].complete);
        assert_eq!(acc.state(), AccumulatorState::Complete);
    }

    fn split(body: &[u8], cuts: &[usize]) -> Vec<Bytes> {
        let mut points: Vec<usize> = cuts.iter().map(|c| c % (body.len() + 1)).collect();
        points.push(0);
        points.push(body.len());
        points.sort_unstable();
        points.dedup();
        points
            .windows(2)
            .map(|w| Bytes::copy_from_slice(&body[w[0]..w[1]]))
            .collect()
    }

    proptest! {
        #[test]
        fn binary_chunks_cover_body_in_order(
            size in 0usize..600,
            cuts in proptest::collection::vec(0usize..600, 0..8),
            limit in 1usize..200,
            declare_length in any::<bool>(),
        ) {
            let body: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            let pieces = split(&body, &cuts);
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let chunks = runtime.block_on(async {
                let items = pieces.into_iter().map(Ok::<_, BodyError>);
                let length = declare_length.then_some(size as u64);
                let request = RequestBody::new(Box::pin(stream::iter(items)), length);
                let mut acc = accumulator(request, limit).await;
                let mut out = Vec::new();
                while let Some(chunk) = acc.next_chunk().await.unwrap() {
                    out.push(chunk);
                }
                out
            });

            let mut expected_offset = 0u64;
            let mut reassembled = Vec::new();
            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.offset, expected_offset);
                prop_assert!(chunk.data.len() <= limit);
                prop_assert_eq!(chunk.complete, i == chunks.len() - 1);
                if size > 0 {
                    prop_assert!(!chunk.data.is_empty());
                }
                expected_offset += chunk.data.len() as u64;
                reassembled.extend_from_slice(&chunk.data);
            }
            prop_assert_eq!(reassembled, body);
        }
    }
}
