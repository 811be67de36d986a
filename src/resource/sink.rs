//! Sinks that resources stream properties, members and binary content into.
//!
//! Property and member sinks must be closed exactly once, even when nothing
//! was streamed. `close` consumes the sink; a sink dropped without `close`
//! is reported to the reader as `SinkError::NotClosed`.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::resource::{Resource, Value};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SinkError {
    #[error("{0} sink dropped without being closed")]
    NotClosed(&'static str),

    #[error("binary content receiver has gone away")]
    Disconnected,
}

enum SinkEvent<T> {
    Item(T),
    Closed,
}

struct ItemSink<T> {
    tx: mpsc::UnboundedSender<SinkEvent<T>>,
}

impl<T> ItemSink<T> {
    fn accept(&mut self, item: T) {
        // A closed receiver means the walk was abandoned; items are discarded.
        let _ = self.tx.send(SinkEvent::Item(item));
    }

    fn close(self) {
        let _ = self.tx.send(SinkEvent::Closed);
    }
}

/// Reading half shared by property and member sinks.
pub struct SinkReceiver<T> {
    rx: mpsc::UnboundedReceiver<SinkEvent<T>>,
    kind: &'static str,
}

impl<T> SinkReceiver<T> {
    /// Collect everything streamed until the sink is closed.
    pub async fn collect(mut self) -> Result<Vec<T>, SinkError> {
        let mut items = Vec::new();
        while let Some(event) = self.rx.recv().await {
            match event {
                SinkEvent::Item(item) => items.push(item),
                SinkEvent::Closed => return Ok(items),
            }
        }
        Err(SinkError::NotClosed(self.kind))
    }
}

/// Receives a resource's properties.
pub struct PropertySink {
    inner: ItemSink<(String, Value)>,
}

impl PropertySink {
    pub fn channel() -> (Self, SinkReceiver<(String, Value)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                inner: ItemSink { tx },
            },
            SinkReceiver {
                rx,
                kind: "property",
            },
        )
    }

    pub fn accept(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.inner.accept((name.into(), value.into()));
    }

    pub fn close(self) {
        self.inner.close();
    }
}

/// Receives a resource's members.
pub struct ResourceSink {
    inner: ItemSink<Arc<dyn Resource>>,
}

impl ResourceSink {
    pub fn channel() -> (Self, SinkReceiver<Arc<dyn Resource>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                inner: ItemSink { tx },
            },
            SinkReceiver { rx, kind: "member" },
        )
    }

    pub fn accept(&mut self, member: Arc<dyn Resource>) {
        self.inner.accept(member);
    }

    pub fn close(self) {
        self.inner.close();
    }
}

/// Flow-controlled sink for binary response content.
///
/// Holds at most one chunk in flight: `accept` blocks the calling thread
/// until the transport has taken the previous chunk. Callers must therefore
/// run on a worker thread, never on the I/O runtime; binary resources get
/// this for free by reporting `requires_worker_thread`.
pub struct BinaryContentSink {
    tx: mpsc::Sender<Bytes>,
}

impl BinaryContentSink {
    pub fn channel() -> (Self, BinaryContentStream) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, BinaryContentStream { rx })
    }

    /// Hand a chunk to the transport, waiting for the previous one to drain.
    pub fn accept(&mut self, chunk: Bytes) -> Result<(), SinkError> {
        self.tx
            .blocking_send(chunk)
            .map_err(|_| SinkError::Disconnected)
    }

    /// Finish the body. Dropping the sink has the same effect.
    pub fn close(self) {}
}

/// Transport side of a `BinaryContentSink`.
pub struct BinaryContentStream {
    rx: mpsc::Receiver<Bytes>,
}

impl BinaryContentStream {
    pub async fn next_chunk(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl std::fmt::Debug for dyn Resource {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("Resource").field("id", &self.id()).finish()
        }
    }

    #[tokio::test]
    async fn property_sink_collects_in_order() {
        let (mut sink, rx) = PropertySink::channel();
        sink.accept("a", 1i64);
        sink.accept("b", "two");
        sink.close();
        let items = rx.collect().await.unwrap();
        assert_eq!(items[0].0, "a");
        assert_eq!(items[1].1, Value::from("two"));
    }

    #[tokio::test]
    async fn empty_sink_still_needs_close() {
        let (sink, rx) = ResourceSink::channel();
        sink.close();
        assert!(rx.collect().await.unwrap().is_empty());

        let (sink, rx) = ResourceSink::channel();
        drop(sink);
        assert_eq!(rx.collect().await.unwrap_err(), SinkError::NotClosed("member"));
    }

    #[tokio::test]
    async fn binary_sink_streams_from_worker_thread() {
        let (mut sink, mut stream) = BinaryContentSink::channel();
        let writer = tokio::task::spawn_blocking(move || {
            for i in 0..4u8 {
                sink.accept(Bytes::from(vec![i; 3])).unwrap();
            }
            sink.close();
        });
        let mut received = Vec::new();
        while let Some(chunk) = stream.next_chunk().await {
            received.extend_from_slice(&chunk);
        }
        writer.await.unwrap();
        assert_eq!(received.len(), 12);
        assert_eq!(received[11], 3);
    }
}
