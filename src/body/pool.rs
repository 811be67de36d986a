//! Fixed-size buffer pool.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::body::BodyError;
use crate::observability::metrics;

/// Pre-allocated buffers of one size, shared by every request.
#[derive(Debug)]
pub struct BufferPool {
    buffers: Mutex<Vec<Vec<u8>>>,
    permits: Arc<Semaphore>,
    buffer_size: usize,
}

impl BufferPool {
    pub fn new(count: usize, buffer_size: usize) -> Arc<Self> {
        let buffers = (0..count).map(|_| Vec::with_capacity(buffer_size)).collect();
        Arc::new(Self {
            buffers: Mutex::new(buffers),
            permits: Arc::new(Semaphore::new(count)),
            buffer_size,
        })
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for a free buffer. The buffer goes back to the pool when the
    /// guard drops.
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledBuffer, BodyError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| BodyError::PoolClosed)?;
        let buf = self
            .buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.buffer_size));
        metrics::record_buffer_pool_available(self.available());
        Ok(PooledBuffer {
            buf,
            pool: self.clone(),
            _permit: permit,
        })
    }

    fn release(&self, mut buf: Vec<u8>) {
        buf.clear();
        self.buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(buf);
    }
}

/// A buffer on loan from a `BufferPool`, limited to the pool's buffer size.
#[derive(Debug)]
pub struct PooledBuffer {
    buf: Vec<u8>,
    pool: Arc<BufferPool>,
    _permit: OwnedSemaphorePermit,
}

impl PooledBuffer {
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.pool.buffer_size
    }

    pub fn remaining(&self) -> usize {
        self.capacity() - self.buf.len()
    }

    pub fn is_full(&self) -> bool {
        self.remaining() == 0
    }

    /// Copy as much of `data` as fits; returns the number of bytes taken.
    pub fn fill(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.remaining());
        self.buf.extend_from_slice(&data[..n]);
        n
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Copy the contents out and empty the buffer for reuse.
    pub fn drain(&mut self) -> bytes::Bytes {
        let out = bytes::Bytes::copy_from_slice(&self.buf);
        self.buf.clear();
        out
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buf));
        // The permit is released after this body runs.
        metrics::record_buffer_pool_available(self.pool.available() + 1);
    }
}
