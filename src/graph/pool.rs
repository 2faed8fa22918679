//! Reusable scratch-memory pools
//!
//! A [`ScratchPool`] hands out fixed-size aligned chunks to tasks that need
//! per-invocation workspace. Released chunks go back on the free list and are
//! reused, so steady-state execution allocates once per concurrent task
//! rather than once per task. Pools are owned by their graph and freed when
//! the graph is destroyed.

use crate::error::Result;
use crate::matrix::AlignedBuf;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Fixed-chunk-size scratch allocator
pub struct ScratchPool {
    chunk_bytes: usize,
    free: Mutex<Vec<AlignedBuf>>,
    created: AtomicUsize,
}

impl ScratchPool {
    /// Pool handing out chunks of exactly `chunk_bytes` bytes
    pub fn new(chunk_bytes: usize) -> Self {
        Self {
            chunk_bytes,
            free: Mutex::new(Vec::new()),
            created: AtomicUsize::new(0),
        }
    }

    /// Size of every chunk in bytes
    #[inline]
    pub fn chunk_bytes(&self) -> usize {
        self.chunk_bytes
    }

    /// Number of chunks ever allocated by this pool
    pub fn allocated_chunks(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Take a chunk from the free list, allocating if none is available
    ///
    /// Chunk contents are not cleared between acquisitions; a fresh chunk is
    /// zeroed, a reused one holds whatever the previous task left.
    pub fn acquire(&self) -> Result<PoolChunk<'_>> {
        let recycled = self.free.lock().pop();
        let buf = match recycled {
            Some(buf) => {
                // the free list only ever holds this pool's own chunks
                debug_assert_eq!(buf.len(), self.chunk_bytes);
                buf
            }
            None => {
                let buf = AlignedBuf::zeroed(self.chunk_bytes)?;
                self.created.fetch_add(1, Ordering::Relaxed);
                buf
            }
        };
        Ok(PoolChunk { buf: Some(buf), pool: self })
    }

    fn release(&self, buf: AlignedBuf) {
        self.free.lock().push(buf);
    }
}

/// RAII guard over one pool chunk; returns it to the pool on drop
pub struct PoolChunk<'a> {
    buf: Option<AlignedBuf>,
    pool: &'a ScratchPool,
}

impl PoolChunk<'_> {
    /// Chunk contents
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        match &self.buf {
            Some(buf) => buf.as_slice(),
            None => &[],
        }
    }

    /// Mutable chunk contents
    #[inline]
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        match &mut self.buf {
            Some(buf) => buf.as_mut_slice(),
            None => &mut [],
        }
    }
}

impl Drop for PoolChunk<'_> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_size_is_exact() {
        let pool = ScratchPool::new(384);
        let chunk = pool.acquire().unwrap();
        assert_eq!(chunk.bytes().len(), 384);
        assert_eq!(pool.chunk_bytes(), 384);
    }

    #[test]
    fn test_released_chunks_are_reused() {
        let pool = ScratchPool::new(64);
        {
            let mut chunk = pool.acquire().unwrap();
            chunk.bytes_mut()[0] = 7;
        }
        assert_eq!(pool.allocated_chunks(), 1);

        let chunk = pool.acquire().unwrap();
        assert_eq!(pool.allocated_chunks(), 1);
        assert_eq!(chunk.bytes()[0], 7);
    }

    #[test]
    fn test_concurrent_holders_get_distinct_chunks() {
        let pool = ScratchPool::new(64);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_eq!(pool.allocated_chunks(), 2);
        drop(a);
        drop(b);
        assert_eq!(pool.allocated_chunks(), 2);
    }
}
