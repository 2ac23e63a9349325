//! Thread-confined pool of fixed-size byte buffers.
//!
//! Every worker thread owns one [`BufferPool`]. Connections draw their input and
//! output buffers from it and hand them back when the connection ends, so a busy
//! keep-alive workload settles into a steady state with no per-request
//! allocation. Buffers never cross threads, which is why the pool needs no
//! locking at all.
//!
//! [`PooledBuffer`] is the RAII side of the contract: it dereferences to the
//! underlying [`BytesMut`] and returns it to the owning thread's pool on drop.

use std::cell::RefCell;
use std::ops::{Deref, DerefMut};

use bytes::BytesMut;
use tracing::error;

/// Default capacity of a pooled chunk in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

thread_local! {
    static POOL: RefCell<BufferPool> = RefCell::new(BufferPool::new(DEFAULT_CHUNK_SIZE));
}

/// A free list of reusable `BytesMut` chunks, confined to one thread.
#[derive(Debug)]
pub struct BufferPool {
    chunk_size: usize,
    free: Vec<BytesMut>,
    in_use: usize,
}

impl BufferPool {
    /// Creates an empty pool handing out chunks of `chunk_size` bytes.
    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size, free: Vec::new(), in_use: 0 }
    }

    /// Returns a buffer from the free list, or a freshly allocated chunk when
    /// the free list is empty.
    pub fn allocate(&mut self) -> BytesMut {
        self.in_use += 1;
        match self.free.pop() {
            Some(buffer) => buffer,
            None => BytesMut::with_capacity(self.chunk_size),
        }
    }

    /// Moves a buffer back to the free list.
    ///
    /// Releasing a buffer while the pool tracks nothing as in-use is a
    /// programming error; it is logged and the buffer is dropped.
    pub fn release(&mut self, mut buffer: BytesMut) {
        if self.in_use == 0 {
            error!("buffer pool release without a matching allocate");
            return;
        }
        self.in_use -= 1;
        buffer.clear();
        self.free.push(buffer);
    }

    /// Forgets all in-use tracking. Shutdown path only: buffers still owned by
    /// connections are reclaimed by their drops, not by the pool.
    pub fn reset(&mut self) {
        self.in_use = 0;
    }

    /// Number of buffers currently on the free list.
    pub fn free_size(&self) -> usize {
        self.free.len()
    }

    /// Number of buffers currently tracked as in-use.
    pub fn used_size(&self) -> usize {
        self.in_use
    }

    /// Size in bytes of chunks handed out by this pool.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

/// Sets the chunk size of the current thread's pool.
///
/// Workers call this once at startup, before any connection draws a buffer.
/// Buffers already on the free list keep their old capacity.
pub fn configure(chunk_size: usize) {
    POOL.with_borrow_mut(|pool| pool.chunk_size = chunk_size);
}

/// Draws a buffer from the current thread's pool.
pub fn acquire() -> PooledBuffer {
    let inner = POOL.with_borrow_mut(BufferPool::allocate);
    PooledBuffer { inner: Some(inner) }
}

/// Runs `f` with the current thread's pool. Mostly useful for inspection.
pub fn with_pool<R>(f: impl FnOnce(&mut BufferPool) -> R) -> R {
    POOL.with_borrow_mut(f)
}

/// A buffer checked out of the thread-local pool, returned on drop.
#[derive(Debug)]
pub struct PooledBuffer {
    inner: Option<BytesMut>,
}

impl Deref for PooledBuffer {
    type Target = BytesMut;

    fn deref(&self) -> &BytesMut {
        // invariant: inner is only None inside drop
        self.inner.as_ref().unwrap()
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut BytesMut {
        self.inner.as_mut().unwrap()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buffer) = self.inner.take() {
            POOL.with_borrow_mut(|pool| pool.release(buffer));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_creates_when_free_list_empty() {
        let mut pool = BufferPool::new(64);
        let a = pool.allocate();
        let b = pool.allocate();
        assert_eq!(a.capacity(), 64);
        assert_eq!(b.capacity(), 64);
        assert_eq!(pool.used_size(), 2);
        assert_eq!(pool.free_size(), 0);
    }

    #[test]
    fn release_recycles_buffers() {
        let mut pool = BufferPool::new(64);
        let mut a = pool.allocate();
        a.extend_from_slice(b"leftover bytes");
        pool.release(a);
        assert_eq!(pool.free_size(), 1);
        assert_eq!(pool.used_size(), 0);

        let again = pool.allocate();
        assert!(again.is_empty(), "recycled buffer must come back cleared");
        assert_eq!(pool.free_size(), 0);
    }

    #[test]
    fn balanced_sequences_keep_total_constant() {
        let mut pool = BufferPool::new(32);
        let a = pool.allocate();
        let b = pool.allocate();
        let c = pool.allocate();
        assert_eq!(pool.free_size() + pool.used_size(), 3);
        pool.release(b);
        assert_eq!(pool.free_size() + pool.used_size(), 3);
        let d = pool.allocate();
        assert_eq!(pool.free_size() + pool.used_size(), 3);
        pool.release(a);
        pool.release(c);
        pool.release(d);
        assert_eq!(pool.free_size() + pool.used_size(), 3);
        assert_eq!(pool.free_size(), 3);
    }

    #[test]
    fn untracked_release_is_not_fatal() {
        let mut pool = BufferPool::new(32);
        pool.release(BytesMut::with_capacity(32));
        assert_eq!(pool.free_size(), 0);
        assert_eq!(pool.used_size(), 0);
    }

    #[test]
    fn reset_forgets_in_use_tracking() {
        let mut pool = BufferPool::new(32);
        let _a = pool.allocate();
        let _b = pool.allocate();
        pool.reset();
        assert_eq!(pool.used_size(), 0);
    }

    #[test]
    fn pooled_buffer_returns_on_drop() {
        let (free_before, used_before) = with_pool(|p| (p.free_size(), p.used_size()));
        {
            let mut buffer = acquire();
            buffer.extend_from_slice(b"hello");
            assert_eq!(with_pool(|p| p.used_size()), used_before + 1);
        }
        assert_eq!(with_pool(|p| p.used_size()), used_before);
        assert_eq!(with_pool(|p| p.free_size()), free_before + 1);
    }
}
