//! Reusable byte buffers for the encode/decode hot path.
use std::{
    fmt,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicUsize, Ordering},
};

use parking_lot::Mutex;

/// A pool of growable byte buffers.
///
/// Buffers are handed out as [`LeasedBuffer`] guards and go back to the pool when the guard is
/// dropped, so a lease is released exactly once on every exit path, including `?` returns and
/// panics unwinding through the holder. A returned buffer is cleared but keeps its capacity, so
/// each pooled buffer grows to the largest size ever asked of it.
///
/// At most `max_idle` buffers are kept once returned. Buffers returned beyond that are freed, so
/// a burst of concurrent requests does not pin its peak memory for the life of the pool.
#[derive(Debug)]
pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
    outstanding: AtomicUsize,
    max_idle: usize,
}

/// The number of idle buffers a [`BufferPool`] keeps by default.
pub const DEFAULT_MAX_IDLE_BUFFERS: usize = 16;

impl Default for BufferPool {
    fn default() -> Self {
        Self::with_max_idle(DEFAULT_MAX_IDLE_BUFFERS)
    }
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pool keeping at most `max_idle` returned buffers.
    pub fn with_max_idle(max_idle: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            outstanding: AtomicUsize::new(0),
            max_idle,
        }
    }

    /// Take a buffer out of the pool, allocating an empty one if none are idle.
    pub fn lease(&self) -> LeasedBuffer<'_> {
        let buf = self.free.lock().pop().unwrap_or_default();
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        LeasedBuffer { buf, pool: self }
    }

    fn release(&self, mut buf: Vec<u8>) {
        buf.clear();
        {
            let mut free = self.free.lock();
            if free.len() < self.max_idle {
                free.push(buf);
            }
        }
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }

    /// Number of buffers currently leased.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Number of buffers sitting idle in the pool.
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }
}

/// Exclusive handle to a pooled buffer, returned to its [`BufferPool`] on drop.
pub struct LeasedBuffer<'a> {
    buf: Vec<u8>,
    pool: &'a BufferPool,
}

impl Deref for LeasedBuffer<'_> {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl DerefMut for LeasedBuffer<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}

impl Drop for LeasedBuffer<'_> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buf));
    }
}

impl fmt::Debug for LeasedBuffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeasedBuffer")
            .field("len", &self.buf.len())
            .field("capacity", &self.buf.capacity())
            .finish()
    }
}
