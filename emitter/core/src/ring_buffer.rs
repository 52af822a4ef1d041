//! Shared Ring Buffer
//!
//! Multi-producer, multi-consumer, condition-variable signalled ring buffer
//! over contiguous storage. Used to queue progress reports between a worker
//! thread and the dispatch task without reallocating per item.
//!
//! # Index Arithmetic
//!
//! The read and write positions are free-running `u64` counters. Their
//! difference is the number of queued items and the slot is `index & mask`.
//! Wrapping subtraction keeps that correct across overflow only when the
//! capacity divides 2^64, so the capacity must be a power of two.
//!
//! # Closing
//!
//! [`RingBuffer::close`] is checked under the same lock as every push, so a
//! push either lands before the close (and is seen by a later pop) or is
//! handed back. Pops keep draining a closed buffer.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

/// Errors raised when constructing a ring buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RingBufferError {
    /// Capacity is zero or not a power of two
    #[error("ring buffer capacity must be a non-zero power of two, got {0}")]
    InvalidCapacity(usize),
}

struct Slots<T> {
    buf: Vec<Option<T>>,
    read_idx: u64,
    write_idx: u64,
    closed: bool,
}

impl<T> Slots<T> {
    fn len(&self) -> u64 {
        self.write_idx.wrapping_sub(self.read_idx)
    }
}

/// Bounded FIFO shared between producers and consumers
pub struct RingBuffer<T> {
    slots: Mutex<Slots<T>>,
    /// Signalled when an item is pushed
    readable: Condvar,
    /// Signalled when an item is popped
    writable: Condvar,
    capacity: usize,
    mask: u64,
}

impl<T> RingBuffer<T> {
    /// Create a ring buffer holding at most `capacity` items
    ///
    /// # Errors
    ///
    /// Returns [`RingBufferError::InvalidCapacity`] unless `capacity` is a
    /// non-zero power of two.
    pub fn with_capacity(capacity: usize) -> Result<Self, RingBufferError> {
        if !capacity.is_power_of_two() {
            return Err(RingBufferError::InvalidCapacity(capacity));
        }

        let mut buf = Vec::with_capacity(capacity);
        buf.resize_with(capacity, || None);

        Ok(Self {
            slots: Mutex::new(Slots {
                buf,
                read_idx: 0,
                write_idx: 0,
                closed: false,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
            capacity,
            mask: capacity as u64 - 1,
        })
    }

    /// Maximum number of queued items
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of queued items
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn len(&self) -> usize {
        // never exceeds capacity, which is a usize
        self.slots.lock().len() as usize
    }

    /// Whether nothing is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.lock().len() == 0
    }

    /// Whether the buffer is at capacity
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.slots.lock().len() > self.mask
    }

    /// Whether at least one item can be popped
    #[must_use]
    pub fn read_available(&self) -> bool {
        !self.is_empty()
    }

    /// Refuse every later push and wake blocked producers
    ///
    /// Items already queued stay poppable.
    pub fn close(&self) {
        self.slots.lock().closed = true;
        self.writable.notify_all();
    }

    /// Whether [`RingBuffer::close`] has been called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.slots.lock().closed
    }

    /// Push without blocking
    ///
    /// # Errors
    ///
    /// Hands `val` back when the buffer is full or closed.
    pub fn push(&self, val: T) -> Result<(), T> {
        let mut slots = self.slots.lock();
        let result = self.enqueue_locked(&mut slots, val);
        drop(slots);

        if result.is_ok() {
            self.readable.notify_one();
        }
        result
    }

    /// Push, waiting for space if the buffer is full
    ///
    /// # Errors
    ///
    /// Hands `val` back if the buffer is or becomes closed.
    pub fn push_blocking(&self, val: T) -> Result<(), T> {
        let mut slots = self.slots.lock();
        let mut pending = val;
        loop {
            match self.enqueue_locked(&mut slots, pending) {
                Ok(()) => break,
                Err(back) if slots.closed => return Err(back),
                Err(back) => {
                    pending = back;
                    self.writable.wait(&mut slots);
                }
            }
        }
        drop(slots);
        self.readable.notify_one();
        Ok(())
    }

    /// Push, waiting at most `timeout` for space
    ///
    /// # Errors
    ///
    /// Hands `val` back if the buffer is closed, or still full when
    /// `timeout` elapses.
    pub fn push_timeout(&self, val: T, timeout: Duration) -> Result<(), T> {
        let deadline = Instant::now() + timeout;
        let mut slots = self.slots.lock();
        let mut pending = val;
        loop {
            match self.enqueue_locked(&mut slots, pending) {
                Ok(()) => {
                    drop(slots);
                    self.readable.notify_one();
                    return Ok(());
                }
                Err(back) if slots.closed => return Err(back),
                Err(back) => {
                    if self.writable.wait_until(&mut slots, deadline).timed_out() {
                        let result = self.enqueue_locked(&mut slots, back);
                        drop(slots);
                        if result.is_ok() {
                            self.readable.notify_one();
                        }
                        return result;
                    }
                    pending = back;
                }
            }
        }
    }

    /// Pop without blocking
    pub fn pop(&self) -> Option<T> {
        let mut slots = self.slots.lock();
        let item = self.dequeue_locked(&mut slots);
        drop(slots);

        if item.is_some() {
            self.writable.notify_all();
        }
        item
    }

    /// Pop, waiting until an item is available
    pub fn pop_blocking(&self) -> T {
        let mut slots = self.slots.lock();
        loop {
            if let Some(item) = self.dequeue_locked(&mut slots) {
                drop(slots);
                self.writable.notify_all();
                return item;
            }
            self.readable.wait(&mut slots);
        }
    }

    /// Pop, waiting at most `timeout` for an item
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut slots = self.slots.lock();
        loop {
            if let Some(item) = self.dequeue_locked(&mut slots) {
                drop(slots);
                self.writable.notify_all();
                return Some(item);
            }
            if self.readable.wait_until(&mut slots, deadline).timed_out() {
                let item = self.dequeue_locked(&mut slots);
                drop(slots);
                if item.is_some() {
                    self.writable.notify_all();
                }
                return item;
            }
        }
    }

    fn enqueue_locked(&self, slots: &mut Slots<T>, val: T) -> Result<(), T> {
        if slots.closed || slots.len() > self.mask {
            return Err(val);
        }
        let idx = self.slot_index(slots.write_idx);
        slots.buf[idx] = Some(val);
        slots.write_idx = slots.write_idx.wrapping_add(1);
        Ok(())
    }

    fn dequeue_locked(&self, slots: &mut Slots<T>) -> Option<T> {
        if slots.len() == 0 {
            return None;
        }
        let idx = self.slot_index(slots.read_idx);
        let item = slots.buf[idx].take();
        slots.read_idx = slots.read_idx.wrapping_add(1);
        item
    }

    #[allow(clippy::cast_possible_truncation)]
    fn slot_index(&self, idx: u64) -> usize {
        (idx & self.mask) as usize
    }
}

impl<T> std::fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_capacity() {
        assert_eq!(
            RingBuffer::<u8>::with_capacity(0).unwrap_err(),
            RingBufferError::InvalidCapacity(0)
        );
        assert_eq!(
            RingBuffer::<u8>::with_capacity(12).unwrap_err(),
            RingBufferError::InvalidCapacity(12)
        );
        assert!(RingBuffer::<u8>::with_capacity(1).is_ok());
        assert!(RingBuffer::<u8>::with_capacity(16).is_ok());
    }

    #[test]
    fn test_push_pop_non_blocking() {
        let buf = RingBuffer::with_capacity(2).unwrap();

        assert!(buf.push("Test 1".to_string()).is_ok());
        assert!(buf.push("Test 2".to_string()).is_ok());
        assert!(buf.is_full());

        // Full: the value comes back
        assert_eq!(buf.push("Test 3".to_string()), Err("Test 3".to_string()));

        assert_eq!(buf.pop().as_deref(), Some("Test 1"));
        assert_eq!(buf.pop().as_deref(), Some("Test 2"));
        assert_eq!(buf.pop(), None);
        assert!(buf.is_empty());
        assert!(!buf.read_available());
    }

    #[test]
    fn test_cycles_past_capacity() {
        let buf = RingBuffer::with_capacity(4).unwrap();
        for i in 0..50usize {
            buf.push(Box::new(i)).unwrap();
            assert_eq!(*buf.pop_blocking(), i);
        }
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn test_fifo_with_interleaving() {
        let buf = RingBuffer::with_capacity(4).unwrap();
        buf.push(1).unwrap();
        buf.push(2).unwrap();
        assert_eq!(buf.pop(), Some(1));
        buf.push(3).unwrap();
        buf.push(4).unwrap();
        buf.push(5).unwrap();
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.push(6), Err(6));
        assert_eq!(buf.pop(), Some(2));
        assert_eq!(buf.pop(), Some(3));
        assert_eq!(buf.pop(), Some(4));
        assert_eq!(buf.pop(), Some(5));
    }

    #[test]
    fn test_pop_timeout_empty() {
        let buf = RingBuffer::<u32>::with_capacity(2).unwrap();
        assert_eq!(buf.pop_timeout(Duration::from_millis(5)), None);
        buf.push(7).unwrap();
        assert_eq!(buf.pop_timeout(Duration::from_millis(5)), Some(7));
    }

    #[test]
    fn test_indices_wrap_at_u64_max() {
        let buf = RingBuffer::with_capacity(4).unwrap();
        {
            let mut slots = buf.slots.lock();
            slots.read_idx = u64::MAX - 1;
            slots.write_idx = u64::MAX - 1;
        }
        for i in 0..4 {
            buf.push(i).unwrap();
        }
        assert!(buf.is_full());
        for i in 0..4 {
            assert_eq!(buf.pop(), Some(i));
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn test_push_timeout_full() {
        let buf = RingBuffer::with_capacity(1).unwrap();
        buf.push(1u8).unwrap();
        assert_eq!(buf.push_timeout(2, Duration::from_millis(5)), Err(2));
        assert_eq!(buf.pop(), Some(1));
        assert_eq!(buf.push_timeout(2, Duration::from_millis(5)), Ok(()));
    }

    #[test]
    fn test_close_refuses_pushes_but_drains() {
        let buf = RingBuffer::with_capacity(4).unwrap();
        buf.push(1u8).unwrap();
        buf.close();

        assert!(buf.is_closed());
        assert_eq!(buf.push(2), Err(2));
        assert_eq!(buf.push_blocking(3), Err(3));
        assert_eq!(buf.push_timeout(4, Duration::from_secs(5)), Err(4));
        assert_eq!(buf.pop(), Some(1));
        assert_eq!(buf.pop(), None);
    }

    #[test]
    fn test_debug_output() {
        let buf = RingBuffer::<u8>::with_capacity(8).unwrap();
        buf.push(1).unwrap();
        assert_eq!(format!("{buf:?}"), "RingBuffer { capacity: 8, len: 1 }");
    }
}
