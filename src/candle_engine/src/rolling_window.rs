//! Fixed-capacity sliding window with incrementally maintained aggregates.
//!
//! A [`RollingWindow`] keeps the last `capacity` samples and answers `sum`, `max`
//! and `min` in O(1):
//! - the running sum is adjusted on every push, eviction and revision;
//! - max/min come from two monotonic deques of `(sequence, value)` pairs, so a push
//!   costs O(1) amortized and an eviction pops at most one entry from each front.
//!
//! [`RollingWindow::replace_last`] revises the newest sample in place. The sum is
//! adjusted by removing the old contribution before adding the new one. The deques
//! are patched in place when the revision moves in their favour and rebuilt from the
//! buffer otherwise (O(capacity), only on the unfavourable side).
//!
//! Floating-point sums are re-derived from the buffer once every `capacity`
//! evictions, which bounds accumulated rounding error at O(1) amortized cost.

use std::{
    collections::VecDeque,
    ops::{Add, Sub},
};

use thiserror::Error;

/// Errors raised when constructing a window.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    /// A window must hold at least one sample.
    #[error("rolling window capacity must be greater than zero")]
    ZeroCapacity,
}

/// Numeric sample types a [`RollingWindow`] can aggregate.
pub trait WindowValue:
    Copy + PartialOrd + Default + Add<Output = Self> + Sub<Output = Self>
{
}

impl<T> WindowValue for T where
    T: Copy + PartialOrd + Default + Add<Output = T> + Sub<Output = T>
{
}

/// A capacity-N buffer of samples plus running sum, max and min.
#[derive(Debug, Clone)]
pub struct RollingWindow<T> {
    buffer: VecDeque<T>,
    capacity: usize,
    sum: T,
    /// Sequence number the next pushed sample will receive.
    next_seq: u64,
    maxima: VecDeque<(u64, T)>,
    minima: VecDeque<(u64, T)>,
    evictions_since_resum: usize,
}

impl<T: WindowValue> RollingWindow<T> {
    /// Create an empty window holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Result<Self, WindowError> {
        if capacity == 0 {
            return Err(WindowError::ZeroCapacity);
        }
        Ok(Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
            sum: T::default(),
            next_seq: 0,
            maxima: VecDeque::new(),
            minima: VecDeque::new(),
            evictions_since_resum: 0,
        })
    }

    /// Maximum number of samples retained.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of samples currently held.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// `true` when no sample has been pushed since construction or the last clear.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// `true` once `capacity` samples are held; every further push evicts.
    pub fn is_full(&self) -> bool {
        self.buffer.len() == self.capacity
    }

    /// Running sum of the held samples.
    pub fn sum(&self) -> T {
        self.sum
    }

    /// Largest held sample.
    pub fn max(&self) -> Option<T> {
        self.maxima.front().map(|&(_, v)| v)
    }

    /// Smallest held sample.
    pub fn min(&self) -> Option<T> {
        self.minima.front().map(|&(_, v)| v)
    }

    /// Newest sample.
    pub fn last(&self) -> Option<T> {
        self.buffer.back().copied()
    }

    /// Oldest sample.
    pub fn first(&self) -> Option<T> {
        self.buffer.front().copied()
    }

    /// Samples from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.buffer.iter()
    }

    /// Append a sample, evicting and returning the oldest one when full.
    pub fn push(&mut self, value: T) -> Option<T> {
        let evicted = if self.is_full() {
            self.evict_oldest()
        } else {
            None
        };

        self.buffer.push_back(value);
        self.sum = self.sum + value;
        let seq = self.next_seq;
        self.next_seq += 1;
        push_max(&mut self.maxima, seq, value);
        push_min(&mut self.minima, seq, value);

        if evicted.is_some() {
            self.evictions_since_resum += 1;
            if self.evictions_since_resum >= self.capacity {
                self.resum();
            }
        }
        evicted
    }

    /// Replace the newest sample in place and return the value it replaced.
    ///
    /// Returns `None` (and does nothing) on an empty window.
    pub fn replace_last(&mut self, value: T) -> Option<T> {
        let slot = self.buffer.back_mut()?;
        let old = std::mem::replace(slot, value);
        self.sum = self.sum - old + value;

        // The newest sample always sits at the back of both deques.
        let seq = self.next_seq - 1;
        if value >= old {
            self.maxima.pop_back();
            push_max(&mut self.maxima, seq, value);
        } else {
            self.rebuild_maxima();
        }
        if value <= old {
            self.minima.pop_back();
            push_min(&mut self.minima, seq, value);
        } else {
            self.rebuild_minima();
        }
        Some(old)
    }

    /// Drop every sample; capacity is unchanged.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.maxima.clear();
        self.minima.clear();
        self.sum = T::default();
        self.evictions_since_resum = 0;
    }

    fn evict_oldest(&mut self) -> Option<T> {
        let old = self.buffer.pop_front()?;
        let old_seq = self.next_seq - self.capacity as u64;
        self.sum = self.sum - old;
        if self.maxima.front().is_some_and(|&(s, _)| s == old_seq) {
            self.maxima.pop_front();
        }
        if self.minima.front().is_some_and(|&(s, _)| s == old_seq) {
            self.minima.pop_front();
        }
        Some(old)
    }

    fn first_seq(&self) -> u64 {
        self.next_seq - self.buffer.len() as u64
    }

    fn rebuild_maxima(&mut self) {
        self.maxima.clear();
        let start = self.first_seq();
        for (offset, &v) in self.buffer.iter().enumerate() {
            push_max(&mut self.maxima, start + offset as u64, v);
        }
    }

    fn rebuild_minima(&mut self) {
        self.minima.clear();
        let start = self.first_seq();
        for (offset, &v) in self.buffer.iter().enumerate() {
            push_min(&mut self.minima, start + offset as u64, v);
        }
    }

    fn resum(&mut self) {
        self.sum = self.buffer.iter().fold(T::default(), |acc, &v| acc + v);
        self.evictions_since_resum = 0;
    }
}

impl RollingWindow<f64> {
    /// Arithmetic mean of the held samples.
    pub fn mean(&self) -> Option<f64> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.sum / self.buffer.len() as f64)
        }
    }
}

fn push_max<T: WindowValue>(deque: &mut VecDeque<(u64, T)>, seq: u64, value: T) {
    while deque.back().is_some_and(|&(_, v)| v <= value) {
        deque.pop_back();
    }
    deque.push_back((seq, value));
}

fn push_min<T: WindowValue>(deque: &mut VecDeque<(u64, T)>, seq: u64, value: T) {
    while deque.back().is_some_and(|&(_, v)| v >= value) {
        deque.pop_back();
    }
    deque.push_back((seq, value));
}
