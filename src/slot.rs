//! Single-slot "latest value" cell shared between a producer and readers.
//!
//! Publishing replaces whatever was there; there is no queue. Readers get
//! the most recent value together with its generation number, so a reader
//! that ticks faster than the producer sees the same generation repeatedly.
//! The lock is held only for the swap or the `Arc` clone.

use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug)]
pub struct LatestSlot<T> {
    inner: Mutex<Inner<T>>,
}

#[derive(Debug)]
struct Inner<T> {
    generation: u64,
    value: Option<Arc<T>>,
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LatestSlot<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                generation: 0,
                value: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        // a panicked writer cannot leave the slot half-written
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the current value; returns the new generation.
    pub fn publish(&self, value: T) -> u64 {
        let mut g = self.lock();
        g.generation += 1;
        g.value = Some(Arc::new(value));
        g.generation
    }

    /// The most recent value and its generation, if anything was published.
    pub fn latest(&self) -> Option<(u64, Arc<T>)> {
        let g = self.lock();
        g.value.as_ref().map(|v| (g.generation, Arc::clone(v)))
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }
}
