//! # Page Reference Counts
//!
//! One counter per physical page below the table's ceiling, indexed by
//! `pa >> PAGE_SHIFT`. The counters are atomics so that shared access is
//! memory safe, but every read-modify-write here is a separate relaxed
//! operation: none of them is ordered with the allocator's critical section.

use crate::addresses::PhysicalAddress;
use core::sync::atomic::{AtomicU32, Ordering};

/// Dense reference count table for `PAGES` physical pages.
pub struct RefcountTable<const PAGES: usize> {
    counts: [AtomicU32; PAGES],
}

impl<const PAGES: usize> Default for RefcountTable<PAGES> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const PAGES: usize> RefcountTable<PAGES> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counts: [const { AtomicU32::new(0) }; PAGES],
        }
    }

    /// Number of pages covered.
    #[must_use]
    pub const fn len(&self) -> usize {
        PAGES
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        PAGES == 0
    }

    #[inline]
    fn slot(&self, pa: PhysicalAddress) -> &AtomicU32 {
        &self.counts[pa.page_index()]
    }

    /// Current count of the page containing `pa`.
    ///
    /// # Panics
    /// If `pa` lies beyond the table.
    #[inline]
    #[must_use]
    pub fn get(&self, pa: PhysicalAddress) -> u32 {
        self.slot(pa).load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set(&self, pa: PhysicalAddress, count: u32) {
        self.slot(pa).store(count, Ordering::Relaxed);
    }

    /// Adds one reference; no overflow check. Returns the new count.
    ///
    /// # Panics
    /// If `pa` lies beyond the table.
    #[inline]
    pub fn increment(&self, pa: PhysicalAddress) -> u32 {
        self.slot(pa).fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Drops one reference; no underflow check (zero wraps). Returns the new count.
    ///
    /// # Panics
    /// If `pa` lies beyond the table.
    #[inline]
    pub fn decrement(&self, pa: PhysicalAddress) -> u32 {
        self.slot(pa).fetch_sub(1, Ordering::Relaxed).wrapping_sub(1)
    }

    /// Resets every counter to zero.
    pub(crate) fn clear(&self) {
        for count in &self.counts {
            count.store(0, Ordering::Relaxed);
        }
    }
}
