use crate::addresses::VirtualAddress;
use crate::error::BootstrapError;
use crate::layout::PAGE_SIZE;
use core::sync::atomic::{AtomicU8, Ordering};

/// Where the allocator is in its two-phase start-up.
///
/// Only [`Active`](Self::Active) takes the interrupt-safe lock and maintains
/// reference counts; in the other states `free` and `allocate` touch the free
/// list directly.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum BootstrapState {
    /// Constructed; no layout, no pages.
    Unseeded = 0,
    /// Phase 1 ran (phase 2 may be running). Unlocked, unrefcounted.
    Seeding = 1,
    /// Phase 2 finished: locking and refcounting are in effect.
    Active = 2,
}

impl BootstrapState {
    const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Unseeded,
            1 => Self::Seeding,
            _ => Self::Active,
        }
    }
}

/// Atomic holder for a [`BootstrapState`].
///
/// The transition to `Active` is a release store, so a core that observes
/// `Active` also observes everything seeded before it.
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) const fn new() -> Self {
        Self(AtomicU8::new(BootstrapState::Unseeded as u8))
    }

    #[inline]
    pub(crate) fn load(&self) -> BootstrapState {
        BootstrapState::from_u8(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn is_active(&self) -> bool {
        self.load() == BootstrapState::Active
    }

    /// `Unseeded -> Seeding`.
    pub(crate) fn begin_seeding(&self) -> Result<(), BootstrapError> {
        self.0
            .compare_exchange(
                BootstrapState::Unseeded as u8,
                BootstrapState::Seeding as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(|current| match BootstrapState::from_u8(current) {
                BootstrapState::Active => BootstrapError::AlreadyActive,
                _ => BootstrapError::AlreadySeeding,
            })
    }

    /// Fails unless phase 1 ran and phase 2 has not finished.
    pub(crate) fn expect_seeding(&self) -> Result<(), BootstrapError> {
        match self.load() {
            BootstrapState::Seeding => Ok(()),
            BootstrapState::Unseeded => Err(BootstrapError::NotSeeding),
            BootstrapState::Active => Err(BootstrapError::AlreadyActive),
        }
    }

    /// `Seeding -> Active`.
    pub(crate) fn activate(&self) {
        self.0.store(BootstrapState::Active as u8, Ordering::Release);
    }
}

/// Every whole page in `[start, end)`, starting at `start` rounded up.
///
/// Bytes before the first boundary and a trailing partial page are skipped.
pub(crate) fn whole_pages(
    start: VirtualAddress,
    end: VirtualAddress,
) -> impl Iterator<Item = VirtualAddress> {
    let end = end.as_u64();
    let (first, count) = match start.page_round_up() {
        Some(first) if first.as_u64() < end => {
            let first = first.as_u64();
            (first, (end - first) / PAGE_SIZE)
        }
        _ => (0, 0),
    };
    (0..count).map(move |i| VirtualAddress::new(first + i * PAGE_SIZE))
}
