//! # Reference-Counted Page Allocator
//!
//! The free list, the reference count table and the bootstrap state, tied
//! together under one interrupt-safe spin lock.
//!
//! ## Lock discipline
//!
//! | Operation                         | Lock                          |
//! |-----------------------------------|-------------------------------|
//! | `allocate`, `free` (active)       | held for the whole operation  |
//! | `allocate`, `free` (bootstrapping) | none; single-threaded by contract |
//! | `get/inc/dec_refcount`            | none; callers synchronize     |
//! | `free_pages`                      | none; snapshot                |

use crate::addresses::{PhysicalAddress, VirtualAddress};
use crate::bootstrap::{BootstrapState, StateCell, whole_pages};
use crate::error::{BootstrapError, FreeError, LayoutError};
use crate::free_list::FreeList;
use crate::layout::MemoryLayout;
use crate::page;
use crate::refcount::RefcountTable;
use core::sync::atomic::{AtomicUsize, Ordering};
use kernel_sync::{Interrupts, SpinLock, SyncOnceCell};
use log::{debug, error, info, trace};

/// What a successful [`PageAllocator::try_free`] did with the page.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FreeOutcome {
    /// The page was poisoned and pushed onto the free list.
    Released,
    /// Other owners remain; the page is untouched. Holds the remaining count.
    StillShared(u32),
}

/// Physical page allocator with per-page reference counts.
///
/// `PAGES` is the number of reference count slots, i.e. `phys_top >> 12` for
/// the largest layout this instance will be bootstrapped with. `I` chooses
/// how the lock masks interrupts.
///
/// Construction is `const`, so the kernel's instance can live in a `static`:
///
/// ```
/// use kernel_page_alloc::{PageAllocator, PHYS_PAGES};
/// use kernel_sync::NoInterrupts;
///
/// static PAGES: PageAllocator<PHYS_PAGES, NoInterrupts> = PageAllocator::new();
/// assert_eq!(PAGES.free_pages(), 0);
/// assert!(PAGES.allocate().is_none());
/// ```
pub struct PageAllocator<const PAGES: usize, I: Interrupts> {
    kmem: SpinLock<FreeList, I>,
    state: StateCell,
    layout: SyncOnceCell<MemoryLayout>,
    refcounts: RefcountTable<PAGES>,
    free_pages: AtomicUsize,
}

impl<const PAGES: usize, I: Interrupts> Default for PageAllocator<PAGES, I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const PAGES: usize, I: Interrupts> PageAllocator<PAGES, I> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            kmem: SpinLock::new(FreeList::new()),
            state: StateCell::new(),
            layout: SyncOnceCell::new(),
            refcounts: RefcountTable::new(),
            free_pages: AtomicUsize::new(0),
        }
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> BootstrapState {
        self.state.load()
    }

    /// The layout installed by phase 1, if it ran.
    #[inline]
    #[must_use]
    pub fn layout(&self) -> Option<&MemoryLayout> {
        self.layout.get()
    }

    /// `V2P` through the installed layout.
    #[inline]
    #[must_use]
    pub fn virt_to_phys(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        self.layout().map(|l| l.virt_to_phys(va))
    }

    /// Bootstrap phase 1: install `layout` and seed the free list with every
    /// whole page in `[start, end)`.
    ///
    /// Locking and reference counting stay off. Returns the number of pages
    /// seeded; zero is not an error.
    ///
    /// # Errors
    /// [`BootstrapError::Layout`] if `layout` needs more refcount slots than
    /// `PAGES`; [`BootstrapError::AlreadySeeding`] or
    /// [`BootstrapError::AlreadyActive`] if phase 1 already ran.
    ///
    /// # Safety
    /// - Every page in the range must be writable, mapped at
    ///   `layout.phys_to_virt(pa)`, and unused by anything else.
    /// - No other core or interrupt handler may use this allocator until
    ///   [`bootstrap_phase2`](Self::bootstrap_phase2) returns.
    ///
    /// # Panics
    /// If a page in the range fails `free`'s validation against `layout`.
    pub unsafe fn bootstrap_phase1(
        &self,
        layout: MemoryLayout,
        start: VirtualAddress,
        end: VirtualAddress,
    ) -> Result<usize, BootstrapError> {
        if layout.table_len() > PAGES {
            return Err(LayoutError::TableTooSmall {
                needed: layout.table_len(),
                available: PAGES,
            }
            .into());
        }
        self.state.begin_seeding()?;
        if self.layout.set(layout).is_err() {
            return Err(BootstrapError::AlreadySeeding);
        }

        let seeded = unsafe { self.seed(start, end) };
        info!(
            "kalloc phase 1: seeded {seeded} pages from [{start}, {end}), {} free",
            self.free_pages()
        );
        Ok(seeded)
    }

    /// Bootstrap phase 2: seed `[start, end)`, then clear every reference
    /// count and switch to locked, refcounted operation.
    ///
    /// The table is cleared only after the seeding returns: seeding runs the
    /// same free path that, once active, decrements counts.
    ///
    /// # Errors
    /// [`BootstrapError::NotSeeding`] before phase 1,
    /// [`BootstrapError::AlreadyActive`] after a previous phase 2.
    ///
    /// # Safety
    /// As [`bootstrap_phase1`](Self::bootstrap_phase1). Pages allocated
    /// between the phases keep no reference: their counts are cleared here,
    /// so they must never be freed.
    ///
    /// # Panics
    /// If a page in the range fails `free`'s validation.
    pub unsafe fn bootstrap_phase2(
        &self,
        start: VirtualAddress,
        end: VirtualAddress,
    ) -> Result<usize, BootstrapError> {
        self.state.expect_seeding()?;

        let seeded = unsafe { self.seed(start, end) };
        self.refcounts.clear();
        self.state.activate();
        info!(
            "kalloc phase 2: seeded {seeded} pages from [{start}, {end}); locking active, {} free",
            self.free_pages()
        );
        Ok(seeded)
    }

    /// Pushes every whole page in `[start, end)` through the bootstrap free path.
    unsafe fn seed(&self, start: VirtualAddress, end: VirtualAddress) -> usize {
        if let Some(first) = start.page_round_up()
            && first != start
        {
            debug!(
                "kalloc: skipping {} bytes before the first page boundary at {start}",
                first.as_u64() - start.as_u64()
            );
        }

        let mut seeded = 0;
        for va in whole_pages(start, end) {
            unsafe { self.free(va) };
            seeded += 1;
        }
        if seeded == 0 {
            debug!("kalloc: [{start}, {end}) holds no whole page");
        }
        seeded
    }

    /// Allocates one page.
    ///
    /// Returns `None` when no page is free; callers must handle it. A fresh
    /// page has reference count 1 and still holds the poison pattern (plus
    /// the stale free-list link in its first word); it is **not** zeroed.
    #[must_use]
    pub fn allocate(&self) -> Option<VirtualAddress> {
        match self.state.load() {
            BootstrapState::Unseeded => None,
            BootstrapState::Active => {
                let mut kmem = self.kmem.lock();
                self.take(&mut kmem)
            }
            BootstrapState::Seeding => {
                // SAFETY: while seeding, the bootstrap contract excludes all
                // concurrent use of the allocator.
                let kmem = unsafe { &mut *self.kmem.as_mut_ptr() };
                self.take(kmem)
            }
        }
    }

    /// Pops the head and hands it out with a single reference.
    fn take(&self, kmem: &mut FreeList) -> Option<VirtualAddress> {
        let va = kmem.pop()?;
        self.free_pages.fetch_sub(1, Ordering::Relaxed);
        if let Some(layout) = self.layout() {
            self.refcounts.set(layout.virt_to_phys(va), 1);
        }
        Some(va)
    }

    /// Allocates one page and zeroes it.
    #[must_use]
    pub fn allocate_zeroed(&self) -> Option<VirtualAddress> {
        let va = self.allocate()?;
        // SAFETY: the page was just handed to us with a single reference.
        unsafe { page::zero(va) };
        Some(va)
    }

    /// Drops one reference to the page at `va`, returning it to the pool when
    /// the last reference goes.
    ///
    /// Halts (panics) on any [`FreeError`]: a misaligned address, one below
    /// the kernel image or at/above the physical top, or a page whose count
    /// is already zero.
    ///
    /// # Safety
    /// - `va` must be a page obtained from [`allocate`](Self::allocate) (or,
    ///   during bootstrap, a page the caller owns), and the caller must stop
    ///   using it unless it holds another reference.
    /// - Before activation, no other context may use the allocator.
    pub unsafe fn free(&self, va: VirtualAddress) {
        if let Err(e) = unsafe { self.try_free(va) } {
            error!("kfree: {e}");
            panic!("kfree: {e}");
        }
    }

    /// [`free`](Self::free) without the halt.
    ///
    /// # Errors
    /// The [`FreeError`] `free` would halt with. Nothing is modified in that
    /// case.
    ///
    /// # Safety
    /// As [`free`](Self::free).
    pub unsafe fn try_free(&self, va: VirtualAddress) -> Result<FreeOutcome, FreeError> {
        let pa = self.validate_free(va)?;

        if !self.state.is_active() {
            // SAFETY: bootstrap contract, see `allocate`.
            let kmem = unsafe { &mut *self.kmem.as_mut_ptr() };
            unsafe { self.release(kmem, va) };
            return Ok(FreeOutcome::Released);
        }

        let mut kmem = self.kmem.lock();

        // Drop the reference first; only the last owner frees.
        if self.refcounts.get(pa) == 0 {
            return Err(FreeError::RefcountUnderflow { va, pa });
        }
        let remaining = self.refcounts.decrement(pa);
        if remaining > 0 {
            trace!("kfree: {va} still shared ({remaining} references)");
            return Ok(FreeOutcome::StillShared(remaining));
        }

        unsafe { self.release(&mut kmem, va) };
        Ok(FreeOutcome::Released)
    }

    /// Poisons the page, pushes it and counts it.
    unsafe fn release(&self, kmem: &mut FreeList, va: VirtualAddress) {
        unsafe {
            page::poison(va);
            kmem.push(va);
        }
        self.free_pages.fetch_add(1, Ordering::Relaxed);
    }

    /// Runs `free`'s address checks without touching anything.
    ///
    /// Returns the page's physical address on success.
    ///
    /// # Errors
    /// [`FreeError::NotBootstrapped`], [`FreeError::Misaligned`],
    /// [`FreeError::BelowKernelEnd`] or [`FreeError::AbovePhysTop`].
    pub fn validate_free(&self, va: VirtualAddress) -> Result<PhysicalAddress, FreeError> {
        let layout = self.layout().ok_or(FreeError::NotBootstrapped { va })?;

        if !va.is_page_aligned() {
            return Err(FreeError::Misaligned { va });
        }
        if va < layout.kernel_end() {
            return Err(FreeError::BelowKernelEnd {
                va,
                kernel_end: layout.kernel_end(),
            });
        }
        let pa = layout.virt_to_phys(va);
        if pa >= layout.phys_top() {
            return Err(FreeError::AbovePhysTop {
                va,
                pa,
                phys_top: layout.phys_top(),
            });
        }
        Ok(pa)
    }

    /// Number of pages currently in the free list.
    #[inline]
    #[must_use]
    pub fn free_pages(&self) -> usize {
        self.free_pages.load(Ordering::Relaxed)
    }

    /// Walks the free list and counts it. Linear; for audits and tests.
    ///
    /// Always equal to [`free_pages`](Self::free_pages) when nothing runs
    /// concurrently.
    #[must_use]
    pub fn count_free_list(&self) -> usize {
        self.with_free_list(FreeList::count)
    }

    /// Whether the page at `va` is currently in the free list. Linear.
    #[must_use]
    pub fn is_free(&self, va: VirtualAddress) -> bool {
        self.with_free_list(|list| list.contains(va))
    }

    fn with_free_list<R>(&self, f: impl FnOnce(&FreeList) -> R) -> R {
        if self.state.is_active() {
            f(&*self.kmem.lock())
        } else {
            // SAFETY: bootstrap contract, see `allocate`.
            f(unsafe { &*self.kmem.as_mut_ptr() })
        }
    }

    /// Reference count of the page containing `pa`.
    ///
    /// Not synchronized with `allocate`/`free`, and meaningless before phase
    /// 2 finished.
    ///
    /// # Panics
    /// If `pa` lies beyond the table (a caller contract violation).
    #[inline]
    #[must_use]
    pub fn get_refcount(&self, pa: PhysicalAddress) -> u32 {
        self.refcounts.get(pa)
    }

    /// Adds a sharer to an allocated page (e.g. a copy-on-write child).
    ///
    /// Not synchronized with `allocate`/`free`: the caller must hold whatever
    /// lock serializes the page's owners. No overflow check.
    ///
    /// # Panics
    /// If `pa` lies beyond the table.
    #[inline]
    pub fn inc_refcount(&self, pa: PhysicalAddress) {
        self.refcounts.increment(pa);
    }

    /// Removes a sharer without freeing the page.
    ///
    /// Not synchronized, and no underflow check: decrementing a zero count
    /// corrupts it. Use [`free`](Self::free) to detect double frees.
    ///
    /// # Panics
    /// If `pa` lies beyond the table.
    #[inline]
    pub fn dec_refcount(&self, pa: PhysicalAddress) {
        self.refcounts.decrement(pa);
    }
}
