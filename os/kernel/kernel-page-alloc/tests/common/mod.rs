//! Hosted stand-in for physical memory.
//!
//! An [`Arena`] is a page-aligned heap buffer that plays the part of the
//! direct-mapped RAM right after the kernel image: its first page sits at
//! physical [`PHYS_BASE`] and the physical top is the end of the buffer.

#![allow(dead_code)]

use kernel_page_alloc::layout::EXTENDED_MEM;
use kernel_page_alloc::{
    MemoryLayout, PAGE_SIZE, Page, PageAllocator, PhysicalAddress, VirtualAddress,
};
use kernel_sync::NoInterrupts;
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::cell::RefCell;
use std::sync::Once;

/// Physical address of the arena's first page.
pub const PHYS_BASE: u64 = EXTENDED_MEM;

/// Refcount slots in test allocators; covers arenas of up to 256 pages.
pub const TABLE: usize = 512;

pub type TestAllocator = PageAllocator<TABLE, NoInterrupts>;

pub struct Arena {
    base: *mut Page,
    len: usize,
    _pages: Vec<Page>,
}

// Safety: the arena only hands out addresses; access goes through the allocator.
unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

impl Arena {
    pub fn new(len: usize) -> Self {
        assert!(PHYS_BASE / PAGE_SIZE + len as u64 <= TABLE as u64);
        let mut pages: Vec<Page> = (0..len).map(|_| Page::zeroed()).collect();
        let base = pages.as_mut_ptr();
        Self {
            base,
            len,
            _pages: pages,
        }
    }

    pub fn page(&self, i: usize) -> VirtualAddress {
        assert!(i <= self.len);
        VirtualAddress::from_ptr(self.base.wrapping_add(i))
    }

    pub fn start(&self) -> VirtualAddress {
        self.page(0)
    }

    /// One past the last page.
    pub fn end(&self) -> VirtualAddress {
        self.page(self.len)
    }

    pub fn layout(&self) -> MemoryLayout {
        let start = self.start().as_u64();
        MemoryLayout::new(
            self.start(),
            PhysicalAddress::new(PHYS_BASE + self.len as u64 * PAGE_SIZE),
            VirtualAddress::new(start - PHYS_BASE),
        )
        .expect("arena layout")
    }

    pub fn phys(&self, va: VirtualAddress) -> PhysicalAddress {
        self.layout().virt_to_phys(va)
    }

    pub fn bytes(&self, va: VirtualAddress) -> &[u8] {
        unsafe { std::slice::from_raw_parts(va.as_mut_ptr::<u8>(), PAGE_SIZE as usize) }
    }

    pub fn write(&self, va: VirtualAddress, byte: u8) {
        unsafe { std::ptr::write_bytes(va.as_mut_ptr::<u8>(), byte, PAGE_SIZE as usize) }
    }
}

/// An arena of `pages` pages and an allocator bootstrapped over it.
///
/// Phase 1 seeds the first page only (the "boot page table" range), phase 2
/// the rest, as the kernel does.
pub fn bootstrapped(pages: usize) -> (Arena, TestAllocator) {
    let arena = Arena::new(pages);
    let alloc = TestAllocator::new();
    bootstrap_into(&arena, &alloc);
    (arena, alloc)
}

pub fn bootstrap_into<const N: usize, I: kernel_sync::Interrupts>(
    arena: &Arena,
    alloc: &PageAllocator<N, I>,
) {
    let split = arena.page(arena.len.min(1));
    unsafe {
        alloc
            .bootstrap_phase1(arena.layout(), arena.start(), split)
            .expect("phase 1");
        alloc.bootstrap_phase2(split, arena.end()).expect("phase 2");
    }
}

/// Allocates until the pool is empty.
pub fn drain<const N: usize, I: kernel_sync::Interrupts>(
    alloc: &PageAllocator<N, I>,
) -> Vec<VirtualAddress> {
    std::iter::from_fn(|| alloc.allocate()).collect()
}

thread_local! {
    static RECORDS: RefCell<Vec<(Level, String)>> = const { RefCell::new(Vec::new()) };
}

/// `log` backend that keeps each thread's records for inspection.
struct CaptureLogger;

impl Log for CaptureLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let line = format!("{}", record.args());
        RECORDS.with(|r| r.borrow_mut().push((record.level(), line)));
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger;
static INIT: Once = Once::new();

pub fn capture_logs() {
    INIT.call_once(|| {
        log::set_logger(&LOGGER).expect("logger");
        log::set_max_level(LevelFilter::Trace);
    });
    RECORDS.with(|r| r.borrow_mut().clear());
}

/// Records logged on this thread since [`capture_logs`].
pub fn logged() -> Vec<(Level, String)> {
    RECORDS.with(|r| r.borrow().clone())
}
