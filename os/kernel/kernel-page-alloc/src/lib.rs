//! # Kernel Physical Page Allocator
//!
//! Hands out 4 KiB physical pages to the rest of the kernel (page tables,
//! user memory, kernel stacks, pipe buffers) and takes them back. Pages carry
//! a reference count so that several mappings, e.g. a parent and child after
//! a copy-on-write fork, can share one page; it only returns to the pool when
//! the last owner frees it.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  PageAllocator                      │
//! │    • allocate / free / refcount accessors           │
//! │    • bootstrap: Unseeded → Seeding → Active         │
//! └───────┬───────────────────────────────┬─────────────┘
//!         │ SpinLock (masks interrupts)   │
//! ┌───────▼───────────────┐     ┌─────────▼─────────────┐
//! │   Free list           │     │ Reference count table │
//! │ • intrusive LIFO      │     │ • one slot per page   │
//! │ • link in free page   │     │   below PHYS_TOP      │
//! └───────────────────────┘     └───────────────────────┘
//! ```
//!
//! ## Page life cycle
//!
//! | From          | Operation          | To              |
//! |---------------|--------------------|-----------------|
//! | `Free`        | `allocate`         | `Allocated(1)`  |
//! | `Allocated(n)`| `inc_refcount`     | `Allocated(n+1)`|
//! | `Allocated(n)`| `free`, n > 1      | `Allocated(n-1)`|
//! | `Allocated(1)`| `free`             | `Free` (poisoned) |
//!
//! Freeing a misaligned address, one below the kernel image, one at or above
//! the physical top, or a page whose count is already zero halts the kernel.
//! Running out of pages is not an error: `allocate` returns `None`.
//!
//! ## Bootstrap
//!
//! ```no_run
//! use kernel_page_alloc::{KernelPageAllocator, MemoryLayout, VirtualAddress};
//!
//! static KMEM: KernelPageAllocator = KernelPageAllocator::new();
//!
//! # fn boot(kernel_end: VirtualAddress, early_end: VirtualAddress, top: VirtualAddress) {
//! let layout = MemoryLayout::kernel(kernel_end).expect("kernel layout");
//! unsafe {
//!     // Only the pages the boot page table maps.
//!     KMEM.bootstrap_phase1(layout, kernel_end, early_end).expect("phase 1");
//!     // ... install the full kernel page table ...
//!     KMEM.bootstrap_phase2(early_end, top).expect("phase 2");
//! }
//! let page = KMEM.allocate().expect("out of memory");
//! # }
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod addresses;
mod allocator;
mod bootstrap;
mod error;
mod free_list;
pub mod layout;
mod page;
pub mod refcount;

pub use addresses::{PhysicalAddress, VirtualAddress};
pub use allocator::{FreeOutcome, PageAllocator};
pub use bootstrap::BootstrapState;
pub use error::{BootstrapError, FreeError, LayoutError};
pub use layout::{MemoryLayout, PAGE_SIZE, PHYS_PAGES};
pub use page::{POISON_BYTE, Page};

/// The kernel's allocator: a table covering [`layout::PHYS_TOP`], locking
/// with `cli/sti`.
#[cfg(target_arch = "x86_64")]
pub type KernelPageAllocator = PageAllocator<PHYS_PAGES, kernel_sync::X86Interrupts>;
