//! # Memory Layout
//!
//! Build-time constants describing physical memory and the kernel's direct
//! map, plus the validated runtime [`MemoryLayout`] the allocator is
//! bootstrapped with.

use crate::addresses::{PhysicalAddress, VirtualAddress};
use crate::error::LayoutError;

/// Size of every page handed out by the allocator.
pub const PAGE_SIZE: u64 = 4096;

/// log2([`PAGE_SIZE`]).
pub const PAGE_SHIFT: u32 = 12;

/// Start of extended memory; the kernel image is loaded here.
pub const EXTENDED_MEM: u64 = 0x0010_0000; // 1 MiB

/// Top of physical memory the allocator manages.
///
/// The reference count table covers every page below this address whether or
/// not the machine actually has that much RAM.
pub const PHYS_TOP: u64 = 0x0E00_0000; // 224 MiB

/// Virtual base of the kernel's direct map: `va = KERNEL_BASE + pa`.
pub const KERNEL_BASE: u64 = 0x8000_0000;

/// Number of reference count slots needed to cover `[0, PHYS_TOP)`.
#[allow(clippy::cast_possible_truncation)]
pub const PHYS_PAGES: usize = (PHYS_TOP >> PAGE_SHIFT) as usize;

const _: () = {
    assert!(PAGE_SIZE == 1 << PAGE_SHIFT);
    assert!(PHYS_TOP.is_multiple_of(PAGE_SIZE));
    assert!(KERNEL_BASE.is_multiple_of(PAGE_SIZE));
    assert!(EXTENDED_MEM < PHYS_TOP);
};

/// Where the pages live and which of them may ever be freed.
///
/// * `kernel_end`: first virtual address after the loaded kernel image. No
///   page below it is ever accepted by `free`. Need not be page aligned.
/// * `phys_top`: exclusive upper bound on physical page addresses.
/// * `direct_map_base`: virtual address of physical address zero, so that
///   `V2P(va) = va - direct_map_base`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemoryLayout {
    kernel_end: VirtualAddress,
    phys_top: PhysicalAddress,
    direct_map_base: VirtualAddress,
}

impl MemoryLayout {
    /// Validates and builds a layout.
    ///
    /// # Errors
    /// See [`LayoutError`]: the direct map base and `phys_top` must be page
    /// aligned, and at least one physical page must lie between the kernel
    /// end and `phys_top`.
    pub const fn new(
        kernel_end: VirtualAddress,
        phys_top: PhysicalAddress,
        direct_map_base: VirtualAddress,
    ) -> Result<Self, LayoutError> {
        if !direct_map_base.is_page_aligned() {
            return Err(LayoutError::UnalignedDirectMap {
                base: direct_map_base,
            });
        }
        if !phys_top.is_page_aligned() {
            return Err(LayoutError::UnalignedPhysTop { phys_top });
        }
        if kernel_end.as_u64() < direct_map_base.as_u64() {
            return Err(LayoutError::KernelEndBelowDirectMap {
                kernel_end,
                base: direct_map_base,
            });
        }

        let Some(first_page) = kernel_end.page_round_up() else {
            return Err(LayoutError::EmptyPhysicalRange {
                kernel_end,
                phys_top,
            });
        };
        if first_page.as_u64() - direct_map_base.as_u64() >= phys_top.as_u64() {
            return Err(LayoutError::EmptyPhysicalRange {
                kernel_end,
                phys_top,
            });
        }

        Ok(Self {
            kernel_end,
            phys_top,
            direct_map_base,
        })
    }

    /// The kernel's own layout: [`PHYS_TOP`] and [`KERNEL_BASE`] with the
    /// linker-provided end of the kernel image.
    ///
    /// # Errors
    /// As [`MemoryLayout::new`].
    pub const fn kernel(kernel_end: VirtualAddress) -> Result<Self, LayoutError> {
        Self::new(
            kernel_end,
            PhysicalAddress::new(PHYS_TOP),
            VirtualAddress::new(KERNEL_BASE),
        )
    }

    #[inline]
    #[must_use]
    pub const fn kernel_end(&self) -> VirtualAddress {
        self.kernel_end
    }

    #[inline]
    #[must_use]
    pub const fn phys_top(&self) -> PhysicalAddress {
        self.phys_top
    }

    #[inline]
    #[must_use]
    pub const fn direct_map_base(&self) -> VirtualAddress {
        self.direct_map_base
    }

    /// Reference count slots needed to cover `[0, phys_top)`.
    #[inline]
    #[must_use]
    pub const fn table_len(&self) -> usize {
        self.phys_top.page_index()
    }

    /// `V2P`: physical address behind a direct-mapped virtual address.
    ///
    /// Wraps for addresses below the direct map; callers range-check first.
    #[inline]
    #[must_use]
    pub const fn virt_to_phys(&self, va: VirtualAddress) -> PhysicalAddress {
        PhysicalAddress::new(va.as_u64().wrapping_sub(self.direct_map_base.as_u64()))
    }

    /// `P2V`: direct-mapped virtual address of a physical address.
    #[inline]
    #[must_use]
    pub const fn phys_to_virt(&self, pa: PhysicalAddress) -> VirtualAddress {
        VirtualAddress::new(self.direct_map_base.as_u64() + pa.as_u64())
    }
}
