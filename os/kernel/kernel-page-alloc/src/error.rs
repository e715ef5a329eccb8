use crate::addresses::{PhysicalAddress, VirtualAddress};

/// Why a page may not be released.
///
/// [`PageAllocator::free`](crate::PageAllocator::free) halts the kernel with
/// the `Display` text of these; the `try_` variants return them instead.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FreeError {
    #[error("{va} is not page aligned")]
    Misaligned { va: VirtualAddress },
    #[error("{va} lies below the end of the kernel image at {kernel_end}")]
    BelowKernelEnd {
        va: VirtualAddress,
        kernel_end: VirtualAddress,
    },
    #[error("{va} maps to {pa}, at or above the physical top {phys_top}")]
    AbovePhysTop {
        va: VirtualAddress,
        pa: PhysicalAddress,
        phys_top: PhysicalAddress,
    },
    #[error("refcount underflow freeing {va} ({pa}): page is already free")]
    RefcountUnderflow {
        va: VirtualAddress,
        pa: PhysicalAddress,
    },
    #[error("{va} freed before the allocator was bootstrapped")]
    NotBootstrapped { va: VirtualAddress },
}

/// A [`MemoryLayout`](crate::MemoryLayout) the allocator cannot work with.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("direct map base {base} is not page aligned")]
    UnalignedDirectMap { base: VirtualAddress },
    #[error("physical top {phys_top} is not page aligned")]
    UnalignedPhysTop { phys_top: PhysicalAddress },
    #[error("kernel end {kernel_end} lies below the direct map base {base}")]
    KernelEndBelowDirectMap {
        kernel_end: VirtualAddress,
        base: VirtualAddress,
    },
    #[error("no physical page between kernel end {kernel_end} and {phys_top}")]
    EmptyPhysicalRange {
        kernel_end: VirtualAddress,
        phys_top: PhysicalAddress,
    },
    #[error("layout needs {needed} refcount slots, table has {available}")]
    TableTooSmall { needed: usize, available: usize },
}

/// A bootstrap phase issued out of order.
///
/// Nothing has been seeded when one of these is returned.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BootstrapError {
    #[error("bootstrap phase 1 already ran")]
    AlreadySeeding,
    #[error("bootstrap phase 2 requires phase 1 first")]
    NotSeeding,
    #[error("allocator is already active")]
    AlreadyActive,
    #[error(transparent)]
    Layout(#[from] LayoutError),
}
