use crate::addresses::VirtualAddress;
use crate::layout::PAGE_SIZE;

/// Byte pattern written over every page as it enters the free list.
///
/// A stale pointer into a freed page reads `0x0101...` instead of plausible
/// data.
pub const POISON_BYTE: u8 = 0x01;

#[allow(clippy::cast_possible_truncation)]
const PAGE_BYTES: usize = PAGE_SIZE as usize;

/// One page of memory, aligned to its own size.
///
/// Convenient backing storage for page ranges handed to the bootstrap phases,
/// e.g. a `static` arena or a heap buffer in hosted tests.
#[repr(C, align(4096))]
pub struct Page(pub [u8; PAGE_BYTES]);

const _: () = assert!(size_of::<Page>() == PAGE_BYTES);

impl Page {
    #[must_use]
    pub const fn zeroed() -> Self {
        Self([0; PAGE_BYTES])
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Overwrites the whole page at `va` with [`POISON_BYTE`].
///
/// # Safety
/// `va` must be page aligned and the page writable and not referenced by
/// anyone else.
#[inline]
pub(crate) unsafe fn poison(va: VirtualAddress) {
    unsafe { core::ptr::write_bytes(va.as_mut_ptr::<u8>(), POISON_BYTE, PAGE_BYTES) }
}

/// Overwrites the whole page at `va` with zeroes.
///
/// # Safety
/// As [`poison`].
#[inline]
pub(crate) unsafe fn zero(va: VirtualAddress) {
    unsafe { core::ptr::write_bytes(va.as_mut_ptr::<u8>(), 0, PAGE_BYTES) }
}
