use crate::addresses::VirtualAddress;
use core::ptr::NonNull;

/// Header written into the first bytes of every **free** page.
///
/// ```text
/// +----------+---------------------------------------+
/// | next ptr |  poison (0x01 ...)                    |
/// +----------+---------------------------------------+
/// ^ page base                                 page base + PAGE_SIZE
/// ```
///
/// Allocated pages carry no header; the allocator keeps no per-page metadata
/// besides the reference count.
#[repr(C)]
struct Run {
    next: Option<NonNull<Run>>,
}

/// Intrusive LIFO of free pages.
///
/// # Invariants
/// - Every node is a page-aligned page owned exclusively by the list.
/// - The list is acyclic; a page is pushed only while not already listed.
pub(crate) struct FreeList {
    head: Option<NonNull<Run>>,
}

// Safety: the nodes are plain memory owned by the list; the list is only
// touched under the allocator lock or during single-threaded bootstrap.
unsafe impl Send for FreeList {}

impl FreeList {
    pub(crate) const fn new() -> Self {
        Self { head: None }
    }

    /// Threads the page at `va` onto the front of the list.
    ///
    /// The first word of the page is overwritten with the link.
    ///
    /// # Safety
    /// `va` must be a page-aligned, writable page that nobody else references
    /// and that is not already in the list.
    pub(crate) unsafe fn push(&mut self, va: VirtualAddress) {
        let run = va.as_mut_ptr::<Run>();
        unsafe {
            run.write(Run { next: self.head });
            self.head = Some(NonNull::new_unchecked(run));
        }
    }

    /// Unlinks the most recently pushed page.
    pub(crate) fn pop(&mut self) -> Option<VirtualAddress> {
        let run = self.head?;
        // SAFETY: listed pages stay valid and unaliased while in the list.
        self.head = unsafe { run.as_ref().next };
        Some(VirtualAddress::from_nonnull(run))
    }

    /// Walks the list and counts its nodes.
    pub(crate) fn count(&self) -> usize {
        let mut n = 0;
        let mut cursor = self.head;
        while let Some(run) = cursor {
            n += 1;
            // SAFETY: see `pop`.
            cursor = unsafe { run.as_ref().next };
        }
        n
    }

    /// Whether `va` is currently listed. Linear in the list length.
    pub(crate) fn contains(&self, va: VirtualAddress) -> bool {
        let mut cursor = self.head;
        while let Some(run) = cursor {
            if VirtualAddress::from_nonnull(run) == va {
                return true;
            }
            // SAFETY: see `pop`.
            cursor = unsafe { run.as_ref().next };
        }
        false
    }
}
