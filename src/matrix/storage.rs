//! Aligned storage for tile buffers and transfer units

use crate::error::{Error, Result};
use std::alloc::{Layout as AllocLayout, alloc_zeroed, dealloc};
use std::ptr::NonNull;

/// Alignment of every tile buffer and packed transfer unit, in bytes.
///
/// 64 bytes covers AVX-512 loads and is the fixed communication alignment
/// for units that cross a process boundary.
pub(crate) const TILE_ALIGN: usize = 64;

/// Heap buffer with fixed 64-byte alignment, zeroed on allocation
///
/// Owns its allocation; freed on drop. Aliasing is governed entirely by
/// `&self`/`&mut self`, so the raw pointer never escapes this module.
pub(crate) struct AlignedBuf {
    ptr: NonNull<u8>,
    len: usize,
}

// The buffer is an exclusively-owned allocation; shared access only hands
// out &[u8] and mutation requires &mut self.
unsafe impl Send for AlignedBuf {}
unsafe impl Sync for AlignedBuf {}

impl AlignedBuf {
    /// Allocate a zeroed buffer of `len` bytes
    pub(crate) fn zeroed(len: usize) -> Result<Self> {
        if len == 0 {
            return Ok(Self {
                ptr: NonNull::dangling(),
                len: 0,
            });
        }

        let layout = AllocLayout::from_size_align(len, TILE_ALIGN)
            .map_err(|_| Error::AllocationFailure { size: len })?;
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(Error::AllocationFailure { size: len })?;

        Ok(Self { ptr, len })
    }

    /// Length in bytes
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Read-only byte view
    #[inline]
    pub(crate) fn as_slice(&self) -> &[u8] {
        if self.len == 0 {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Mutable byte view
    #[inline]
    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        if self.len == 0 {
            return &mut [];
        }
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for AlignedBuf {
    fn drop(&mut self) {
        if self.len == 0 {
            return;
        }
        // Same layout as in zeroed(), which must have succeeded to get here.
        if let Ok(layout) = AllocLayout::from_size_align(self.len, TILE_ALIGN) {
            unsafe { dealloc(self.ptr.as_ptr(), layout) };
        }
    }
}
