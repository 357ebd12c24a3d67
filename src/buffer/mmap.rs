//! Anonymous shared-memory buffer source (feature `mmap`).
//!
//! Acquires its region in page granularity via the OS's anonymous mapping
//! facility instead of the global allocator, which is what lets the arena's
//! buffer be placed in memory a second process can later map as well.

use super::BufferSource;
use crate::error::ArenaError;

use core::ptr::NonNull;

/// A [`BufferSource`] backed by an anonymous memory mapping.
pub struct MmapBuffer {
    region: Option<NonNull<u8>>,
    mapped_len: usize,
}

impl MmapBuffer {
    /// Create an unacquired mmap buffer source.
    pub const fn new() -> Self {
        Self {
            region: None,
            mapped_len: 0,
        }
    }

    fn page_size() -> usize {
        #[cfg(unix)]
        // SAFETY: `sysconf` with `_SC_PAGESIZE` is always valid to call.
        unsafe {
            let n = libc::sysconf(libc::_SC_PAGESIZE);
            if n > 0 {
                n as usize
            } else {
                4096
            }
        }
        #[cfg(windows)]
        {
            4096
        }
    }

    fn round_up_to_page(bytes: usize, page: usize) -> usize {
        (bytes + page - 1) / page * page
    }
}

impl Default for MmapBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferSource for MmapBuffer {
    #[cfg(unix)]
    fn acquire(&mut self, bytes: usize) -> Result<(), ArenaError> {
        debug_assert!(self.region.is_none());
        let len = Self::round_up_to_page(bytes.max(1), Self::page_size());

        // SAFETY: requesting a fresh anonymous, private mapping with no
        // fixed address; the returned pointer is checked against MAP_FAILED
        // before use.
        let ptr = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(ArenaError::OutOfMemory);
        }
        log::debug!("mmap buffer acquired: {len} bytes");
        self.region = NonNull::new(ptr.cast());
        self.mapped_len = len;
        Ok(())
    }

    #[cfg(windows)]
    fn acquire(&mut self, bytes: usize) -> Result<(), ArenaError> {
        use windows_sys::Win32::System::Memory::{
            VirtualAlloc, MEM_COMMIT, MEM_RESERVE, PAGE_READWRITE,
        };

        debug_assert!(self.region.is_none());
        let len = Self::round_up_to_page(bytes.max(1), Self::page_size());

        // SAFETY: reserving and committing a fresh anonymous region; the
        // returned pointer is checked for null before use.
        let ptr = unsafe {
            VirtualAlloc(
                core::ptr::null(),
                len,
                MEM_COMMIT | MEM_RESERVE,
                PAGE_READWRITE,
            )
        };
        if ptr.is_null() {
            return Err(ArenaError::OutOfMemory);
        }
        log::debug!("VirtualAlloc buffer acquired: {len} bytes");
        self.region = NonNull::new(ptr.cast());
        self.mapped_len = len;
        Ok(())
    }

    fn base(&self) -> Option<*mut u8> {
        self.region.map(NonNull::as_ptr)
    }

    #[cfg(unix)]
    fn release(&mut self) {
        if let Some(ptr) = self.region.take() {
            // SAFETY: `ptr`/`self.mapped_len` describe the exact mapping
            // created in `acquire`, released exactly once.
            unsafe { libc::munmap(ptr.as_ptr().cast(), self.mapped_len) };
            self.mapped_len = 0;
            log::debug!("mmap buffer released");
        }
    }

    #[cfg(windows)]
    fn release(&mut self) {
        use windows_sys::Win32::System::Memory::{VirtualFree, MEM_RELEASE};

        if let Some(ptr) = self.region.take() {
            // SAFETY: `ptr` is the base address returned by `VirtualAlloc`
            // in `acquire`, released exactly once with `MEM_RELEASE`.
            unsafe { VirtualFree(ptr.as_ptr().cast(), 0, MEM_RELEASE) };
            self.mapped_len = 0;
            log::debug!("VirtualAlloc buffer released");
        }
    }
}

impl Drop for MmapBuffer {
    fn drop(&mut self) {
        self.release();
    }
}

// SAFETY: the mapped region is exclusively owned byte storage; synchronizing
// concurrent access to slots is the arena's job, not this buffer source's.
unsafe impl Send for MmapBuffer {}
unsafe impl Sync for MmapBuffer {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn acquire_rounds_up_to_page_and_releases() {
        let mut b = MmapBuffer::new();
        b.acquire(1).unwrap();
        assert!(b.base().is_some());
        assert_eq!(b.mapped_len, MmapBuffer::page_size());
        b.release();
        assert!(b.base().is_none());
    }
}
