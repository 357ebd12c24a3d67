//! Discovers the calling thread's stack extent, so a host program can feed
//! [`crate::config::ArenaConfig::set_stack_top`] without hand-rolling
//! platform calls itself (spec §4.D, "Variants": stack-top discovery is
//! listed as a platform concern the config module leans on rather than
//! reimplements).
//!
//! `std`-only: finding a thread's own stack bounds goes through the
//! platform thread APIs, which aren't available in `no_std`.

use crate::error::ArenaError;

/// Highest address of the calling thread's stack (the end a stack-tagged
/// handle's offset is measured down from).
///
/// Returns `None` if the platform refused to report it (spec leaves this
/// unspecified rather than treating it as fatal, since a host that never
/// uses stack-tagged handles doesn't need it to succeed).
pub fn current_thread_stack_top() -> Option<usize> {
    imp::current_thread_stack_top()
}

/// Same as [`current_thread_stack_top`], but returns
/// [`ArenaError::OutOfMemory`]-shaped failure instead of silently
/// discarding the reason, for callers that must have a stack top to make
/// progress.
pub fn require_thread_stack_top() -> Result<usize, ArenaError> {
    current_thread_stack_top().ok_or(ArenaError::OutOfMemory)
}

#[cfg(unix)]
mod imp {
    use core::mem::MaybeUninit;

    pub(super) fn current_thread_stack_top() -> Option<usize> {
        // SAFETY: `attr` is initialized by `pthread_getattr_np` before any
        // field is read, and destroyed unconditionally afterwards; `self_`
        // is a valid thread handle for the calling thread per
        // `pthread_self`'s contract.
        unsafe {
            let self_ = libc::pthread_self();
            let mut attr = MaybeUninit::<libc::pthread_attr_t>::uninit();
            if libc::pthread_getattr_np(self_, attr.as_mut_ptr()) != 0 {
                return None;
            }
            let mut attr = attr.assume_init();

            let mut base: *mut libc::c_void = core::ptr::null_mut();
            let mut size: libc::size_t = 0;
            let ok = libc::pthread_attr_getstack(&attr, &mut base, &mut size) == 0;
            libc::pthread_attr_destroy(&mut attr);

            if !ok || base.is_null() {
                return None;
            }
            Some(base as usize + size)
        }
    }
}

#[cfg(windows)]
mod imp {
    use windows_sys::Win32::System::Threading::GetCurrentThreadStackLimits;

    pub(super) fn current_thread_stack_top() -> Option<usize> {
        let mut low = 0usize;
        let mut high = 0usize;
        // SAFETY: both out-params are plain `usize` locals; the call has
        // no other preconditions on the current thread.
        unsafe { GetCurrentThreadStackLimits(&mut low, &mut high) };
        if high == 0 {
            None
        } else {
            Some(high)
        }
    }
}

#[cfg(not(any(unix, windows)))]
mod imp {
    pub(super) fn current_thread_stack_top() -> Option<usize> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(any(unix, windows))]
    fn reports_a_plausible_stack_top() {
        let top = current_thread_stack_top().expect("platform should report a stack top");
        let local = 0u8;
        assert!(top > &local as *const u8 as usize);
    }

    #[test]
    fn require_variant_mirrors_option_variant() {
        assert_eq!(
            current_thread_stack_top().is_some(),
            require_thread_stack_top().is_ok()
        );
    }
}
