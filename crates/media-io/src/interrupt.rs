//! Cancellation bridge into the demuxer's blocking calls.
//!
//! FFmpeg polls an interrupt callback inside every blocking I/O operation.
//! The facade exposes that as a plain closure: return `true` to make the
//! in-flight call fail with an exit error.

use std::os::raw::{c_int, c_void};

/// Poll-style hook asking the library to abort its current blocking call.
///
/// Called from inside demuxer I/O, potentially at high frequency; it must be
/// cheap and must never block.
pub type InterruptHook = Box<dyn Fn() -> bool + Send>;

/// Heap cell keeping the hook at a stable address for the C callback.
pub(crate) struct HookCell {
    hook: InterruptHook,
}

impl HookCell {
    pub(crate) fn new(hook: InterruptHook) -> Box<Self> {
        Box::new(Self { hook })
    }

    pub(crate) fn as_opaque(&self) -> *mut c_void {
        self as *const Self as *mut c_void
    }
}

pub(crate) extern "C" fn interrupt_trampoline(opaque: *mut c_void) -> c_int {
    if opaque.is_null() {
        return 0;
    }
    let cell = unsafe { &*(opaque as *const HookCell) };
    (cell.hook)() as c_int
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn trampoline_reflects_hook_result() {
        let flag = Arc::new(AtomicBool::new(false));
        let hook_flag = flag.clone();
        let cell = HookCell::new(Box::new(move || hook_flag.load(Ordering::SeqCst)));

        assert_eq!(interrupt_trampoline(cell.as_opaque()), 0);
        flag.store(true, Ordering::SeqCst);
        assert_eq!(interrupt_trampoline(cell.as_opaque()), 1);
    }

    #[test]
    fn trampoline_tolerates_null() {
        assert_eq!(interrupt_trampoline(std::ptr::null_mut()), 0);
    }
}
