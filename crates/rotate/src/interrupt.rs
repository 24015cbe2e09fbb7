//! Interruption handling
//!
//! A SIGINT mid-run must not lose the notification of credentials that
//! already changed. The signal handler only sets a flag; the
//! orchestrator observes it between steps (never mid-command) and winds
//! down through the normal report path.

use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// The process-wide flag the SIGINT handler sets. The orchestrator
/// polls this by default; tests substitute their own flag.
pub fn flag() -> &'static AtomicBool {
    &INTERRUPTED
}

/// Request an orderly wind-down at the next between-steps check.
pub fn request() {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

pub fn is_requested() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

extern "C" fn on_sigint(_signal: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Install the SIGINT handler. SA_RESTART is deliberately left unset so
/// a prompt blocked in read returns EINTR and the interruption is seen
/// immediately instead of after the next keypress.
pub fn install_sigint_handler() {
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = on_sigint as extern "C" fn(libc::c_int) as libc::sighandler_t;
        libc::sigemptyset(&mut action.sa_mask);
        action.sa_flags = 0;
        libc::sigaction(libc::SIGINT, &action, std::ptr::null_mut());
    }
}
