//! Process-wide cooperative cancellation flag.
//!
//! A signal handler (SIGINT / console control handler) sets the flag from
//! outside; the core polls it at iteration boundaries in the filesystem
//! walk, the diff walk, and the sync driver's per-file execution loop
//! (see spec §5). Three consecutive interrupts force a hard exit; that
//! escalation lives in the CLI layer, not here.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);
static INTERRUPT_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Mark the process as interrupted. Safe to call from a signal handler.
pub fn set() {
    INTERRUPTED.store(true, Ordering::SeqCst);
    INTERRUPT_COUNT.fetch_add(1, Ordering::SeqCst);
}

/// Number of interrupts observed since the last [`reset`].
pub fn count() -> usize {
    INTERRUPT_COUNT.load(Ordering::SeqCst)
}

/// Whether an interrupt has been requested since the last [`reset`].
pub fn is_set() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Clear the flag and counter. Called on entry to a new sync workflow.
pub fn reset() {
    INTERRUPTED.store(false, Ordering::SeqCst);
    INTERRUPT_COUNT.store(0, Ordering::SeqCst);
}

/// Check the flag and raise [`crate::core::error::Error::Interrupted`] if set.
pub fn check() -> crate::core::error::Result<()> {
    if is_set() {
        Err(crate::core::error::Error::Interrupted)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_reset_round_trip() {
        reset();
        assert!(!is_set());
        set();
        assert!(is_set());
        assert_eq!(count(), 1);
        reset();
        assert!(!is_set());
        assert_eq!(count(), 0);
    }
}
