//! Bus arbitration between the fault monitor and the step ISR
//!
//! A status sweep is a sequence of bus transactions spread over several
//! critical sections. The step ISR may need the same bus in between (to
//! send direction commands down a daisy chain), and it must never wait.
//! It raises `abort` instead; the monitor checks the flag between
//! transactions and gives the bus up for the rest of the sweep.
//!
//! Only load/store is needed, so this works on cores without CAS.

use portable_atomic::{AtomicBool, Ordering};

/// Busy / abort flag pair guarding one shared bus
#[derive(Debug, Default)]
pub struct BusLock {
    busy: AtomicBool,
    abort: AtomicBool,
}

impl BusLock {
    /// Create an idle lock
    pub const fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
            abort: AtomicBool::new(false),
        }
    }

    /// Monitor: a sweep starts
    pub fn begin_sweep(&self) {
        self.abort.store(false, Ordering::SeqCst);
        self.busy.store(true, Ordering::SeqCst);
    }

    /// Monitor: the sweep is over (finished or abandoned)
    pub fn end_sweep(&self) {
        self.busy.store(false, Ordering::SeqCst);
        self.abort.store(false, Ordering::SeqCst);
    }

    /// Monitor: check if the ISR asked for the bus
    pub fn should_yield(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// Check if a sweep is in progress
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// ISR: claim the bus without waiting
    ///
    /// Returns `true` if a sweep was in progress and has been told to
    /// abort. The ISR proceeds with its transaction either way.
    pub fn request(&self) -> bool {
        if self.busy.load(Ordering::SeqCst) {
            self.abort.store(true, Ordering::SeqCst);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_while_idle() {
        let lock = BusLock::new();
        assert!(!lock.request());
        assert!(!lock.should_yield());
    }

    #[test]
    fn test_request_during_sweep() {
        let lock = BusLock::new();
        lock.begin_sweep();
        assert!(lock.is_busy());
        assert!(lock.request());
        assert!(lock.should_yield());

        lock.end_sweep();
        assert!(!lock.is_busy());
        assert!(!lock.should_yield());
    }

    #[test]
    fn test_stale_abort_cleared_on_begin() {
        let lock = BusLock::new();
        lock.begin_sweep();
        lock.request();
        // A new sweep starts clean even if end_sweep was skipped
        lock.begin_sweep();
        assert!(!lock.should_yield());
    }
}
