//! Cooperative interruption.
//!
//! The Ctrl-C handler only flips a shared flag. Everything that may run for a
//! long time (hashing a file, walking a directory's files, rewriting checksum
//! files) polls the flag and unwinds through its return value.

use std::sync::Arc;
#[cfg(test)]
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
    /// Polls left until the flag raises itself, 0 when disarmed.
    #[cfg(test)]
    countdown: Arc<AtomicUsize>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a process-wide Ctrl-C handler that triggers this flag.
    ///
    /// Can only be called once per process.
    pub fn install_handler(&self) -> Result<(), ctrlc::Error> {
        let interrupt = self.clone();
        ctrlc::set_handler(move || interrupt.trigger())
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        #[cfg(test)]
        self.count_down();
        self.flag.load(Ordering::SeqCst)
    }

    /// Simulates Ctrl-C arriving right before the `polls`-th poll returns.
    #[cfg(test)]
    pub fn after_polls(polls: usize) -> Self {
        let interrupt = Self::new();
        interrupt.countdown.store(polls, Ordering::SeqCst);
        interrupt
    }

    #[cfg(test)]
    fn count_down(&self) {
        let previous = self
            .countdown
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if previous == Ok(1) {
            self.trigger();
        }
    }
}
