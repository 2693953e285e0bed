//! State shared between the UI side and a background optimization run.
//!
//! The live site sits behind a reader/writer lock: readers (rendering,
//! inspection) take the read lock, every mutation takes the write lock.
//! Run control goes through atomic flags so it never waits on the site lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::site::Site;

/// The live site, shared between threads.
pub type SharedSite = Arc<RwLock<Site>>;

/// Wrap a site for sharing.
pub fn shared_site(site: Site) -> SharedSite {
    Arc::new(RwLock::new(site))
}

/// Flags shared by an [`OptimizerHandle`](super::OptimizerHandle) and its
/// worker thread.
#[derive(Debug, Default)]
pub struct RunFlags {
    /// True from a successful `start()` until the worker has synced its
    /// final result.
    running: AtomicBool,

    /// Set by `stop()`, observed by the optimizer before each evaluation.
    stop_requested: AtomicBool,
}

impl RunFlags {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Mark a run as started. Returns false if one is already running.
    pub fn try_begin(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn finish(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn clear_stop(&self) {
        self.stop_requested.store(false, Ordering::SeqCst);
    }

    pub fn should_stop(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_run() {
        let flags = RunFlags::new();
        assert!(!flags.is_running());
        assert!(flags.try_begin());
        assert!(!flags.try_begin());
        assert!(flags.is_running());
        flags.finish();
        assert!(flags.try_begin());
    }

    #[test]
    fn test_stop_flag() {
        let flags = RunFlags::new();
        assert!(!flags.should_stop());
        flags.request_stop();
        assert!(flags.should_stop());
        flags.clear_stop();
        assert!(!flags.should_stop());
    }
}
