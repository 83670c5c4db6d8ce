//! Shared routing-staleness state.
//!
//! The slot table is deliberately allowed to go stale; this flag is how the
//! redirection handler tells every execution path "the routing table is
//! known stale, refresh before you trust it". All access goes through
//! accessor methods so the check-then-clear sequence stays atomic across
//! concurrent callers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct ClusterState {
    refresh_asap: AtomicBool,
    last_refresh_error: Mutex<Option<String>>,
}

impl ClusterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the routing table as known stale
    pub fn mark_stale(&self) {
        self.refresh_asap.store(true, Ordering::SeqCst);
    }

    /// Atomically observe and clear the staleness flag.
    ///
    /// Returns true at most once per stale window, so only one caller
    /// performs the forced refresh.
    pub fn take_refresh_needed(&self) -> bool {
        self.refresh_asap.swap(false, Ordering::SeqCst)
    }

    /// Peek at the flag without clearing it
    pub fn is_stale(&self) -> bool {
        self.refresh_asap.load(Ordering::SeqCst)
    }

    /// Record the outcome of the most recent topology refresh attempt
    pub fn record_refresh_error(&self, error: Option<String>) {
        *self
            .last_refresh_error
            .lock()
            .expect("refresh error lock poisoned") = error;
    }

    /// Error from the most recent failed refresh, if any
    pub fn last_refresh_error(&self) -> Option<String> {
        self.last_refresh_error
            .lock()
            .expect("refresh error lock poisoned")
            .clone()
    }
}
