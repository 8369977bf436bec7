//! Ambient counters for the error taxonomy (spec §7; SPEC_FULL §A.5).
//!
//! Not a metrics pipeline — spec's Non-goals exclude an observability
//! surface — just enough process-wide state for the dispatcher to implement
//! "drop and increment a counter" and for the diagnostic CLI to print it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Counters {
    pub parse_errors: AtomicU64,
    pub auth_errors: AtomicU64,
    pub routing_errors: AtomicU64,
    pub local_io_errors: AtomicU64,
    pub peer_io_errors: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Counters::default()
    }

    pub fn inc_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_auth_error(&self) {
        self.auth_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_routing_error(&self) {
        self.routing_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_local_io_error(&self) {
        self.local_io_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_peer_io_error(&self) {
        self.peer_io_errors.fetch_add(1, Ordering::Relaxed);
    }
}

impl fmt::Display for Counters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "parse={} auth={} routing={} local_io={} peer_io={}",
            self.parse_errors.load(Ordering::Relaxed),
            self.auth_errors.load(Ordering::Relaxed),
            self.routing_errors.load(Ordering::Relaxed),
            self.local_io_errors.load(Ordering::Relaxed),
            self.peer_io_errors.load(Ordering::Relaxed),
        )
    }
}
