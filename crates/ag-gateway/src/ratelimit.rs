// ratelimit.rs — Fixed-window rate limiting over a shared counter store.
//
// Each (bucket, identity) pair gets a counter that resets on a fixed
// window boundary. The counter store is a trait so production can point
// the same limiter at a networked store; the bundled implementation is
// process memory, which matches rate_limit_storage_uri = memory://.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

/// The request classes that are limited independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Enforce,
    Logs,
    AdminWrite,
    AdminRead,
    Public,
}

impl Bucket {
    /// (max requests, window length in seconds).
    pub fn limit(self) -> (u64, u64) {
        match self {
            Bucket::Enforce => (1000, 60),
            Bucket::Logs => (1000, 60),
            Bucket::AdminWrite => (50, 3600),
            Bucket::AdminRead => (200, 3600),
            Bucket::Public => (100, 60),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Bucket::Enforce => "enforce",
            Bucket::Logs => "logs",
            Bucket::AdminWrite => "admin-write",
            Bucket::AdminRead => "admin-read",
            Bucket::Public => "public",
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    /// Seconds until the window resets; meaningful when denied.
    pub retry_after: u64,
}

/// Shared counter storage: increment-and-read within a fixed window.
pub trait CounterStore: Send + Sync {
    /// Bump the counter for `key` in the window containing `now_epoch`.
    /// Returns (count after increment, seconds until the window resets).
    fn incr(&self, key: &str, window_secs: u64, now_epoch: i64) -> (u64, u64);
}

/// Process-memory counter store.
#[derive(Default)]
pub struct MemoryCounterStore {
    windows: Mutex<HashMap<String, (i64, u64)>>,
}

impl CounterStore for MemoryCounterStore {
    fn incr(&self, key: &str, window_secs: u64, now_epoch: i64) -> (u64, u64) {
        let window_start = now_epoch - now_epoch.rem_euclid(window_secs as i64);
        let mut windows = self.windows.lock().expect("counter lock poisoned");
        let entry = windows.entry(key.to_string()).or_insert((window_start, 0));
        if entry.0 != window_start {
            *entry = (window_start, 0);
        }
        entry.1 += 1;
        let reset_in = (window_start + window_secs as i64 - now_epoch).max(1) as u64;
        (entry.1, reset_in)
    }
}

/// The request-admission gate: one counter per (bucket, identity).
pub struct RateLimiter {
    enabled: bool,
    store: Arc<dyn CounterStore>,
}

impl RateLimiter {
    pub fn new(enabled: bool, store: Arc<dyn CounterStore>) -> Self {
        Self { enabled, store }
    }

    /// Check and consume one unit from the caller's bucket.
    pub fn admit(&self, bucket: Bucket, identity: &str, now: DateTime<Utc>) -> Admission {
        if !self.enabled {
            return Admission {
                allowed: true,
                retry_after: 0,
            };
        }
        let (max, window) = bucket.limit();
        let key = format!("{}:{}", bucket.as_str(), identity);
        let (count, reset_in) = self.store.incr(&key, window, now.timestamp());
        if count <= max {
            Admission {
                allowed: true,
                retry_after: 0,
            }
        } else {
            Admission {
                allowed: false,
                retry_after: reset_in,
            }
        }
    }
}
