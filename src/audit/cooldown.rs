//! Quiet-down windows for noisy routes.
//!
//! # Responsibilities
//! - Remember, per configured route, until when its records are suppressed
//! - Let the first record through and suppress repeats inside the window
//!
//! # Design Decisions
//! - Shared across all requests; lookups take the read lock, only the rare
//!   window reset takes the write lock
//! - Routes are matched on the exact request path

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Cross-request suppression map.
#[derive(Debug)]
pub struct QuietDown {
    routes: HashSet<String>,
    period: Duration,
    /// route -> end of the current suppression window.
    windows: RwLock<HashMap<String, Instant>>,
}

impl QuietDown {
    pub fn new<I, S>(routes: I, period: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            routes: routes.into_iter().map(Into::into).collect(),
            period,
            windows: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Returns true when a record for `path` must be suppressed.
    ///
    /// The first hit opens a window of `period`; hits inside the window are
    /// suppressed and do not extend it.
    pub fn suppress(&self, path: &str) -> bool {
        self.suppress_at(path, Instant::now())
    }

    fn suppress_at(&self, path: &str, now: Instant) -> bool {
        let path = if path.is_empty() { "/" } else { path };
        if !self.routes.contains(path) {
            return false;
        }

        {
            let windows = self.windows.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(until) = windows.get(path) {
                if now < *until {
                    return true;
                }
            }
        }

        let mut windows = self.windows.write().unwrap_or_else(PoisonError::into_inner);
        // Another request may have opened the window between the two locks.
        if let Some(until) = windows.get(path) {
            if now < *until {
                return true;
            }
        }
        windows.insert(path.to_string(), now + self.period);
        tracing::debug!(route = %path, period = ?self.period, "Quiet-down window opened");
        false
    }
}
