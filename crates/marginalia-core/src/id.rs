//! Time-derived annotation ids.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

/// Hands out annotation ids derived from the wall clock in epoch
/// milliseconds.
///
/// Ids are strictly increasing for the lifetime of a generator even when the
/// clock stalls or steps backwards: a collision bumps the id one millisecond
/// past the previous one.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicI64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> String {
        self.next_at(Utc::now())
    }

    pub fn next_at(&self, now: DateTime<Utc>) -> String {
        let now = now.timestamp_millis();
        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let next = now.max(current + 1);
            match self
                .last
                .compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return next.to_string(),
                Err(actual) => current = actual,
            }
        }
    }
}
