//! Storage quota for queued payloads.
//!
//! Admission is a single atomic check-and-set so concurrent enqueues from
//! different tasks can never overshoot the budget together.

use std::sync::atomic::{AtomicU64, Ordering};

/// Byte budget for queued mutation payloads
#[derive(Debug)]
pub struct StorageQuota {
    quota: AtomicU64,
    used: AtomicU64,
}

impl StorageQuota {
    pub fn new(quota: u64) -> Self {
        Self {
            quota: AtomicU64::new(quota),
            used: AtomicU64::new(0),
        }
    }

    /// Reserve `bytes`. Commits only when `used + bytes <= quota`.
    pub fn reserve(&self, bytes: u64) -> bool {
        let quota = self.quota.load(Ordering::Acquire);
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(bytes).filter(|total| *total <= quota)
            })
            .is_ok()
    }

    /// Return `bytes` to the budget
    pub fn release(&self, bytes: u64) {
        let _ = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                Some(used.saturating_sub(bytes))
            });
    }

    /// Set usage from persisted rows after a restart.
    ///
    /// The restored figure may exceed the quota if the quota shrank while
    /// rows were queued; new reservations then fail until usage drops.
    pub fn restore(&self, bytes: u64) {
        self.used.store(bytes, Ordering::Release);
        if bytes > self.quota() {
            tracing::warn!(
                used = bytes,
                quota = self.quota(),
                "Queued payloads exceed the storage quota"
            );
        }
    }

    pub fn set_quota(&self, bytes: u64) {
        self.quota.store(bytes, Ordering::Release);
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    pub fn quota(&self) -> u64 {
        self.quota.load(Ordering::Acquire)
    }

    pub fn available(&self) -> u64 {
        self.quota().saturating_sub(self.used())
    }
}
