//! Per-device exclusive locks.
//!
//! A [`DeviceLocks`] registry is shared (cheaply cloned) between every driver
//! that may touch the same devices. A [`DeviceLock`] is held for as long as a
//! candidate is staged and is released when it is dropped, so every exit path
//! out of a transaction releases it without any explicit unlock call.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Clone)]
struct Holder {
    owner: String,
    acquired_at: DateTime<Utc>,
}

impl std::fmt::Display for Holder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (since {})", self.owner, self.acquired_at.to_rfc3339())
    }
}

/// Registry of held device locks.
#[derive(Debug, Clone, Default)]
pub struct DeviceLocks {
    held: Arc<DashMap<String, Holder>>,
}

impl DeviceLocks {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for `device` on behalf of `owner`.
    ///
    /// Fails with a description of the current holder when the device is
    /// already locked, including by the same owner.
    pub fn try_acquire(&self, device: &str, owner: &str) -> Result<DeviceLock, String> {
        match self.held.entry(device.to_string()) {
            Entry::Occupied(entry) => Err(entry.get().to_string()),
            Entry::Vacant(entry) => {
                entry.insert(Holder {
                    owner: owner.to_string(),
                    acquired_at: Utc::now(),
                });
                trace!(device = %device, owner = %owner, "lock acquired");
                Ok(DeviceLock {
                    device: device.to_string(),
                    owner: owner.to_string(),
                    held: Arc::clone(&self.held),
                })
            }
        }
    }

    /// Whether anyone holds the lock for `device`
    pub fn is_locked(&self, device: &str) -> bool {
        self.held.contains_key(device)
    }

    /// Description of the current holder, if any
    pub fn holder(&self, device: &str) -> Option<String> {
        self.held.get(device).map(|h| h.to_string())
    }

    /// Number of devices currently locked
    pub fn len(&self) -> usize {
        self.held.len()
    }

    /// No device is locked
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

/// An exclusive claim on one device, released on drop.
#[derive(Debug)]
pub struct DeviceLock {
    device: String,
    owner: String,
    held: Arc<DashMap<String, Holder>>,
}

impl DeviceLock {
    /// Locked device
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Lock owner
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

impl Drop for DeviceLock {
    fn drop(&mut self) {
        let owner = &self.owner;
        self.held.remove_if(&self.device, |_, holder| &holder.owner == owner);
        trace!(device = %self.device, owner = %self.owner, "lock released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_until_drop() {
        let locks = DeviceLocks::new();

        let lock = locks.try_acquire("r1", "driver-a").unwrap();
        assert!(locks.is_locked("r1"));

        let err = locks.try_acquire("r1", "driver-b").unwrap_err();
        assert!(err.starts_with("driver-a"));

        drop(lock);
        assert!(!locks.is_locked("r1"));
        assert!(locks.try_acquire("r1", "driver-b").is_ok());
    }

    #[test]
    fn test_same_owner_cannot_reenter() {
        let locks = DeviceLocks::new();
        let _lock = locks.try_acquire("r1", "driver-a").unwrap();
        assert!(locks.try_acquire("r1", "driver-a").is_err());
    }

    #[test]
    fn test_devices_are_independent() {
        let locks = DeviceLocks::new();
        let _a = locks.try_acquire("r1", "x").unwrap();
        let _b = locks.try_acquire("r2", "x").unwrap();
        assert_eq!(locks.len(), 2);
        assert_eq!(locks.holder("r2").map(|h| h.starts_with('x')), Some(true));
    }

    #[test]
    fn test_clones_share_state() {
        let locks = DeviceLocks::new();
        let other = locks.clone();
        let lock = locks.try_acquire("sw1", "a").unwrap();
        assert!(other.is_locked("sw1"));
        drop(lock);
        assert!(other.is_empty());
    }
}
