//! MAC learning table.
//!
//! Maps source MAC addresses to the interface they were last seen on,
//! with first/last-seen timestamps used by the aging sweep.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use olan_common::MacAddr;
use parking_lot::RwLock;
use serde::Serialize;

use crate::device::VirtualInterface;

/// Result of observing a source address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Learned {
    /// A new entry was created.
    Created,
    /// An existing entry had its last-seen time refreshed.
    Refreshed,
    /// Group addresses are never learned.
    Skipped,
}

#[derive(Debug)]
struct Learner {
    device: Arc<dyn VirtualInterface>,
    first_seen: i64,
    last_seen: AtomicI64,
}

impl Learner {
    fn touch(&self, now: i64) {
        self.last_seen.fetch_max(now, Ordering::AcqRel);
    }

    fn last_seen(&self) -> i64 {
        self.last_seen.load(Ordering::Acquire)
    }
}

/// Point-in-time view of a learned address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LearnerInfo {
    /// Learned address.
    pub mac: MacAddr,
    /// Interface owning the address.
    pub interface: String,
    /// Unix time of the first observation.
    pub first_seen: i64,
    /// Unix time of the latest observation.
    pub last_seen: i64,
}

/// Concurrent MAC learning table.
#[derive(Debug, Default)]
pub struct LearnerTable {
    entries: RwLock<HashMap<MacAddr, Learner>>,
}

impl LearnerTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe `mac` as a source address on `device` at time `now`.
    ///
    /// An existing entry keeps its owner and only has its last-seen time
    /// moved forward.
    pub fn learn(&self, mac: MacAddr, device: &Arc<dyn VirtualInterface>, now: i64) -> Learned {
        if mac.is_multicast() {
            return Learned::Skipped;
        }

        if let Some(learner) = self.entries.read().get(&mac) {
            learner.touch(now);
            return Learned::Refreshed;
        }

        match self.entries.write().entry(mac) {
            Entry::Occupied(entry) => {
                entry.get().touch(now);
                Learned::Refreshed
            }
            Entry::Vacant(entry) => {
                entry.insert(Learner {
                    device: device.clone(),
                    first_seen: now,
                    last_seen: AtomicI64::new(now),
                });
                Learned::Created
            }
        }
    }

    /// Interface that owns `mac`, if learned.
    #[must_use]
    pub fn owner(&self, mac: &MacAddr) -> Option<Arc<dyn VirtualInterface>> {
        self.entries.read().get(mac).map(|l| l.device.clone())
    }

    /// Snapshot of a single entry.
    #[must_use]
    pub fn get(&self, mac: &MacAddr) -> Option<LearnerInfo> {
        self.entries.read().get(mac).map(|l| info(*mac, l))
    }

    /// Remove entries idle for more than `timeout` seconds.
    ///
    /// Stale keys are collected under the read lock and removed under the
    /// write lock in a second pass. An entry refreshed between the two
    /// passes is still removed.
    pub fn expire(&self, now: i64, timeout: i64) -> Vec<MacAddr> {
        let stale: Vec<MacAddr> = self
            .entries
            .read()
            .iter()
            .filter(|(_, l)| now - l.last_seen() > timeout)
            .map(|(mac, _)| *mac)
            .collect();

        if stale.is_empty() {
            return stale;
        }

        let mut entries = self.entries.write();
        stale
            .into_iter()
            .filter(|mac| entries.remove(mac).is_some())
            .collect()
    }

    /// Snapshot of all entries.
    #[must_use]
    pub fn snapshot(&self) -> Vec<LearnerInfo> {
        self.entries
            .read()
            .iter()
            .map(|(mac, l)| info(*mac, l))
            .collect()
    }

    /// Number of learned addresses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing has been learned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

fn info(mac: MacAddr, learner: &Learner) -> LearnerInfo {
    LearnerInfo {
        mac,
        interface: learner.device.name().to_string(),
        first_seen: learner.first_seen,
        last_seen: learner.last_seen(),
    }
}
