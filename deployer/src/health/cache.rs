//! Snapshot cache

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::models::health::HealthSnapshot;
use crate::models::host::HostId;

/// Latest snapshot per host, no history
#[derive(Debug, Default)]
pub struct SnapshotCache {
    entries: RwLock<BTreeMap<HostId, HealthSnapshot>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, host_id: HostId) -> Option<HealthSnapshot> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(&host_id).cloned()
    }

    /// Replace the snapshots of every host in `snapshots`
    pub fn replace_all(&self, snapshots: Vec<HealthSnapshot>) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        for snapshot in snapshots {
            entries.insert(snapshot.host_id, snapshot);
        }
    }

    pub fn remove(&self, host_id: HostId) -> Option<HealthSnapshot> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(&host_id)
    }

    /// Drop snapshots of hosts not in `keep`
    pub fn retain(&self, keep: &[HostId]) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.retain(|id, _| keep.contains(id));
    }

    /// All snapshots ordered by host id
    pub fn all(&self) -> Vec<HealthSnapshot> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.clear();
    }
}
