//! Host inventory

use std::str::FromStr;
use std::sync::{Arc, RwLock};

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::FleetError;
use crate::filesys::file::File;
use crate::models::host::{HostDescriptor, HostId, Service};
use crate::validation::address_issue;

/// Largest range `add_range` accepts
pub const MAX_RANGE_HOSTS: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Inventory {
    /// Next id to hand out; ids are never reused
    #[serde(default = "first_id")]
    next_id: HostId,
    #[serde(default)]
    hosts: Vec<HostDescriptor>,
}

fn first_id() -> HostId {
    1
}

impl Default for Inventory {
    fn default() -> Self {
        Self {
            next_id: first_id(),
            hosts: Vec::new(),
        }
    }
}

/// Shared, ordered host list
#[derive(Debug, Clone, Default)]
pub struct HostStore {
    inner: Arc<RwLock<Inventory>>,
}

impl HostStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the inventory; a missing file is an empty inventory
    pub async fn load(file: &File) -> Result<Self, FleetError> {
        if !file.exists().await {
            debug!("No inventory at {}, starting empty", file.path().display());
            return Ok(Self::new());
        }
        let mut inventory: Inventory = file.read_json().await.map_err(|e| {
            FleetError::StorageError(format!("{}: {}", file.path().display(), e))
        })?;

        let floor = inventory.hosts.iter().map(|h| h.id + 1).max().unwrap_or(1);
        inventory.next_id = inventory.next_id.max(floor);

        Ok(Self {
            inner: Arc::new(RwLock::new(inventory)),
        })
    }

    /// Persist the inventory readable by the owner only
    pub async fn save(&self, file: &File) -> Result<(), FleetError> {
        let inventory = self.read().clone();
        file.write_json(&inventory).await?;
        file.set_permissions_600().await?;
        debug!("Saved {} host(s) to {}", inventory.hosts.len(), file.path().display());
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inventory> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inventory> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add(
        &self,
        address: impl Into<String>,
        user: impl Into<String>,
        secret: impl Into<String>,
        service: Option<Service>,
    ) -> Result<HostDescriptor, FleetError> {
        let mut inventory = self.write();
        let host = HostDescriptor::new(inventory.next_id, address, user, secret, service);
        if let Some(issue) = address_issue(host.id, &host.address) {
            return Err(FleetError::ValidationFailed(vec![issue]));
        }
        inventory.next_id += 1;
        inventory.hosts.push(host.clone());
        info!("Added host {}", host.label());
        Ok(host)
    }

    /// Add one host per usable address in `cidr`, sharing credentials
    pub fn add_range(
        &self,
        cidr: &str,
        user: &str,
        secret: &str,
        service: Option<Service>,
    ) -> Result<Vec<HostDescriptor>, FleetError> {
        let net = IpNet::from_str(cidr.trim())
            .map_err(|e| FleetError::InvalidInput(format!("Invalid CIDR '{}': {}", cidr, e)))?;
        if let IpNet::V6(_) = net {
            return Err(FleetError::InvalidInput(format!("Range {} is not IPv4", cidr)));
        }
        let addresses: Vec<String> = net
            .hosts()
            .take(MAX_RANGE_HOSTS + 1)
            .map(|ip| ip.to_string())
            .collect();
        if addresses.len() > MAX_RANGE_HOSTS {
            return Err(FleetError::InvalidInput(format!(
                "Range {} has more than {} hosts",
                cidr, MAX_RANGE_HOSTS
            )));
        }

        addresses
            .into_iter()
            .map(|address| self.add(address, user, secret, service))
            .collect()
    }

    /// Edit a host in place
    pub fn update<F>(&self, id: HostId, edit: F) -> Result<HostDescriptor, FleetError>
    where
        F: FnOnce(&mut HostDescriptor),
    {
        let mut inventory = self.write();
        let host = inventory
            .hosts
            .iter_mut()
            .find(|h| h.id == id)
            .ok_or_else(|| FleetError::NotFound(format!("host #{}", id)))?;
        let mut edited = host.clone();
        edit(&mut edited);
        edited.id = id;
        if let Some(issue) = address_issue(id, &edited.address) {
            return Err(FleetError::ValidationFailed(vec![issue]));
        }
        *host = edited.clone();
        Ok(edited)
    }

    pub fn remove(&self, id: HostId) -> Result<HostDescriptor, FleetError> {
        let mut inventory = self.write();
        let index = inventory
            .hosts
            .iter()
            .position(|h| h.id == id)
            .ok_or_else(|| FleetError::NotFound(format!("host #{}", id)))?;
        let host = inventory.hosts.remove(index);
        info!("Removed host {}", host.label());
        Ok(host)
    }

    pub fn get(&self, id: HostId) -> Option<HostDescriptor> {
        self.read().hosts.iter().find(|h| h.id == id).cloned()
    }

    /// Every host, in insertion order
    pub fn snapshot(&self) -> Vec<HostDescriptor> {
        self.read().hosts.clone()
    }

    /// The hosts named by `ids`, in inventory order
    pub fn select(&self, ids: &[HostId]) -> Result<Vec<HostDescriptor>, FleetError> {
        if let Some(missing) = ids.iter().find(|id| self.get(**id).is_none()) {
            return Err(FleetError::NotFound(format!("host #{}", missing)));
        }
        Ok(self
            .read()
            .hosts
            .iter()
            .filter(|h| ids.contains(&h.id))
            .cloned()
            .collect())
    }

    pub fn len(&self) -> usize {
        self.read().hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
