//! Host and service registry
//!
//! The [`Registry`] owns every committed [`Host`]; each host owns its
//! [`Service`]s. Names are unique and compared case-insensitively. A name
//! is bound to the key that first registered it until its key lease
//! expires or the client removes it.
//!
//! ## Entry states
//!
//! - `Active`: the entry is registered and advertised
//! - `DeletedNameRetained`: the lease ran out (or the client removed the
//!   entry) but the key lease still reserves the name

pub mod adv;
mod host;
mod service;

pub use adv::{AdvState, IdRange, RequestId};
pub use host::Host;
pub use service::Service;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a host or service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    /// Registered and advertised
    Active,
    /// Deleted; the name stays reserved for the key lease
    DeletedNameRetained,
}

/// Committed hosts
#[derive(Debug, Default)]
pub struct Registry {
    hosts: Vec<Host>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of hosts, deleted ones included
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Whether no host is registered
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Iterate over all hosts
    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.iter()
    }

    pub(crate) fn hosts_mut(&mut self) -> impl Iterator<Item = &mut Host> {
        self.hosts.iter_mut()
    }

    /// Host with the given full name
    pub fn find_host(&self, full_name: &str) -> Option<&Host> {
        self.hosts.iter().find(|host| host.matches(full_name))
    }

    pub(crate) fn find_host_mut(&mut self, full_name: &str) -> Option<&mut Host> {
        self.hosts.iter_mut().find(|host| host.matches(full_name))
    }

    /// Service with the given instance name, with the host owning it
    pub fn find_service(&self, instance_name: &str) -> Option<(&Host, &Service)> {
        self.hosts.iter().find_map(|host| {
            host.find_service(instance_name)
                .map(|service| (host, service))
        })
    }

    /// Full names of all hosts
    pub fn host_names(&self) -> Vec<String> {
        self.hosts.iter().map(|host| host.full_name.clone()).collect()
    }

    pub(crate) fn insert(&mut self, host: Host) {
        self.take(&host.full_name);
        self.hosts.push(host);
    }

    pub(crate) fn take(&mut self, full_name: &str) -> Option<Host> {
        let index = self.hosts.iter().position(|host| host.matches(full_name))?;
        Some(self.hosts.remove(index))
    }

    pub(crate) fn host_at_mut(&mut self, index: usize) -> Option<&mut Host> {
        self.hosts.get_mut(index)
    }

    pub(crate) fn remove_at(&mut self, index: usize) -> Option<Host> {
        (index < self.hosts.len()).then(|| self.hosts.remove(index))
    }

    pub(crate) fn take_all(&mut self) -> Vec<Host> {
        std::mem::take(&mut self.hosts)
    }

    /// Whether `candidate` claims a host or service name bound to another key
    pub fn has_name_conflicts(&self, candidate: &Host) -> bool {
        if let Some(existing) = self.find_host(&candidate.full_name)
            && !existing.same_key(candidate)
        {
            return true;
        }

        candidate.services.iter().any(|service| {
            self.hosts.iter().any(|host| {
                host.find_service(&service.instance_name).is_some() && !host.same_key(candidate)
            })
        })
    }
}
