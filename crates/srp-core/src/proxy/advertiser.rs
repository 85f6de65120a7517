//! Per-entry decisions and backend calls of the advertising proxy
//!
//! [`Advertiser`] owns the DNS-SD backend and the request-id allocator. It
//! holds no advertisement list of its own, so the proxy can walk its
//! outstanding advertisements mutably while comparing and registering
//! entries through it.
//!
//! Hosts and services share one bookkeeping shape ([`AdvState`]) and one
//! comparison algorithm; [`Advertisable`] exposes the few places where they
//! differ.

use std::collections::HashMap;

use hickory_proto::rr::DNSClass;
use tracing::{debug, info};

use crate::registry::adv::{AdvState, RequestId};
use crate::registry::{Host, Service};
use crate::traits::{DnssdPublisher, HostInfo, KeyInfo, ServiceInfo};
use crate::wire::name;
use crate::wire::record::{EcdsaKey, KeyRecord};

/// Entry (host or service) that can be mirrored onto the backend
pub(crate) trait Advertisable {
    fn adv(&self) -> &AdvState;

    fn adv_mut(&mut self) -> &mut AdvState;

    fn is_deleted(&self) -> bool;

    /// Whether the published description of both entries is identical
    fn entries_match(&self, other: &Self) -> bool;
}

impl Advertisable for Host {
    fn adv(&self) -> &AdvState {
        &self.adv
    }

    fn adv_mut(&mut self) -> &mut AdvState {
        &mut self.adv
    }

    fn is_deleted(&self) -> bool {
        Host::is_deleted(self)
    }

    fn entries_match(&self, other: &Self) -> bool {
        if self.is_deleted() || other.is_deleted() {
            return self.is_deleted() == other.is_deleted();
        }

        self.same_addresses(other)
    }
}

impl Advertisable for Service {
    fn adv(&self) -> &AdvState {
        &self.adv
    }

    fn adv_mut(&mut self) -> &mut AdvState {
        &mut self.adv
    }

    fn is_deleted(&self) -> bool {
        Service::is_deleted(self)
    }

    fn entries_match(&self, other: &Self) -> bool {
        if self.is_deleted() || other.is_deleted() {
            return self.is_deleted() == other.is_deleted();
        }

        self.same_description(other)
    }
}

/// Request-id allocator with an index from id to owning host name
#[derive(Debug)]
pub(crate) struct RequestIds {
    next: u64,
    owners: HashMap<RequestId, String>,
}

impl RequestIds {
    pub(crate) fn new() -> Self {
        Self {
            next: 1,
            owners: HashMap::new(),
        }
    }

    /// Allocate the next id for an entry of host `owner`; zero is skipped
    pub(crate) fn allocate(&mut self, owner: &str) -> RequestId {
        let id = loop {
            if let Some(id) = RequestId::new(self.next) {
                break id;
            }
            self.next = self.next.wrapping_add(1);
        };

        self.next = self.next.wrapping_add(1);
        self.owners.insert(id, owner.to_ascii_lowercase());
        id
    }

    pub(crate) fn owner_of(&self, id: RequestId) -> Option<&str> {
        self.owners.get(&id).map(String::as_str)
    }

    pub(crate) fn release(&mut self, id: RequestId) {
        self.owners.remove(&id);
    }

    /// Keep only ids for which `still_pending` holds
    pub(crate) fn retain(&mut self, mut still_pending: impl FnMut(RequestId, &str) -> bool) {
        self.owners.retain(|id, owner| still_pending(*id, owner));
    }

    pub(crate) fn clear(&mut self) {
        self.owners.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.owners.len()
    }
}

pub(crate) struct Advertiser {
    dnssd: Box<dyn DnssdPublisher>,
    domain: String,
    pub(crate) ids: RequestIds,
    /// Set whenever an advertisement may have completed
    pub(crate) tasklet_pending: bool,
}

impl Advertiser {
    pub(crate) fn new(dnssd: Box<dyn DnssdPublisher>, domain: impl Into<String>) -> Self {
        Self {
            dnssd,
            domain: domain.into(),
            ids: RequestIds::new(),
            tasklet_pending: false,
        }
    }

    pub(crate) fn backend_name(&self) -> &'static str {
        self.dnssd.name()
    }

    pub(crate) fn is_backend_ready(&self) -> bool {
        self.dnssd.is_ready()
    }

    pub(crate) fn set_domain(&mut self, domain: impl Into<String>) {
        self.domain = domain.into();
    }

    /// Recompute the id range of `host`, scheduling the tasklet once empty
    pub(crate) fn update_range(&mut self, host: &mut Host) {
        if host.update_adv_id_range() {
            self.tasklet_pending = true;
        }
    }

    fn decide_to_advertise<E: Advertisable>(
        &mut self,
        entry: &mut E,
        owner: &str,
        unregister_entry: bool,
        unregister_key: bool,
    ) {
        if !unregister_key && !entry.adv().is_key_registered_or_registering() {
            let id = self.ids.allocate(owner);
            let adv = entry.adv_mut();
            adv.should_register_key = true;
            adv.key_adv_id = Some(id);
        }

        if entry.adv().should_advertise {
            return;
        }

        if unregister_entry || entry.is_deleted() {
            let registered = entry.adv().registered;
            entry.adv_mut().should_advertise = registered;
        } else if !entry.adv().is_registered_or_registering() {
            let id = self.ids.allocate(owner);
            let adv = entry.adv_mut();
            adv.should_advertise = true;
            adv.adv_id = Some(id);
        }
    }

    /// Issue the backend calls that bring `host` in line with its flags
    pub(crate) fn advertise(&mut self, host: &mut Host) {
        let unregister = host.is_deleted();
        let unregister_keys = host.key_lease == 0;
        let owner = host.full_name.clone();

        self.decide_to_advertise(host, &owner, unregister, unregister_keys);
        for service in &mut host.services {
            self.decide_to_advertise(service, &owner, unregister, unregister_keys);
        }

        self.update_range(host);

        if unregister_keys {
            self.unregister_host_key(host);
        } else if host.adv.should_register_key {
            self.register_host_key(host);
        }

        if host.adv.should_advertise && !unregister {
            self.register_host(host);
        }

        let key = host.key.map(|record| record.key);
        for service in &mut host.services {
            if unregister_keys {
                self.unregister_service_key(service);
            } else if service.adv.should_register_key {
                self.register_service_key(key, service);
            }

            if service.adv.should_advertise {
                if unregister || service.is_deleted() {
                    self.unregister_service(&owner, service);
                } else {
                    self.register_service(&owner, service);
                }
            }
        }

        if host.adv.should_advertise && unregister {
            self.unregister_host(host);
        }
    }

    /// Withdraw everything of `host` that is registered or in flight
    pub(crate) fn unregister_host_and_services_and_keys(&mut self, host: &mut Host) {
        let owner = host.full_name.clone();

        for service in &mut host.services {
            if service.adv.key_registered {
                self.unregister_service_key(service);
            }

            if !service.adv.replaced && service.adv.is_registered_or_registering() {
                self.unregister_service(&owner, service);
            }
        }

        if host.adv.key_registered {
            self.unregister_host_key(host);
        }

        if !host.adv.replaced && host.adv.is_registered_or_registering() {
            self.unregister_host(host);
        }
    }

    /// Compare `host` with an older copy of the same name
    ///
    /// Returns whether anything of `existing` was superseded by `host`.
    pub(crate) fn compare_and_update_host_and_services(
        &mut self,
        host: &mut Host,
        existing: &mut Host,
    ) -> bool {
        let mut replaced = self.compare_and_update_host(host, existing);

        let owner = host.full_name.clone();
        for service in &mut host.services {
            if let Some(existing_service) = existing.find_service_mut(&service.instance_name) {
                replaced |= self.compare_and_update_service(&owner, service, existing_service);
            }
        }

        self.update_range(existing);
        replaced
    }

    fn update_key_registration_status<E: Advertisable>(entry: &mut E, existing: &E, key_lease: u32) {
        if key_lease == 0 || entry.adv().is_key_registered_or_registering() {
            return;
        }

        if existing.adv().key_registered {
            entry.adv_mut().key_registered = true;
        } else {
            entry.adv_mut().key_adv_id = existing.adv().key_adv_id;
        }
    }

    /// Shared comparison of a live entry with its older counterpart
    ///
    /// Returns `true` when `existing` is superseded by `entry`.
    fn compare_and_update<E: Advertisable>(
        &mut self,
        owner: &str,
        entry: &mut E,
        existing: &mut E,
    ) -> bool {
        if entry.adv().registered {
            return false;
        }

        if entry.adv().should_advertise || existing.adv().replaced || !entry.entries_match(existing) {
            existing.adv_mut().replaced = true;

            if entry.adv().adv_id.is_none() {
                let id = self.ids.allocate(owner);
                let adv = entry.adv_mut();
                adv.should_advertise = true;
                adv.adv_id = Some(id);
            }

            if existing.adv().adv_id.is_some() {
                existing.adv_mut().adv_id = entry.adv().adv_id;
            }

            return true;
        }

        if entry.adv().adv_id.is_some() {
            return false;
        }

        if existing.adv().registered {
            entry.adv_mut().registered = true;
        } else if existing.adv().adv_id.is_some() {
            entry.adv_mut().adv_id = existing.adv().adv_id;
        } else {
            let id = self.ids.allocate(owner);
            let adv = entry.adv_mut();
            adv.should_advertise = true;
            adv.adv_id = Some(id);
            existing.adv_mut().replaced = true;
        }

        false
    }

    fn compare_and_update_host(&mut self, host: &mut Host, existing: &mut Host) -> bool {
        let key_lease = host.key_lease;
        let unregister_keys = key_lease == 0;
        Self::update_key_registration_status(host, &*existing, key_lease);

        if !host.is_deleted() {
            let owner = host.full_name.clone();
            // Range of `existing` is recomputed by the caller.
            return self.compare_and_update(&owner, host, existing);
        }

        if existing.is_deleted() {
            if unregister_keys {
                for existing_service in &mut existing.services {
                    if host.find_service(&existing_service.instance_name).is_none() {
                        self.unregister_service_key(existing_service);
                    }
                }
            }
            return false;
        }

        host.adv.should_advertise = true;

        let owner = existing.full_name.clone();
        for existing_service in &mut existing.services {
            if existing_service.is_deleted() {
                if unregister_keys {
                    existing_service.adv.replaced = true;
                    self.unregister_service_key(existing_service);
                }
                continue;
            }

            if host.find_service(&existing_service.instance_name).is_some() {
                continue;
            }

            self.unregister_service(&owner, existing_service);
            existing_service.adv.replaced = true;

            if unregister_keys {
                self.unregister_service_key(existing_service);
            }
        }

        existing.adv.adv_id = None;
        existing.adv.replaced = true;

        if unregister_keys {
            self.unregister_host_key(existing);
        }

        true
    }

    fn compare_and_update_service(
        &mut self,
        owner: &str,
        service: &mut Service,
        existing: &mut Service,
    ) -> bool {
        let key_lease = service.key_lease;
        Self::update_key_registration_status(service, &*existing, key_lease);

        if !service.is_deleted() {
            return self.compare_and_update(owner, service, existing);
        }

        if existing.is_deleted() {
            return false;
        }

        service.adv.should_advertise = true;
        existing.adv.replaced = true;
        existing.adv.adv_id = None;

        true
    }

    pub(crate) fn register_host(&mut self, host: &mut Host) {
        host.adv.should_advertise = false;

        let Some(id) = host.adv.adv_id else {
            debug!("Host '{}' has no request id, not registering", host.full_name);
            return;
        };

        let info = HostInfo {
            host_name: self.relative(&host.full_name),
            addresses: host
                .addresses
                .iter()
                .copied()
                .filter(|address| !address.is_unicast_link_local())
                .collect(),
            ttl: host.ttl,
        };

        info!(
            "Registering host '{}' ({} address(es)) on {}, id:{}",
            info.host_name,
            info.addresses.len(),
            self.dnssd.name(),
            id
        );
        self.dnssd.register_host(&info, id);
    }

    pub(crate) fn unregister_host(&mut self, host: &mut Host) {
        host.adv.should_advertise = false;
        host.adv.registered = false;
        host.adv.adv_id = None;

        let info = HostInfo {
            host_name: self.relative(&host.full_name),
            addresses: Vec::new(),
            ttl: 0,
        };

        info!("Unregistering host '{}'", info.host_name);
        self.dnssd.unregister_host(&info);
    }

    pub(crate) fn register_service(&mut self, host_name: &str, service: &mut Service) {
        service.adv.should_advertise = false;

        let Some(id) = service.adv.adv_id else {
            debug!(
                "Service '{}' has no request id, not registering",
                service.instance_name
            );
            return;
        };

        let info = ServiceInfo {
            host_name: self.relative(host_name),
            service_instance: service.instance_label().to_string(),
            service_type: self.relative(service.service_name()),
            sub_type_labels: service.sub_type_labels().map(str::to_string).collect(),
            txt_data: service.txt_data.clone(),
            port: service.port,
            weight: service.weight,
            priority: service.priority,
            ttl: service.ttl,
        };

        info!(
            "Registering service '{}' '{}' on {}, id:{}",
            info.service_instance,
            info.service_type,
            self.dnssd.name(),
            id
        );
        self.dnssd.register_service(&info, id);
    }

    pub(crate) fn unregister_service(&mut self, host_name: &str, service: &mut Service) {
        service.adv.should_advertise = false;
        service.adv.registered = false;
        service.adv.adv_id = None;

        let info = ServiceInfo {
            host_name: self.relative(host_name),
            service_instance: service.instance_label().to_string(),
            service_type: self.relative(service.service_name()),
            sub_type_labels: Vec::new(),
            txt_data: Vec::new(),
            port: 0,
            weight: 0,
            priority: 0,
            ttl: 0,
        };

        info!(
            "Unregistering service '{}' '{}'",
            info.service_instance, info.service_type
        );
        self.dnssd.unregister_service(&info);
    }

    fn register_host_key(&mut self, host: &mut Host) {
        host.adv.should_register_key = false;

        let (Some(id), Some(record)) = (host.adv.key_adv_id, host.key) else {
            debug!("Host '{}' has no key request, not registering", host.full_name);
            return;
        };

        let info = KeyInfo {
            name: name::first_label(&host.full_name).to_string(),
            service_type: None,
            key_data: record.to_rdata(),
            class: u16::from(DNSClass::IN),
            ttl: host.ttl,
        };

        info!("Registering key of host '{}', id:{}", info.name, id);
        self.dnssd.register_key(&info, id);
    }

    fn register_service_key(&mut self, key: Option<EcdsaKey>, service: &mut Service) {
        service.adv.should_register_key = false;

        let (Some(id), Some(key)) = (service.adv.key_adv_id, key) else {
            debug!(
                "Service '{}' has no key request, not registering",
                service.instance_name
            );
            return;
        };

        let info = KeyInfo {
            name: service.instance_label().to_string(),
            service_type: Some(self.relative(service.service_name())),
            key_data: KeyRecord::new(key).to_rdata(),
            class: u16::from(DNSClass::IN),
            ttl: service.ttl,
        };

        info!("Registering key of service '{}', id:{}", info.name, id);
        self.dnssd.register_key(&info, id);
    }

    pub(crate) fn unregister_host_key(&mut self, host: &mut Host) {
        host.adv.key_registered = false;
        host.adv.key_adv_id = None;

        let info = KeyInfo {
            name: name::first_label(&host.full_name).to_string(),
            service_type: None,
            key_data: Vec::new(),
            class: u16::from(DNSClass::IN),
            ttl: 0,
        };

        debug!("Unregistering key of host '{}'", info.name);
        self.dnssd.unregister_key(&info);
    }

    pub(crate) fn unregister_service_key(&mut self, service: &mut Service) {
        service.adv.key_registered = false;
        service.adv.key_adv_id = None;

        let info = KeyInfo {
            name: service.instance_label().to_string(),
            service_type: Some(self.relative(service.service_name())),
            key_data: Vec::new(),
            class: u16::from(DNSClass::IN),
            ttl: 0,
        };

        debug!("Unregistering key of service '{}'", info.name);
        self.dnssd.unregister_key(&info);
    }

    fn relative(&self, full_name: &str) -> String {
        name::strip_domain(full_name, &self.domain).to_string()
    }
}
