use std::net::Ipv6Addr;
use std::time::Instant;
use tracing::debug;

use super::EntryState;
use super::adv::{AdvState, IdRange};
use super::service::Service;
use crate::error::{UpdateError, UpdateResult};
use crate::lease::{LeaseInfo, expire_at};
use crate::wire::name;
use crate::wire::record::KeyRecord;

/// A host registered through SRP, together with its services
///
/// A candidate `Host` is built while an update is parsed; once committed
/// it is owned by the [`Registry`](super::Registry).
#[derive(Debug, Clone)]
pub struct Host {
    pub(crate) full_name: String,
    pub(crate) addresses: Vec<Ipv6Addr>,
    pub(crate) key: Option<KeyRecord>,
    pub(crate) ttl: u32,
    pub(crate) lease: u32,
    pub(crate) key_lease: u32,
    pub(crate) update_time: Instant,
    pub(crate) state: EntryState,
    pub(crate) services: Vec<Service>,
    pub(crate) use_short_lease_option: bool,
    pub(crate) adv: AdvState,
    pub(crate) adv_id_range: IdRange,
}

impl Host {
    pub(crate) fn new(update_time: Instant) -> Self {
        Self {
            full_name: String::new(),
            addresses: Vec::new(),
            key: None,
            ttl: 0,
            lease: 0,
            key_lease: 0,
            update_time,
            state: EntryState::Active,
            services: Vec::new(),
            use_short_lease_option: false,
            adv: AdvState::default(),
            adv_id_range: IdRange::empty(),
        }
    }

    /// Full host name, e.g. `foo.default.service.arpa.`
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Registered addresses
    pub fn addresses(&self) -> &[Ipv6Addr] {
        &self.addresses
    }

    /// Host key
    pub fn key(&self) -> Option<&KeyRecord> {
        self.key.as_ref()
    }

    /// Granted TTL
    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    /// Granted lease
    pub fn lease(&self) -> u32 {
        self.lease
    }

    /// Granted key lease
    pub fn key_lease(&self) -> u32 {
        self.key_lease
    }

    /// Entry state
    pub fn state(&self) -> EntryState {
        self.state
    }

    /// Whether the host is deleted (its name may still be retained)
    pub fn is_deleted(&self) -> bool {
        self.state == EntryState::DeletedNameRetained
    }

    /// Whether the client used the 4-byte lease option
    pub fn uses_short_lease_option(&self) -> bool {
        self.use_short_lease_option
    }

    /// Time of the last update of this host
    pub fn update_time(&self) -> Instant {
        self.update_time
    }

    /// Lease expiry
    pub fn expire_time(&self) -> Instant {
        expire_at(self.update_time, self.lease)
    }

    /// Key lease expiry
    pub fn key_expire_time(&self) -> Instant {
        expire_at(self.update_time, self.key_lease)
    }

    /// Lease details relative to `now`
    pub fn lease_info(&self, now: Instant) -> LeaseInfo {
        LeaseInfo::new(self.update_time, self.lease, self.key_lease, now)
    }

    /// Every service, deleted ones included
    pub fn services(&self) -> &[Service] {
        &self.services
    }

    /// Advertising state towards the DNS-SD backend
    pub fn adv_state(&self) -> &AdvState {
        &self.adv
    }

    /// Outstanding request ids of this host and its services
    pub fn adv_id_range(&self) -> IdRange {
        self.adv_id_range
    }

    /// Whether `full_name` names this host
    pub fn matches(&self, full_name: &str) -> bool {
        name::names_match(&self.full_name, full_name)
    }

    /// Service with the given instance name
    pub fn find_service(&self, instance_name: &str) -> Option<&Service> {
        self.services.iter().find(|service| service.matches(instance_name))
    }

    pub(crate) fn find_service_mut(&mut self, instance_name: &str) -> Option<&mut Service> {
        self.services
            .iter_mut()
            .find(|service| service.matches(instance_name))
    }

    pub(crate) fn find_or_add_service(&mut self, instance_name: &str) -> &mut Service {
        let index = match self
            .services
            .iter()
            .position(|service| service.matches(instance_name))
        {
            Some(index) => index,
            None => {
                self.services
                    .push(Service::new(instance_name, self.update_time));
                self.services.len() - 1
            }
        };
        &mut self.services[index]
    }

    pub(crate) fn add_copy_of_service_as_deleted(&mut self, service: &Service) {
        if self.find_service(&service.instance_name).is_none() {
            self.services.push(service.copy_as_deleted(self.update_time));
        }
    }

    /// Set the full name once; a different name afterwards is rejected
    pub(crate) fn set_full_name(&mut self, full_name: &str) -> UpdateResult {
        if self.full_name.is_empty() {
            self.full_name = full_name.to_string();
            return Ok(());
        }

        if self.matches(full_name) {
            Ok(())
        } else {
            Err(UpdateError::Failed)
        }
    }

    /// Check a record TTL against the TTL already seen
    ///
    /// The first non-zero TTL is kept; a later different non-zero TTL is
    /// rejected.
    pub(crate) fn process_ttl(&mut self, ttl: u32) -> UpdateResult {
        if ttl == 0 {
            return Ok(());
        }

        if self.ttl == 0 {
            self.ttl = ttl;
            Ok(())
        } else if self.ttl == ttl {
            Ok(())
        } else {
            Err(UpdateError::Rejected)
        }
    }

    /// Add an address; multicast, unspecified, loopback and duplicate
    /// addresses are ignored
    pub(crate) fn add_address(&mut self, address: Ipv6Addr) -> bool {
        if address.is_multicast() || address.is_unspecified() || address.is_loopback() {
            debug!("Ignoring address {} for host {}", address, self.full_name);
            return false;
        }

        if self.addresses.contains(&address) {
            return false;
        }

        self.addresses.push(address);
        true
    }

    pub(crate) fn set_key(&mut self, key: KeyRecord) -> UpdateResult {
        match &self.key {
            Some(existing) if existing.key != key.key => Err(UpdateError::Security),
            Some(_) => Ok(()),
            None => {
                self.key = Some(key);
                Ok(())
            }
        }
    }

    pub(crate) fn same_key(&self, other: &Host) -> bool {
        match (&self.key, &other.key) {
            (Some(first), Some(second)) => first.key == second.key,
            _ => false,
        }
    }

    pub(crate) fn clear_resources(&mut self) {
        self.addresses.clear();
    }

    /// Apply granted values to the host and all of its services
    pub(crate) fn apply_grant(&mut self, lease: u32, key_lease: u32, ttl: u32) {
        self.lease = lease;
        self.key_lease = key_lease;
        self.ttl = ttl;
        self.state = if lease == 0 {
            EntryState::DeletedNameRetained
        } else {
            EntryState::Active
        };

        for service in &mut self.services {
            service.lease = lease;
            service.key_lease = key_lease;
            service.ttl = ttl;
            if lease == 0 {
                service.state = EntryState::DeletedNameRetained;
            }
        }
    }

    pub(crate) fn mark_deleted(&mut self, retain_name: bool) {
        self.state = EntryState::DeletedNameRetained;
        self.lease = 0;
        self.clear_resources();
        if !retain_name {
            self.key_lease = 0;
        }
    }

    /// Recompute the id range; true when it ends up empty
    pub(crate) fn update_adv_id_range(&mut self) -> bool {
        let mut range = IdRange::empty();

        range.add(self.adv.adv_id);
        range.add(self.adv.key_adv_id);

        for service in &self.services {
            range.add(service.adv.adv_id);
            range.add(service.adv.key_adv_id);
        }

        self.adv_id_range = range;
        range.is_empty()
    }

    pub(crate) fn same_addresses(&self, other: &Host) -> bool {
        self.addresses.len() == other.addresses.len()
            && self
                .addresses
                .iter()
                .all(|address| other.addresses.contains(address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::adv::RequestId;
    use crate::wire::record::EcdsaKey;

    fn host() -> Host {
        let mut host = Host::new(Instant::now());
        host.set_full_name("foo.default.service.arpa.").unwrap();
        host
    }

    #[test]
    fn test_full_name_is_set_once() {
        let mut host = host();
        assert!(host.set_full_name("FOO.default.service.arpa.").is_ok());
        assert_eq!(
            host.set_full_name("bar.default.service.arpa."),
            Err(UpdateError::Failed)
        );
        assert_eq!(host.full_name(), "foo.default.service.arpa.");
    }

    #[test]
    fn test_ttl_consistency_is_strict() {
        let mut host = host();
        assert!(host.process_ttl(0).is_ok());
        assert!(host.process_ttl(120).is_ok());
        assert!(host.process_ttl(0).is_ok(), "zero TTL is tolerated");
        assert!(host.process_ttl(120).is_ok());
        assert_eq!(host.process_ttl(60), Err(UpdateError::Rejected));
        assert_eq!(host.ttl(), 120);
    }

    #[test]
    fn test_address_filtering() {
        let mut host = host();
        let address: Ipv6Addr = "fd00::1".parse().unwrap();

        assert!(host.add_address(address));
        assert!(!host.add_address(address));
        assert!(!host.add_address(Ipv6Addr::LOCALHOST));
        assert!(!host.add_address(Ipv6Addr::UNSPECIFIED));
        assert!(!host.add_address("ff02::1".parse().unwrap()));
        assert_eq!(host.addresses(), &[address]);
    }

    #[test]
    fn test_key_must_match_once_set() {
        let mut host = host();
        let key = KeyRecord::new(EcdsaKey([1u8; 64]));

        assert!(host.set_key(key).is_ok());
        assert!(host.set_key(key).is_ok());
        assert_eq!(
            host.set_key(KeyRecord::new(EcdsaKey([2u8; 64]))),
            Err(UpdateError::Security)
        );
    }

    #[test]
    fn test_apply_grant_to_services() {
        let mut host = host();
        host.find_or_add_service("inst._test._udp.default.service.arpa.");
        host.apply_grant(0, 7200, 60);

        assert!(host.is_deleted());
        assert!(host.services()[0].is_deleted());
        assert_eq!(host.services()[0].key_lease(), 7200);
    }

    #[test]
    fn test_id_range_tracks_services() {
        let mut host = host();
        host.adv.adv_id = RequestId::new(2);
        host.find_or_add_service("inst._test._udp.default.service.arpa.")
            .adv
            .key_adv_id = RequestId::new(4);

        assert!(!host.update_adv_id_range());
        assert!(host.adv_id_range().contains(RequestId::new(3).unwrap()));

        host.adv.adv_id = None;
        host.services[0].adv.key_adv_id = None;
        assert!(host.update_adv_id_range());
    }
}
