use std::time::Instant;

use super::adv::AdvState;
use super::EntryState;
use crate::lease::{LeaseInfo, expire_at};
use crate::wire::name;

/// Which records of a service the update section supplied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ParseProgress {
    pub delete_all: bool,
    pub srv: bool,
    pub txt: bool,
}

/// A service instance registered by a host
#[derive(Debug, Clone)]
pub struct Service {
    pub(crate) instance_name: String,
    pub(crate) service_name: Option<String>,
    pub(crate) sub_types: Vec<String>,
    pub(crate) txt_data: Vec<u8>,
    pub(crate) port: u16,
    pub(crate) weight: u16,
    pub(crate) priority: u16,
    pub(crate) ttl: u32,
    pub(crate) lease: u32,
    pub(crate) key_lease: u32,
    pub(crate) update_time: Instant,
    pub(crate) state: EntryState,
    pub(crate) committed: bool,
    pub(crate) parsed: ParseProgress,
    pub(crate) adv: AdvState,
}

impl Service {
    pub(crate) fn new(instance_name: impl Into<String>, update_time: Instant) -> Self {
        Self {
            instance_name: instance_name.into(),
            service_name: None,
            sub_types: Vec::new(),
            txt_data: Vec::new(),
            port: 0,
            weight: 0,
            priority: 0,
            ttl: 0,
            lease: 0,
            key_lease: 0,
            update_time,
            state: EntryState::Active,
            committed: false,
            parsed: ParseProgress::default(),
            adv: AdvState::default(),
        }
    }

    /// Deleted copy of `self` carrying the name and the service type only
    pub(crate) fn copy_as_deleted(&self, update_time: Instant) -> Self {
        let mut copy = Service::new(self.instance_name.clone(), update_time);
        copy.service_name = self.service_name.clone();
        copy.state = EntryState::DeletedNameRetained;
        copy
    }

    /// Full instance name, e.g. `inst._test._udp.default.service.arpa.`
    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    /// First label of the instance name
    pub fn instance_label(&self) -> &str {
        name::first_label(&self.instance_name)
    }

    /// Base service name, e.g. `_test._udp.default.service.arpa.`
    pub fn service_name(&self) -> &str {
        self.service_name.as_deref().unwrap_or_default()
    }

    /// Full sub-type service names
    pub fn sub_type_names(&self) -> &[String] {
        &self.sub_types
    }

    /// Sub-type labels (`_s1` of `_s1._sub._test._udp...`)
    pub fn sub_type_labels(&self) -> impl Iterator<Item = &str> {
        self.sub_types.iter().map(|sub_type| name::first_label(sub_type))
    }

    /// Whether the service was registered with the given sub-type name
    pub fn has_sub_type(&self, sub_type_name: &str) -> bool {
        self.sub_types
            .iter()
            .any(|sub_type| name::names_match(sub_type, sub_type_name))
    }

    /// Encoded TXT data
    pub fn txt_data(&self) -> &[u8] {
        &self.txt_data
    }

    /// SRV port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// SRV weight
    pub fn weight(&self) -> u16 {
        self.weight
    }

    /// SRV priority
    pub fn priority(&self) -> u16 {
        self.priority
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

    /// Whether the service is deleted (its name may still be retained)
    pub fn is_deleted(&self) -> bool {
        self.state == EntryState::DeletedNameRetained
    }

    /// Whether the service has been committed to the registry
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Time of the last update of this service
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

    /// Advertising state towards the DNS-SD backend
    pub fn adv_state(&self) -> &AdvState {
        &self.adv
    }

    /// Whether `instance_name` names this service
    pub fn matches(&self, instance_name: &str) -> bool {
        name::names_match(&self.instance_name, instance_name)
    }

    pub(crate) fn clear_resources(&mut self) {
        self.port = 0;
        self.txt_data.clear();
    }

    pub(crate) fn mark_deleted(&mut self, retain_name: bool) {
        self.state = EntryState::DeletedNameRetained;
        self.lease = 0;
        if !retain_name {
            self.key_lease = 0;
        }
    }

    pub(crate) fn same_description(&self, other: &Service) -> bool {
        self.port == other.port
            && self.weight == other.weight
            && self.priority == other.priority
            && self.ttl == other.ttl
            && self.txt_data == other.txt_data
            && self.sub_types.len() == other.sub_types.len()
            && self.sub_types.iter().all(|sub_type| other.has_sub_type(sub_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> Service {
        let mut service = Service::new("inst._test._udp.default.service.arpa.", Instant::now());
        service.service_name = Some("_test._udp.default.service.arpa.".to_string());
        service.sub_types = vec!["_s1._sub._test._udp.default.service.arpa.".to_string()];
        service.port = 1234;
        service.txt_data = b"\x03a=1".to_vec();
        service.ttl = 120;
        service
    }

    #[test]
    fn test_names_and_labels() {
        let service = service();
        assert_eq!(service.instance_label(), "inst");
        assert_eq!(service.service_name(), "_test._udp.default.service.arpa.");
        assert_eq!(service.sub_type_labels().collect::<Vec<_>>(), vec!["_s1"]);
        assert!(service.has_sub_type("_S1._sub._test._udp.default.service.arpa."));
        assert!(service.matches("INST._test._udp.default.service.arpa."));
    }

    #[test]
    fn test_same_description_ignores_sub_type_order() {
        let mut first = service();
        first
            .sub_types
            .push("_s2._sub._test._udp.default.service.arpa.".to_string());
        let mut second = first.clone();
        second.sub_types.reverse();
        assert!(first.same_description(&second));

        second.port = 4321;
        assert!(!first.same_description(&second));
    }

    #[test]
    fn test_copy_as_deleted_resets_description() {
        let mut original = service();
        original.adv.registered = true;

        let copy = original.copy_as_deleted(Instant::now());
        assert!(copy.is_deleted());
        assert_eq!(copy.service_name(), original.service_name());
        assert_eq!(copy.port(), 0);
        assert!(!copy.adv_state().registered);
    }

    #[test]
    fn test_mark_deleted() {
        let mut service = service();
        service.lease = 3600;
        service.key_lease = 7200;

        service.mark_deleted(true);
        assert!(service.is_deleted());
        assert_eq!(service.lease(), 0);
        assert_eq!(service.key_lease(), 7200);

        service.mark_deleted(false);
        assert_eq!(service.key_lease(), 0);
    }
}
