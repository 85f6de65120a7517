//! Advertising proxy
//!
//! Mirrors accepted SRP registrations onto a [`DnssdPublisher`] backend.
//! Each validated update is wrapped in an advertisement that is compared
//! against older outstanding advertisements and the committed entry of the
//! same name, then the backend calls actually needed are issued. The
//! advertisement completes once every request id it waits on is answered,
//! its timeout fires, or it is aborted. Completions are drained by the
//! server through [`AdvertisingProxy::take_completed`].
//!
//! An advertisement superseding entries of an older one still in flight is
//! blocked by it, so updates for one name finish in the order received.

mod advertiser;

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ProxyConfig;
use crate::error::{UpdateError, UpdateResult};
use crate::registry::adv::RequestId;
use crate::registry::{EntryState, Host, Registry, Service};
use crate::server::MessageMetadata;
use crate::traits::DnssdPublisher;

use advertiser::Advertiser;

/// Proxy state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProxyState {
    Stopped,
    Running,
}

/// Proxy statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProxyCounters {
    pub state_changes: u32,
    pub adv_total: u32,
    pub adv_replaced: u32,
    pub adv_skipped: u32,
    pub adv_successful: u32,
    pub adv_rejected: u32,
    pub adv_timeout: u32,
    pub adv_host_removals: u32,
    pub adv_service_removals: u32,
}

/// One outstanding `advertise()` call
#[derive(Debug)]
struct AdvInfo {
    seq: u64,
    host: Host,
    metadata: MessageMetadata,
    expire_time: Instant,
    /// Older advertisement this one waits for
    blocking: Option<u64>,
    error: Option<UpdateError>,
}

impl AdvInfo {
    fn is_completed(&self) -> bool {
        self.blocking.is_none() && (self.error.is_some() || self.host.adv_id_range.is_empty())
    }
}

/// Finished advertisement handed back to the server
#[derive(Debug)]
pub struct AdvCompletion {
    pub host: Host,
    pub metadata: MessageMetadata,
    pub result: UpdateResult,
}

pub struct AdvertisingProxy {
    state: ProxyState,
    infra_link_running: bool,
    advertiser: Advertiser,
    /// Newest first
    adv_infos: VecDeque<AdvInfo>,
    next_adv_seq: u64,
    adv_timeout: Duration,
    counters: ProxyCounters,
    completed: Vec<AdvCompletion>,
}

impl AdvertisingProxy {
    pub fn new(dnssd: Box<dyn DnssdPublisher>, domain: impl Into<String>, config: &ProxyConfig) -> Self {
        Self {
            state: ProxyState::Stopped,
            infra_link_running: false,
            advertiser: Advertiser::new(dnssd, domain),
            adv_infos: VecDeque::new(),
            next_adv_seq: 0,
            adv_timeout: Duration::from_millis(config.advertisement_timeout_ms),
            counters: ProxyCounters::default(),
            completed: Vec::new(),
        }
    }

    pub fn state(&self) -> ProxyState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ProxyState::Running
    }

    pub fn counters(&self) -> &ProxyCounters {
        &self.counters
    }

    pub fn backend_name(&self) -> &'static str {
        self.advertiser.backend_name()
    }

    pub fn advertisement_timeout(&self) -> Duration {
        self.adv_timeout
    }

    pub fn set_advertisement_timeout(&mut self, timeout: Duration) {
        self.adv_timeout = timeout;
    }

    /// Number of advertisements still waiting for completion
    pub fn outstanding(&self) -> usize {
        self.adv_infos.len()
    }

    pub(crate) fn set_domain(&mut self, domain: &str) {
        self.advertiser.set_domain(domain);
    }

    pub(crate) fn set_infra_link_running(&mut self, running: bool) {
        self.infra_link_running = running;
    }

    /// Whether an advertisement for (`message_id`, `peer`) is still outstanding
    pub(crate) fn has_outstanding(&self, message_id: u16, peer: SocketAddr) -> bool {
        self.adv_infos
            .iter()
            .any(|adv| adv.metadata.header.id() == message_id && adv.metadata.peer == peer)
    }

    /// Start or stop to follow the backend, the infrastructure link and the server
    pub(crate) fn update_state(&mut self, server_running: bool, registry: &mut Registry) {
        let should_run =
            server_running && self.infra_link_running && self.advertiser.is_backend_ready();

        if should_run {
            self.start(registry);
        } else {
            self.stop(registry);
        }
    }

    fn start(&mut self, registry: &mut Registry) {
        if self.is_running() {
            return;
        }

        self.state = ProxyState::Running;
        self.counters.state_changes += 1;
        info!("Advertising proxy started on {}", self.advertiser.backend_name());

        for host in registry.hosts_mut() {
            self.advertiser.advertise(host);
        }
    }

    fn stop(&mut self, registry: &mut Registry) {
        if !self.is_running() {
            return;
        }

        self.state = ProxyState::Stopped;
        self.counters.state_changes += 1;

        while let Some(mut adv) = self.adv_infos.pop_front() {
            self.counters.adv_rejected += 1;

            self.advertiser.unregister_host_and_services_and_keys(&mut adv.host);
            adv.host.adv_id_range.clear();

            self.completed.push(AdvCompletion {
                host: adv.host,
                metadata: adv.metadata,
                result: Err(UpdateError::Abort),
            });
        }

        for host in registry.hosts_mut() {
            self.advertiser.unregister_host_and_services_and_keys(host);

            host.adv_id_range.clear();
            host.adv.adv_id = None;
            host.adv.registered = false;

            for service in &mut host.services {
                service.adv.adv_id = None;
                service.adv.registered = false;
            }
        }

        self.advertiser.ids.clear();
        self.advertiser.tasklet_pending = false;
        info!("Advertising proxy stopped");
    }

    /// Advertise a validated candidate `host`
    ///
    /// The outcome is reported through [`take_completed`](Self::take_completed),
    /// possibly immediately.
    pub(crate) fn advertise(
        &mut self,
        host: Host,
        metadata: MessageMetadata,
        registry: &mut Registry,
        now: Instant,
    ) {
        self.counters.adv_total += 1;

        if !self.is_running() {
            self.counters.adv_skipped += 1;
            debug!("Proxy not running, skipping advertisement of '{}'", host.full_name);
            self.completed.push(AdvCompletion {
                host,
                metadata,
                result: Ok(()),
            });
            return;
        }

        self.next_adv_seq += 1;
        let mut adv = AdvInfo {
            seq: self.next_adv_seq,
            host,
            metadata,
            expire_time: now + self.adv_timeout,
            blocking: None,
            error: None,
        };

        info!(
            "Advertising '{}' (message id {}), {} outstanding",
            adv.host.full_name,
            adv.metadata.header.id(),
            self.adv_infos.len()
        );

        for other in self.adv_infos.iter_mut() {
            if !adv.host.matches(&other.host.full_name) {
                continue;
            }

            let replaced = self
                .advertiser
                .compare_and_update_host_and_services(&mut adv.host, &mut other.host);

            if replaced && adv.blocking.is_none() {
                self.counters.adv_replaced += 1;
                adv.blocking = Some(other.seq);
                debug!(
                    "Advertisement of '{}' waits for an older one",
                    adv.host.full_name
                );
            }
        }

        if let Some(existing) = registry.find_host_mut(&adv.host.full_name) {
            self.advertiser
                .compare_and_update_host_and_services(&mut adv.host, existing);
        }

        self.advertiser.advertise(&mut adv.host);

        if adv.is_completed() {
            self.advertiser.tasklet_pending = true;
        }

        self.adv_infos.push_front(adv);
    }

    /// Backend answered request `id`
    pub(crate) fn handle_registered(&mut self, id: RequestId, result: UpdateResult, registry: &mut Registry) {
        if !self.is_running() {
            return;
        }

        let Some(owner) = self.advertiser.ids.owner_of(id).map(str::to_string) else {
            debug!("Ignoring completion of unknown request id {}", id);
            return;
        };
        self.advertiser.ids.release(id);

        if let Err(err) = &result {
            warn!("Request id {} for '{}' failed: {}", id, owner, err);
        }

        if let Some(host) = registry.find_host_mut(&owner) {
            handle_registered_on(&mut self.advertiser, host, id, result.is_ok());
        }

        for adv in self.adv_infos.iter_mut() {
            if !adv.host.matches(&owner)
                || !handle_registered_on(&mut self.advertiser, &mut adv.host, id, result.is_ok())
            {
                continue;
            }

            if let Err(err) = &result
                && adv.error.is_none()
            {
                adv.error = Some(err.clone());
            }

            if adv.is_completed() {
                self.advertiser.tasklet_pending = true;
            }
        }
    }

    /// Whether deferred completion work is waiting for [`run_tasklet`](Self::run_tasklet)
    pub(crate) fn has_pending_work(&self) -> bool {
        self.advertiser.tasklet_pending
    }

    /// Signal every completed advertisement, oldest first
    pub(crate) fn run_tasklet(&mut self, registry: &Registry) {
        if !self.advertiser.tasklet_pending {
            return;
        }

        if self.is_running() {
            loop {
                let done = self.take_matching(AdvInfo::is_completed);
                if done.is_empty() {
                    break;
                }

                for adv in done {
                    self.signal_adv_completed(adv);
                }
            }

            self.prune_ids(registry);
        }

        self.advertiser.tasklet_pending = false;
    }

    /// Earliest advertisement timeout
    pub fn next_deadline(&self) -> Option<Instant> {
        if !self.is_running() {
            return None;
        }

        self.adv_infos.iter().map(|adv| adv.expire_time).min()
    }

    /// Time out advertisements whose deadline passed
    pub(crate) fn handle_timer(&mut self, now: Instant, registry: &Registry) {
        if !self.is_running() {
            return;
        }

        let expired = self.take_matching(|adv| adv.expire_time <= now);

        for mut adv in expired {
            warn!(
                "Advertisement of '{}' (message id {}) timed out",
                adv.host.full_name, adv.metadata.header.id()
            );

            adv.error = Some(UpdateError::ResponseTimeout);
            adv.blocking = None;
            adv.host.adv_id_range.clear();
            self.signal_adv_completed(adv);
        }

        self.prune_ids(registry);
    }

    /// Unregister a committed host being removed by the server
    pub(crate) fn advertise_removal_of_host(&mut self, host: &mut Host) {
        self.counters.adv_host_removals += 1;

        if !self.is_running() || !host.is_deleted() {
            return;
        }

        info!("Advertising removal of host '{}'", host.full_name);

        let unregister_keys = host.key_lease == 0;

        host.adv.should_advertise = host.adv.registered;
        for service in &mut host.services {
            service.state = EntryState::DeletedNameRetained;
            service.adv.should_advertise = service.adv.registered;
        }

        for adv in self.adv_infos.iter_mut() {
            if !host.matches(&adv.host.full_name) || adv.host.is_deleted() {
                continue;
            }

            let adv_host_name = adv.host.full_name.clone();
            for adv_service in &mut adv.host.services {
                match host.find_service_mut(&adv_service.instance_name) {
                    None => {
                        if !adv_service.is_deleted() {
                            self.advertiser.unregister_service(&adv_host_name, adv_service);
                        }
                        self.advertiser.unregister_service_key(adv_service);
                    }
                    Some(service) => {
                        service.adv.should_advertise = true;
                        if unregister_keys {
                            adv_service.adv.key_registered = false;
                        }
                    }
                }

                adv_service.adv.clear_ids();
                adv_service.adv.replaced = true;
            }

            if unregister_keys {
                adv.host.adv.key_registered = false;
            }
            adv.host.adv.clear_ids();
            adv.host.adv.replaced = true;
            adv.host.adv_id_range.clear();

            adv.error = Some(UpdateError::Abort);
            self.advertiser.tasklet_pending = true;
        }

        let host_name = host.full_name.clone();
        for service in &mut host.services {
            if service.adv.should_advertise {
                self.advertiser.unregister_service(&host_name, service);
            }
            if unregister_keys {
                self.advertiser.unregister_service_key(service);
            }
        }

        if host.adv.should_advertise {
            self.advertiser.unregister_host(host);
        }
        if unregister_keys {
            self.advertiser.unregister_host_key(host);
        }
    }

    /// Unregister a committed service of `host_name` being removed by the server
    pub(crate) fn advertise_removal_of_service(&mut self, host_name: &str, service: &mut Service) {
        self.counters.adv_service_removals += 1;

        if !self.is_running() {
            return;
        }

        service.adv.should_advertise = service.adv.registered;

        for adv in &self.adv_infos {
            if !adv.host.matches(host_name) {
                continue;
            }

            if adv.host.is_deleted() {
                break;
            }

            if adv
                .host
                .find_service(&service.instance_name)
                .is_some_and(|pending| !pending.is_deleted())
            {
                debug!(
                    "Service '{}' is re-registered by an outstanding update",
                    service.instance_name
                );
                return;
            }
        }

        info!("Advertising removal of service '{}'", service.instance_name);

        if service.adv.should_advertise {
            self.advertiser.unregister_service(host_name, service);
        }
        if service.key_lease == 0 {
            self.advertiser.unregister_service_key(service);
        }
    }

    /// Drain finished advertisements
    pub(crate) fn take_completed(&mut self) -> Vec<AdvCompletion> {
        std::mem::take(&mut self.completed)
    }

    /// Remove advertisements matching `predicate`, oldest first
    fn take_matching(&mut self, predicate: impl Fn(&AdvInfo) -> bool) -> Vec<AdvInfo> {
        let mut taken = Vec::new();
        let mut index = self.adv_infos.len();

        while index > 0 {
            index -= 1;
            if predicate(&self.adv_infos[index])
                && let Some(adv) = self.adv_infos.remove(index)
            {
                taken.push(adv);
            }
        }

        taken
    }

    fn signal_adv_completed(&mut self, adv: AdvInfo) {
        for other in self.adv_infos.iter_mut() {
            if other.blocking == Some(adv.seq) {
                other.blocking = None;
                if other.is_completed() {
                    self.advertiser.tasklet_pending = true;
                }
            }
        }

        match &adv.error {
            None => self.counters.adv_successful += 1,
            Some(UpdateError::ResponseTimeout) => self.counters.adv_timeout += 1,
            Some(_) => self.counters.adv_rejected += 1,
        }

        info!(
            "Advertisement of '{}' (message id {}) done: {}",
            adv.host.full_name,
            adv.metadata.header.id(),
            adv.error
                .as_ref()
                .map_or_else(|| "ok".to_string(), ToString::to_string)
        );

        self.completed.push(AdvCompletion {
            host: adv.host,
            metadata: adv.metadata,
            result: adv.error.map_or(Ok(()), Err),
        });
    }

    /// Forget ids no host or advertisement can still be waiting for
    fn prune_ids(&mut self, registry: &Registry) {
        let adv_infos = &self.adv_infos;

        self.advertiser.ids.retain(|id, owner| {
            registry
                .find_host(owner)
                .is_some_and(|host| host.adv_id_range.contains(id))
                || adv_infos
                    .iter()
                    .any(|adv| adv.host.matches(owner) && adv.host.adv_id_range.contains(id))
        });
    }
}

/// Apply the completion of `id` to `host`; returns whether `id` was in its range
fn handle_registered_on(advertiser: &mut Advertiser, host: &mut Host, id: RequestId, success: bool) -> bool {
    if !host.adv_id_range.contains(id) {
        return false;
    }

    if host.adv.adv_id == Some(id) {
        host.adv.adv_id = None;
        host.adv.registered = success;
    }
    if host.adv.key_adv_id == Some(id) {
        host.adv.key_adv_id = None;
        host.adv.key_registered = true;
    }

    for service in &mut host.services {
        if service.adv.adv_id == Some(id) {
            service.adv.adv_id = None;
            service.adv.registered = success;
        }
        if service.adv.key_adv_id == Some(id) {
            service.adv.key_adv_id = None;
            service.adv.key_registered = true;
        }
    }

    advertiser.update_range(host);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dnssd::MemoryDnssd;
    use crate::lease::{LeaseConfig, TtlConfig};
    use crate::wire::record::{ECDSA_KEY_LEN, EcdsaKey, KeyRecord};
    use crate::wire::update_header;

    const HOST_NAME: &str = "foo.default.service.arpa.";

    fn host(port: u16, now: Instant) -> Host {
        let mut host = Host::new(now);
        host.full_name = HOST_NAME.to_string();
        host.addresses.push("fd00::1".parse().unwrap());
        host.key = Some(KeyRecord::new(EcdsaKey([7; ECDSA_KEY_LEN])));
        host.ttl = 120;
        host.lease = 7200;
        host.key_lease = 1_209_600;

        let service = host.find_or_add_service("inst._test._udp.default.service.arpa.");
        service.service_name = Some("_test._udp.default.service.arpa.".to_string());
        service.port = port;
        service.ttl = 120;
        service.lease = 7200;
        service.key_lease = 1_209_600;

        host
    }

    fn metadata(message_id: u16, now: Instant) -> MessageMetadata {
        MessageMetadata {
            header: update_header(message_id),
            peer: "[fd00::2]:49152".parse().unwrap(),
            rx_time: now,
            ttl: TtlConfig::default(),
            lease: LeaseConfig::default(),
        }
    }

    fn running_proxy(dnssd: &MemoryDnssd, registry: &mut Registry) -> AdvertisingProxy {
        let config = ProxyConfig {
            advertisement_timeout_ms: 10_000,
        };
        let mut proxy = AdvertisingProxy::new(Box::new(dnssd.clone()), "default.service.arpa.", &config);
        proxy.set_infra_link_running(true);
        proxy.update_state(true, registry);
        assert!(proxy.is_running());
        proxy
    }

    fn answer_all(proxy: &mut AdvertisingProxy, dnssd: &MemoryDnssd, registry: &mut Registry) {
        for id in dnssd.take_pending() {
            proxy.handle_registered(id, Ok(()), registry);
        }
        proxy.run_tasklet(registry);
    }

    #[test]
    fn test_proxy_stopped_without_infra_link() {
        let dnssd = MemoryDnssd::new();
        let mut registry = Registry::new();
        let mut proxy = AdvertisingProxy::new(
            Box::new(dnssd.clone()),
            "default.service.arpa.",
            &ProxyConfig::default(),
        );

        proxy.update_state(true, &mut registry);
        assert_eq!(proxy.state(), ProxyState::Stopped);

        let now = Instant::now();
        proxy.advertise(host(1234, now), metadata(1, now), &mut registry, now);

        let completed = proxy.take_completed();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].result, Ok(()));
        assert_eq!(proxy.counters().adv_skipped, 1);
        assert!(dnssd.hosts().is_empty());
    }

    #[test]
    fn test_advertisement_waits_for_every_request_id() {
        let dnssd = MemoryDnssd::new();
        let mut registry = Registry::new();
        let mut proxy = running_proxy(&dnssd, &mut registry);
        let now = Instant::now();

        proxy.advertise(host(1234, now), metadata(1, now), &mut registry, now);

        // Host key, host, service key, service
        let pending = dnssd.take_pending();
        assert_eq!(pending.len(), 4);
        assert_eq!(dnssd.hosts().len(), 1);
        assert_eq!(dnssd.services().len(), 1);
        assert_eq!(dnssd.keys().len(), 2);

        for id in &pending[..3] {
            proxy.handle_registered(*id, Ok(()), &mut registry);
        }
        proxy.run_tasklet(&registry);
        assert!(proxy.take_completed().is_empty());
        assert_eq!(proxy.outstanding(), 1);

        proxy.handle_registered(pending[3], Ok(()), &mut registry);
        assert!(proxy.has_pending_work());
        proxy.run_tasklet(&registry);

        let completed = proxy.take_completed();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].result, Ok(()));
        assert!(completed[0].host.adv.registered);
        assert!(completed[0].host.services[0].adv.registered);
        assert_eq!(proxy.outstanding(), 0);
        assert_eq!(proxy.counters().adv_successful, 1);
    }

    #[test]
    fn test_backend_failure_fails_advertisement() {
        let dnssd = MemoryDnssd::new();
        let mut registry = Registry::new();
        let mut proxy = running_proxy(&dnssd, &mut registry);
        let now = Instant::now();

        proxy.advertise(host(1234, now), metadata(1, now), &mut registry, now);

        let pending = dnssd.take_pending();
        proxy.handle_registered(pending[1], Err(UpdateError::Duplicated), &mut registry);
        for id in [pending[0], pending[2], pending[3]] {
            proxy.handle_registered(id, Ok(()), &mut registry);
        }
        proxy.run_tasklet(&registry);

        let completed = proxy.take_completed();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].result, Err(UpdateError::Duplicated));
        assert_eq!(proxy.counters().adv_rejected, 1);
    }

    #[test]
    fn test_unknown_request_id_is_ignored() {
        let dnssd = MemoryDnssd::new();
        let mut registry = Registry::new();
        let mut proxy = running_proxy(&dnssd, &mut registry);

        proxy.handle_registered(RequestId::new(99).unwrap(), Ok(()), &mut registry);
        assert!(!proxy.has_pending_work());
        assert!(proxy.take_completed().is_empty());
    }

    #[test]
    fn test_newer_advertisement_completes_after_older_one() {
        let dnssd = MemoryDnssd::new();
        let mut registry = Registry::new();
        let mut proxy = running_proxy(&dnssd, &mut registry);
        let now = Instant::now();

        proxy.advertise(host(1234, now), metadata(1, now), &mut registry, now);
        proxy.advertise(host(4321, now), metadata(2, now), &mut registry, now);

        assert_eq!(proxy.outstanding(), 2);
        assert_eq!(proxy.counters().adv_replaced, 1);
        // Only the changed service needs a new registration.
        assert_eq!(dnssd.take_pending().len(), 5);
        assert_eq!(dnssd.services()[0].port, 4321);

        for raw in (1..=5).rev() {
            proxy.handle_registered(RequestId::new(raw).unwrap(), Ok(()), &mut registry);
        }
        proxy.run_tasklet(&registry);

        let completed = proxy.take_completed();
        let order: Vec<u16> = completed
            .iter()
            .map(|completion| completion.metadata.header.id())
            .collect();
        assert_eq!(order, vec![1, 2]);
        assert!(completed.iter().all(|completion| completion.result.is_ok()));
    }

    #[test]
    fn test_advertisement_timeout() {
        let dnssd = MemoryDnssd::new();
        let mut registry = Registry::new();
        let mut proxy = running_proxy(&dnssd, &mut registry);
        let now = Instant::now();
        let later = now + Duration::from_secs(1);

        proxy.advertise(host(1234, now), metadata(1, now), &mut registry, now);
        proxy.advertise(host(4321, later), metadata(2, later), &mut registry, later);
        assert_eq!(proxy.next_deadline(), Some(now + Duration::from_secs(10)));

        proxy.handle_timer(now + Duration::from_secs(10), &registry);

        let completed = proxy.take_completed();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].metadata.header.id(), 1);
        assert_eq!(completed[0].result, Err(UpdateError::ResponseTimeout));
        assert_eq!(proxy.counters().adv_timeout, 1);

        answer_all(&mut proxy, &dnssd, &mut registry);

        let completed = proxy.take_completed();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].metadata.header.id(), 2);
        assert_eq!(completed[0].result, Ok(()));
    }

    #[test]
    fn test_host_removal_aborts_outstanding_advertisement() {
        let dnssd = MemoryDnssd::new();
        let mut registry = Registry::new();
        let mut proxy = running_proxy(&dnssd, &mut registry);
        let now = Instant::now();

        proxy.advertise(host(1234, now), metadata(1, now), &mut registry, now);
        answer_all(&mut proxy, &dnssd, &mut registry);
        let committed = proxy.take_completed().remove(0).host;
        registry.insert(committed);

        proxy.advertise(host(4321, now), metadata(2, now), &mut registry, now);
        assert_eq!(dnssd.take_pending().len(), 1);

        let existing = registry.find_host_mut(HOST_NAME).unwrap();
        existing.mark_deleted(true);
        proxy.advertise_removal_of_host(existing);
        proxy.run_tasklet(&registry);

        let completed = proxy.take_completed();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].metadata.header.id(), 2);
        assert_eq!(completed[0].result, Err(UpdateError::Abort));

        assert!(dnssd.hosts().is_empty());
        assert!(dnssd.services().is_empty());
        // Name retained: keys stay registered.
        assert_eq!(dnssd.keys().len(), 2);
        assert_eq!(proxy.counters().adv_host_removals, 1);
    }

    #[test]
    fn test_stop_aborts_and_unregisters() {
        let dnssd = MemoryDnssd::new();
        let mut registry = Registry::new();
        let mut proxy = running_proxy(&dnssd, &mut registry);
        let now = Instant::now();

        proxy.advertise(host(1234, now), metadata(1, now), &mut registry, now);
        assert_eq!(dnssd.hosts().len(), 1);

        proxy.update_state(false, &mut registry);

        assert_eq!(proxy.state(), ProxyState::Stopped);
        let completed = proxy.take_completed();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].result, Err(UpdateError::Abort));
        assert!(dnssd.hosts().is_empty());
        assert!(dnssd.services().is_empty());
        assert_eq!(proxy.next_deadline(), None);

        // Late completions are ignored once stopped.
        answer_all(&mut proxy, &dnssd, &mut registry);
        assert!(proxy.take_completed().is_empty());
    }

    #[test]
    fn test_start_readvertises_committed_hosts() {
        let dnssd = MemoryDnssd::new();
        let mut registry = Registry::new();
        let now = Instant::now();
        registry.insert(host(1234, now));

        dnssd.set_ready(false);
        let mut proxy = AdvertisingProxy::new(
            Box::new(dnssd.clone()),
            "default.service.arpa.",
            &ProxyConfig::default(),
        );
        proxy.set_infra_link_running(true);
        proxy.update_state(true, &mut registry);
        assert!(!proxy.is_running());

        dnssd.set_ready(true);
        proxy.update_state(true, &mut registry);

        assert!(proxy.is_running());
        assert_eq!(dnssd.host("foo").map(|info| info.addresses.len()), Some(1));
        assert_eq!(dnssd.take_pending().len(), 4);
    }
}
