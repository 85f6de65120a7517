// # mDNS DNS-SD Backend
//
// Publishes SRP registrations on the infrastructure link through the
// `mdns-sd` responder.
//
// ## Mapping
//
// - Services map onto `ServiceDaemon::register` under `.local.`, using the
//   addresses of their host. A service whose host has no known addresses
//   yet is held back and published once the host registers them. A changed
//   host re-publishes its services.
// - Hosts and KEY records are tracked locally and completed right away:
//   `mdns-sd` publishes address records only as part of a service.
// - Only the first sub-type of a service is published.
//
// Every registration is completed synchronously through the engine's
// completion channel.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;

use mdns_sd::ServiceDaemon;
use srp_core::registry::RequestId;
use srp_core::traits::{DnssdPublisher, HostInfo, KeyInfo, ServiceInfo};
use srp_core::{Completion, CompletionSender, Error, UpdateError, UpdateResult};
use tracing::{debug, info, warn};

const LOCAL_DOMAIN: &str = "local.";

/// DNS-SD backend publishing through multicast DNS
pub struct MdnsDnssd {
    daemon: ServiceDaemon,
    completions: CompletionSender,
    hosts: HashMap<String, HostInfo>,
    /// Registered services by mDNS full name
    services: HashMap<String, ServiceInfo>,
    /// Full names currently registered with the daemon
    live: HashSet<String>,
}

impl MdnsDnssd {
    /// Start an mDNS responder on the default port
    pub fn new(completions: CompletionSender) -> Result<Self, Error> {
        let daemon = ServiceDaemon::new()
            .map_err(|e| Error::backend("mdns", format!("Failed to create mDNS daemon: {}", e)))?;

        info!("mDNS responder started");

        Ok(Self {
            daemon,
            completions,
            hosts: HashMap::new(),
            services: HashMap::new(),
            live: HashSet::new(),
        })
    }

    fn complete(&self, id: RequestId, result: UpdateResult) {
        if self
            .completions
            .send(Completion::Registered { id, result })
            .is_err()
        {
            warn!("Completion channel closed, dropping result of request {}", id);
        }
    }

    fn publish(&mut self, info: &ServiceInfo) -> UpdateResult {
        let addresses = self
            .hosts
            .get(&info.host_name.to_ascii_lowercase())
            .map(|host| host.addresses.as_slice())
            .unwrap_or_default();

        let service = to_mdns_service(info, addresses)
            .map_err(|e| UpdateError::backend(format!("invalid service: {}", e)))?;
        let Some(service) = service else {
            debug!(
                "mdns: holding back {} until host {} has addresses",
                full_name(info),
                info.host_name
            );
            return Ok(());
        };

        self.daemon
            .register(service)
            .map_err(|e| UpdateError::backend(format!("register failed: {}", e)))?;
        self.live.insert(full_name(info));
        Ok(())
    }

    /// Re-publish the services of `host_name` after its addresses changed
    fn republish_services_of(&mut self, host_name: &str) {
        let infos = self
            .services
            .values()
            .filter(|info| info.host_name.eq_ignore_ascii_case(host_name))
            .cloned()
            .collect::<Vec<_>>();

        for info in &infos {
            if let Err(e) = self.publish(info) {
                warn!(
                    "Failed to re-publish {}.{}: {}",
                    info.service_instance, info.service_type, e
                );
            }
        }
    }
}

impl DnssdPublisher for MdnsDnssd {
    fn name(&self) -> &'static str {
        "mdns"
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn register_host(&mut self, info: &HostInfo, id: RequestId) {
        debug!("mdns: register host {} ({})", info.host_name, id);

        let key = info.host_name.to_ascii_lowercase();
        let changed = self
            .hosts
            .insert(key, info.clone())
            .is_none_or(|known| known.addresses != info.addresses);

        if changed {
            self.republish_services_of(&info.host_name);
        }
        self.complete(id, Ok(()));
    }

    fn unregister_host(&mut self, info: &HostInfo) {
        debug!("mdns: unregister host {}", info.host_name);
        self.hosts.remove(&info.host_name.to_ascii_lowercase());
    }

    fn register_service(&mut self, info: &ServiceInfo, id: RequestId) {
        debug!(
            "mdns: register service {}.{} ({})",
            info.service_instance, info.service_type, id
        );

        let result = self.publish(info);
        if result.is_ok() {
            self.services.insert(full_name(info), info.clone());
        }
        self.complete(id, result);
    }

    fn unregister_service(&mut self, info: &ServiceInfo) {
        let full_name = full_name(info);
        debug!("mdns: unregister service {}", full_name);

        self.services.remove(&full_name);
        if !self.live.remove(&full_name) {
            return;
        }
        if let Err(e) = self.daemon.unregister(&full_name) {
            warn!("Failed to unregister {}: {}", full_name, e);
        }
    }

    fn register_key(&mut self, info: &KeyInfo, id: RequestId) {
        debug!("mdns: register key {} ({})", info.name, id);
        self.complete(id, Ok(()));
    }

    fn unregister_key(&mut self, info: &KeyInfo) {
        debug!("mdns: unregister key {}", info.name);
    }
}

impl Drop for MdnsDnssd {
    fn drop(&mut self) {
        if let Err(e) = self.daemon.shutdown() {
            debug!("mDNS responder shutdown failed: {}", e);
        }
    }
}

/// `_test._udp` becomes `_test._udp.local.`, with the first sub-type
/// prepended as `_s1._sub._test._udp.local.`
fn service_domain(info: &ServiceInfo) -> String {
    match info.sub_type_labels.first() {
        Some(sub_type) => format!("{}._sub.{}.{}", sub_type, info.service_type, LOCAL_DOMAIN),
        None => format!("{}.{}", info.service_type, LOCAL_DOMAIN),
    }
}

fn full_name(info: &ServiceInfo) -> String {
    format!("{}.{}.{}", info.service_instance, info.service_type, LOCAL_DOMAIN)
}

/// `None` while the host has no addresses to publish the service with
fn to_mdns_service(
    info: &ServiceInfo,
    addresses: &[std::net::Ipv6Addr],
) -> mdns_sd::Result<Option<mdns_sd::ServiceInfo>> {
    if addresses.is_empty() {
        return Ok(None);
    }

    if info.sub_type_labels.len() > 1 {
        debug!(
            "mdns: publishing only sub-type {} of {}.{}",
            info.sub_type_labels[0], info.service_instance, info.service_type
        );
    }

    let ty_domain = service_domain(info);
    let host_name = format!("{}.{}", info.host_name, LOCAL_DOMAIN);
    let properties = txt_properties(&info.txt_data);

    let addresses = addresses
        .iter()
        .map(|address| IpAddr::V6(*address).to_string())
        .collect::<Vec<_>>()
        .join(",");

    mdns_sd::ServiceInfo::new(
        &ty_domain,
        &info.service_instance,
        &host_name,
        addresses.as_str(),
        info.port,
        properties,
    )
    .map(Some)
}

/// Decode length-prefixed TXT data into key/value properties
///
/// Entries without `=` become keys with an empty value.
fn txt_properties(txt_data: &[u8]) -> HashMap<String, String> {
    let mut properties = HashMap::new();
    let mut rest = txt_data;

    while let Some((&len, tail)) = rest.split_first() {
        let len = usize::from(len).min(tail.len());
        let (entry, tail) = tail.split_at(len);
        rest = tail;

        if entry.is_empty() {
            continue;
        }

        let entry = String::from_utf8_lossy(entry);
        let (key, value) = entry.split_once('=').unwrap_or((entry.as_ref(), ""));
        properties
            .entry(key.to_string())
            .or_insert_with(|| value.to_string());
    }

    properties
}
