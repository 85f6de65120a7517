// # Memory DNS-SD Backend
//
// Keeps registered hosts, services and keys in tables. When built with a
// completion sender every registration is reported successful right away
// through the engine's completion channel; without one the request ids
// are queued and the caller answers them (tests use this to control
// completion order).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use crate::engine::{Completion, CompletionSender};
use crate::registry::RequestId;
use crate::traits::{DnssdPublisher, HostInfo, KeyInfo, ServiceInfo};

#[derive(Debug, Default)]
struct Tables {
    hosts: HashMap<String, HostInfo>,
    services: HashMap<String, ServiceInfo>,
    keys: HashMap<String, KeyInfo>,
    pending: Vec<RequestId>,
}

/// In-memory DNS-SD backend
///
/// Clones share their tables.
#[derive(Debug, Clone)]
pub struct MemoryDnssd {
    tables: Arc<Mutex<Tables>>,
    ready: Arc<AtomicBool>,
    completions: Option<CompletionSender>,
}

impl MemoryDnssd {
    /// Backend that is ready and leaves completion to the caller
    pub fn new() -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            ready: Arc::new(AtomicBool::new(true)),
            completions: None,
        }
    }

    /// Report every registration as successful through `sender`
    pub fn with_completions(mut self, sender: CompletionSender) -> Self {
        self.completions = Some(sender);
        self
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn hosts(&self) -> Vec<HostInfo> {
        self.lock().hosts.values().cloned().collect()
    }

    pub fn host(&self, host_name: &str) -> Option<HostInfo> {
        self.lock().hosts.get(&host_name.to_ascii_lowercase()).cloned()
    }

    pub fn services(&self) -> Vec<ServiceInfo> {
        self.lock().services.values().cloned().collect()
    }

    pub fn keys(&self) -> Vec<KeyInfo> {
        self.lock().keys.values().cloned().collect()
    }

    /// Request ids not yet reported through a completion sender
    pub fn take_pending(&self) -> Vec<RequestId> {
        std::mem::take(&mut self.lock().pending)
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete(&self, id: RequestId) {
        if let Some(sender) = &self.completions
            && sender
                .send(Completion::Registered { id, result: Ok(()) })
                .is_ok()
        {
            return;
        }

        self.lock().pending.push(id);
    }
}

impl Default for MemoryDnssd {
    fn default() -> Self {
        Self::new()
    }
}

fn service_key(instance: &str, service_type: &str) -> String {
    format!("{}.{}", instance, service_type).to_ascii_lowercase()
}

fn key_key(info: &KeyInfo) -> String {
    match &info.service_type {
        Some(service_type) => service_key(&info.name, service_type),
        None => info.name.to_ascii_lowercase(),
    }
}

impl DnssdPublisher for MemoryDnssd {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn register_host(&mut self, info: &HostInfo, id: RequestId) {
        trace!("memory: register host {} ({})", info.host_name, id);
        self.lock()
            .hosts
            .insert(info.host_name.to_ascii_lowercase(), info.clone());
        self.complete(id);
    }

    fn unregister_host(&mut self, info: &HostInfo) {
        trace!("memory: unregister host {}", info.host_name);
        self.lock().hosts.remove(&info.host_name.to_ascii_lowercase());
    }

    fn register_service(&mut self, info: &ServiceInfo, id: RequestId) {
        trace!(
            "memory: register service {}.{} ({})",
            info.service_instance, info.service_type, id
        );
        self.lock().services.insert(
            service_key(&info.service_instance, &info.service_type),
            info.clone(),
        );
        self.complete(id);
    }

    fn unregister_service(&mut self, info: &ServiceInfo) {
        trace!(
            "memory: unregister service {}.{}",
            info.service_instance, info.service_type
        );
        self.lock()
            .services
            .remove(&service_key(&info.service_instance, &info.service_type));
    }

    fn register_key(&mut self, info: &KeyInfo, id: RequestId) {
        debug!("memory: register key {} ({})", info.name, id);
        self.lock().keys.insert(key_key(info), info.clone());
        self.complete(id);
    }

    fn unregister_key(&mut self, info: &KeyInfo) {
        debug!("memory: unregister key {}", info.name);
        self.lock().keys.remove(&key_key(info));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn host_info() -> HostInfo {
        HostInfo {
            host_name: "foo".to_string(),
            addresses: vec!["fd00::1".parse().unwrap()],
            ttl: 120,
        }
    }

    #[test]
    fn test_registrations_queue_ids_without_sender() {
        let mut dnssd = MemoryDnssd::new();
        let id = RequestId::new(7).unwrap();

        dnssd.register_host(&host_info(), id);

        assert_eq!(dnssd.host("FOO"), Some(host_info()));
        assert_eq!(dnssd.take_pending(), vec![id]);
        assert!(dnssd.take_pending().is_empty());

        dnssd.unregister_host(&host_info());
        assert!(dnssd.hosts().is_empty());
    }

    #[test]
    fn test_registrations_complete_through_sender() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut dnssd = MemoryDnssd::new().with_completions(tx);
        let id = RequestId::new(3).unwrap();

        dnssd.register_key(
            &KeyInfo {
                name: "inst".to_string(),
                service_type: Some("_test._udp".to_string()),
                key_data: vec![0; 68],
                class: 1,
                ttl: 120,
            },
            id,
        );

        assert_eq!(
            rx.try_recv().unwrap(),
            Completion::Registered { id, result: Ok(()) }
        );
        assert_eq!(dnssd.keys().len(), 1);
        assert!(dnssd.take_pending().is_empty());
    }

    #[test]
    fn test_clones_share_tables_and_readiness() {
        let dnssd = MemoryDnssd::new();
        let mut backend = dnssd.clone();

        backend.register_host(&host_info(), RequestId::new(1).unwrap());
        dnssd.set_ready(false);

        assert_eq!(dnssd.hosts().len(), 1);
        assert!(!backend.is_ready());
    }
}
