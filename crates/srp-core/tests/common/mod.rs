//! Test doubles and common utilities for contract tests
//!
//! The server is driven directly (no sockets, no clock): tests pass `now`
//! explicitly and inspect the responses queued for the client.

#![allow(dead_code)]

use srp_core::config::ServerConfig;
use srp_core::registry::Host;
use srp_core::server::Server;
use srp_core::traits::{NetDataPublisher, PublisherEvent, UpdateHandler, UpdateId};
use srp_core::wire::builder::{ServiceSpec, SrpClientKey, UpdateBuilder};
use srp_core::wire::response::Response;
use srp_core::{MemoryDnssd, ResponseCode};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const DOMAIN: &str = "default.service.arpa.";

/// Network Data publisher that only counts calls
#[derive(Clone, Default)]
pub struct CountingNetData {
    publish_count: Arc<AtomicUsize>,
    unpublish_count: Arc<AtomicUsize>,
}

impl CountingNetData {
    pub fn publish_count(&self) -> usize {
        self.publish_count.load(Ordering::SeqCst)
    }

    pub fn unpublish_count(&self) -> usize {
        self.unpublish_count.load(Ordering::SeqCst)
    }
}

impl NetDataPublisher for CountingNetData {
    fn publish_unicast(&mut self, _port: u16) {
        self.publish_count.fetch_add(1, Ordering::SeqCst);
    }

    fn publish_anycast(&mut self, _sequence_number: u8) {
        self.publish_count.fetch_add(1, Ordering::SeqCst);
    }

    fn unpublish(&mut self) {
        self.unpublish_count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Update handler recording every update it is handed
pub struct RecordingHandler {
    updates: Arc<Mutex<Vec<(UpdateId, Host)>>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self {
            updates: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a handler that records into the same list as `other`
    pub fn sharing_state_with(other: &Self) -> Self {
        Self {
            updates: Arc::clone(&other.updates),
        }
    }

    pub fn updates(&self) -> Vec<(UpdateId, Host)> {
        self.updates.lock().unwrap().clone()
    }

    /// Id of the update for `host_label`, most recent first
    pub fn id_for(&self, host_label: &str) -> UpdateId {
        let full_name = format!("{}.{}", host_label, DOMAIN);
        self.updates
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(_, host)| host.full_name() == full_name)
            .map(|(id, _)| *id)
            .expect("update handed to handler")
    }
}

impl UpdateHandler for RecordingHandler {
    fn handle_update(&mut self, id: UpdateId, host: &Host, _timeout: Duration) {
        self.updates.lock().unwrap().push((id, host.clone()));
    }
}

/// Server with a memory backend, enabled and running
pub struct Harness {
    pub server: Server,
    pub dnssd: MemoryDnssd,
    pub net_data: CountingNetData,
    pub now: Instant,
}

impl Harness {
    /// Running server whose advertising proxy stays stopped
    pub fn new() -> Self {
        Self::with_config(ServerConfig::new())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        let dnssd = MemoryDnssd::new();
        let net_data = CountingNetData::default();
        let mut server = Server::new(config, Box::new(dnssd.clone()), Box::new(net_data.clone()))
            .expect("valid config");
        let now = Instant::now();

        server.set_enabled(true);
        server.handle_publisher_event(PublisherEvent::EntryAdded, now);
        server.take_notices();

        Self {
            server,
            dnssd,
            net_data,
            now,
        }
    }

    /// Running server with the advertising proxy running too
    pub fn with_proxy() -> Self {
        let mut harness = Self::new();
        harness.server.set_infra_link_running(true, harness.now);
        assert!(harness.server.proxy().is_running());
        harness
    }

    /// Move the clock forward
    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }

    /// Fire the timers due now
    pub fn fire_timers(&mut self) {
        self.server.process_timers(self.now);
    }

    pub fn send(&mut self, message: &[u8]) {
        let _ = self.server.handle_message(message, client_addr(), self.now);
    }

    /// Answer every backend request issued so far
    pub fn complete_registrations(&mut self) -> usize {
        let pending = self.dnssd.take_pending();
        for id in &pending {
            self.server.handle_registered(*id, Ok(()), self.now);
        }
        pending.len()
    }

    /// Responses queued since the last call
    pub fn responses(&mut self) -> Vec<Response> {
        self.server
            .take_transmits()
            .into_iter()
            .map(|transmit| Response::parse(&transmit.payload).expect("well-formed response"))
            .collect()
    }

    /// The single response queued since the last call
    pub fn response(&mut self) -> Response {
        let mut responses = self.responses();
        assert_eq!(responses.len(), 1, "expected one response, got {:?}", responses);
        responses.remove(0)
    }

    pub fn host(&self, host_label: &str) -> Option<&Host> {
        self.server.find_host(&format!("{}.{}", host_label, DOMAIN))
    }
}

pub fn client_addr() -> SocketAddr {
    "[fd00::2]:49152".parse().unwrap()
}

/// Registration of host `host_label` with one `_test._udp` service
pub fn registration(host_label: &str, message_id: u16) -> UpdateBuilder {
    UpdateBuilder::new(DOMAIN, host_label)
        .message_id(message_id)
        .address("fd00::1".parse().unwrap())
        .service(ServiceSpec::new("inst", "_test._udp").port(1234).txt_entry("k=v"))
}

pub fn build(builder: UpdateBuilder, key: &SrpClientKey) -> Vec<u8> {
    builder.build(key).expect("update builds")
}

pub fn new_key() -> SrpClientKey {
    SrpClientKey::generate().expect("key generation")
}

pub fn assert_rcode(response: &Response, expected: ResponseCode) {
    assert_eq!(
        response.response_code(),
        Some(expected),
        "response {:?}",
        response
    );
}
