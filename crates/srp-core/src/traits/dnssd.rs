// # DNS-SD Publisher Trait
//
// Interface of the backend the advertising proxy mirrors registrations
// onto (an mDNS responder, a unicast DNS-SD server, ...).
//
// ## Completion
//
// Every `register_*` call carries a `RequestId`. The backend reports the
// outcome later by handing `(id, result)` back to the server
// (`Server::handle_registered`), typically through the engine's completion
// channel.
//
// Unregistration is fire-and-forget. The `unregister_*` methods take no
// `RequestId`: nothing waits on their outcome, so the server never issues
// an id for them and a backend has nothing to report back. A removal is
// answered as soon as its unregistrations are issued.
//
// ## Names
//
// Names passed to the backend are relative to the SRP domain: the host
// `foo.default.service.arpa.` is published as `foo`, the service type
// `_test._udp.default.service.arpa.` as `_test._udp`.

use std::net::Ipv6Addr;

use crate::registry::RequestId;

/// Host registration details
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    /// Host label, without the domain
    pub host_name: String,
    /// Routable addresses; empty when unregistering
    pub addresses: Vec<Ipv6Addr>,
    /// Record TTL
    pub ttl: u32,
}

/// Service registration details
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    /// Host label of the target host
    pub host_name: String,
    /// Instance label, e.g. `inst`
    pub service_instance: String,
    /// Service type without the domain, e.g. `_test._udp`
    pub service_type: String,
    /// Sub-type labels
    pub sub_type_labels: Vec<String>,
    /// Encoded TXT data
    pub txt_data: Vec<u8>,
    /// SRV port
    pub port: u16,
    /// SRV weight
    pub weight: u16,
    /// SRV priority
    pub priority: u16,
    /// Record TTL
    pub ttl: u32,
}

/// KEY record registration details
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    /// Host label or service instance label
    pub name: String,
    /// Service type for a service instance key
    pub service_type: Option<String>,
    /// KEY RDATA
    pub key_data: Vec<u8>,
    /// KEY record class
    pub class: u16,
    /// Record TTL
    pub ttl: u32,
}

/// Backend publishing SRP registrations through DNS-SD
///
/// Calls are made from the server's run loop and must not block; a
/// backend that needs I/O queues the work and reports completion later.
pub trait DnssdPublisher: Send {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Whether the backend can accept registrations
    fn is_ready(&self) -> bool;

    /// Register (or update) a host
    fn register_host(&mut self, info: &HostInfo, id: RequestId);

    /// Unregister a host
    ///
    /// Carries no request id and expects no completion.
    fn unregister_host(&mut self, info: &HostInfo);

    /// Register (or update) a service
    fn register_service(&mut self, info: &ServiceInfo, id: RequestId);

    /// Unregister a service
    ///
    /// Carries no request id and expects no completion.
    fn unregister_service(&mut self, info: &ServiceInfo);

    /// Register the KEY record reserving a name
    fn register_key(&mut self, info: &KeyInfo, id: RequestId);

    /// Unregister a KEY record
    ///
    /// Carries no request id and expects no completion.
    fn unregister_key(&mut self, info: &KeyInfo);
}
