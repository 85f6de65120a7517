// # srp-core
//
// Core library for the Service Registration Protocol (SRP) server.
//
// ## Architecture Overview
//
// - **Server**: Receives DNS Update messages, validates them, delegates
//   them and commits the accepted registrations
// - **Registry**: Committed hosts and their services, with lease tracking
// - **AdvertisingProxy**: Mirrors registrations onto a DNS-SD backend
// - **DnssdPublisher / UpdateHandler / NetDataPublisher**: Collaborator
//   traits the server is wired to
// - **SettingsStore**: Persists the port across restarts
// - **SrpEngine**: tokio run loop driving a server from sockets, channels
//   and timers
//
// ## Design Principles
//
// 1. **Sans-I/O core**: `Server` and `AdvertisingProxy` never touch a socket
//    or a clock; the engine feeds them and drains their output
// 2. **Single owner**: the registry owns every host; hosts own services
// 3. **Library-first**: the daemon is a thin shell around this crate

pub mod config;
pub mod dnssd;
pub mod engine;
pub mod error;
pub mod lease;
pub mod proxy;
pub mod registry;
pub mod server;
pub mod state;
pub mod traits;
pub mod wire;

// Re-export core types for convenience
pub use config::{AddressMode, EngineConfig, LeaseConfig, ProxyConfig, ServerConfig, TtlConfig};
pub use dnssd::MemoryDnssd;
pub use engine::{Completion, CompletionSender, EngineEvent, LocalNetData, PlatformEvent, SrpEngine};
pub use error::{Error, ResponseCode, Result, UpdateError, UpdateResult};
pub use proxy::{AdvertisingProxy, ProxyState};
pub use registry::{EntryState, Host, Registry, Service};
pub use server::{Server, ServerNotice, ServerState};
pub use state::{FileSettingsStore, MemorySettingsStore};
pub use traits::{DnssdPublisher, NetDataPublisher, SettingsStore, UpdateHandler};
