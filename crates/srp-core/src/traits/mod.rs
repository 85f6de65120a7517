//! Collaborator interfaces of the SRP server
//!
//! - [`DnssdPublisher`]: Register hosts, services and keys with DNS-SD
//! - [`UpdateHandler`]: External hook that accepts or rejects updates
//! - [`NetDataPublisher`]: Publish the server in Network Data
//! - [`SettingsStore`]: Persist the server port across restarts

pub mod dnssd;
pub mod net_data;
pub mod settings_store;
pub mod update_handler;

pub use dnssd::{DnssdPublisher, HostInfo, KeyInfo, ServiceInfo};
pub use net_data::{NetDataPublisher, PublisherEvent};
pub use settings_store::{ServerInfo, SettingsStore};
pub use update_handler::{UpdateHandler, UpdateId};
