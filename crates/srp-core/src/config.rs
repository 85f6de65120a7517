//! Configuration types for the SRP server
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};

pub use crate::lease::{LeaseConfig, TtlConfig};

/// Longest domain name accepted, including the trailing dot
const MAX_DOMAIN_LEN: usize = 254;

/// Main SRP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Domain served, e.g. `default.service.arpa.`
    #[serde(default = "default_domain")]
    pub domain: String,

    /// How the server publishes its address in Network Data
    #[serde(default)]
    pub address_mode: AddressMode,

    /// TTL bounds
    #[serde(default)]
    pub ttl: TtlConfig,

    /// Lease bounds
    #[serde(default)]
    pub lease: LeaseConfig,

    /// How long an external update handler may take before the update
    /// is committed with a timeout error (in milliseconds)
    #[serde(default = "default_update_handler_timeout_ms")]
    pub update_handler_timeout_ms: u64,

    /// Advertising proxy settings
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Run loop settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl ServerConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            domain: default_domain(),
            address_mode: AddressMode::default(),
            ttl: TtlConfig::default(),
            lease: LeaseConfig::default(),
            update_handler_timeout_ms: default_update_handler_timeout_ms(),
            proxy: ProxyConfig::default(),
            engine: EngineConfig::default(),
        }
    }

    /// Set the served domain
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Set the address mode
    pub fn with_address_mode(mut self, address_mode: AddressMode) -> Self {
        self.address_mode = address_mode;
        self
    }

    /// Set the TTL bounds
    pub fn with_ttl(mut self, ttl: TtlConfig) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the lease bounds
    pub fn with_lease(mut self, lease: LeaseConfig) -> Self {
        self.lease = lease;
        self
    }

    /// Set the advertisement timeout
    pub fn with_advertisement_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.proxy.advertisement_timeout_ms = timeout_ms;
        self
    }

    /// Set the update handler timeout
    pub fn with_update_handler_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.update_handler_timeout_ms = timeout_ms;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        normalize_domain(&self.domain)?;
        self.ttl.validate()?;
        self.lease.validate()?;

        if self.update_handler_timeout_ms == 0 {
            return Err(crate::Error::config("Update handler timeout must be > 0"));
        }

        self.proxy.validate()?;
        self.engine.validate()?;

        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Network Data address mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AddressMode {
    /// Publish the server's unicast address and port
    #[default]
    Unicast,

    /// Publish an anycast entry with a sequence number; listens on port 53
    Anycast {
        /// Anycast sequence number
        sequence_number: u8,
    },
}

impl AddressMode {
    /// Get the mode name
    pub fn type_name(&self) -> &'static str {
        match self {
            AddressMode::Unicast => "unicast",
            AddressMode::Anycast { .. } => "anycast",
        }
    }
}

/// Advertising proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Maximum time an advertisement may stay outstanding (in milliseconds)
    #[serde(default = "default_advertisement_timeout_ms")]
    pub advertisement_timeout_ms: u64,
}

impl ProxyConfig {
    /// Validate the proxy configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.advertisement_timeout_ms == 0 {
            return Err(crate::Error::config("Advertisement timeout must be > 0"));
        }
        Ok(())
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            advertisement_timeout_ms: default_advertisement_timeout_ms(),
        }
    }
}

/// Run loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped (with a warning log).
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Largest UDP payload read from the socket
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        if self.max_message_size < crate::wire::HEADER_LEN {
            return Err(crate::Error::config(
                "Max message size must hold at least a DNS header",
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
            max_message_size: default_max_message_size(),
        }
    }
}

/// Normalise a domain to lower case with a trailing dot
pub fn normalize_domain(domain: &str) -> Result<String, crate::Error> {
    let trimmed = domain.trim();

    if trimmed.is_empty() || trimmed == "." {
        return Err(crate::Error::config("Domain cannot be empty"));
    }

    let mut normalized = trimmed.to_ascii_lowercase();
    if !normalized.ends_with('.') {
        normalized.push('.');
    }

    if normalized.len() > MAX_DOMAIN_LEN {
        return Err(crate::Error::config(format!(
            "Domain too long: {} bytes (max {})",
            normalized.len(),
            MAX_DOMAIN_LEN
        )));
    }

    if normalized[..normalized.len() - 1].split('.').any(str::is_empty) {
        return Err(crate::Error::config(format!(
            "Domain has an empty label: '{}'",
            domain
        )));
    }

    Ok(normalized)
}

fn default_domain() -> String {
    "default.service.arpa.".to_string()
}

fn default_update_handler_timeout_ms() -> u64 {
    12_200
}

fn default_advertisement_timeout_ms() -> u64 {
    10_000
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_max_message_size() -> usize {
    1232
}
