// # srpd - SRP Daemon
//
// Thin integration layer around srp-core. All SRP logic lives in the core
// crate; this binary only:
// 1. Reads configuration from environment variables
// 2. Initializes tracing and the runtime
// 3. Wires the settings store, DNS-SD backend and run loop together
// 4. Handles SIGTERM/SIGINT
//
// ## Configuration
//
// ### Server
// - `SRP_DOMAIN`: Served domain (default `default.service.arpa.`)
// - `SRP_ADDRESS_MODE`: `unicast` or `anycast` (default `unicast`)
// - `SRP_ANYCAST_SEQ`: Anycast sequence number (anycast mode only)
// - `SRP_LISTEN_ADDR`: Address the UDP socket binds to (default `::`)
//
// ### Leases (seconds)
// - `SRP_MIN_LEASE`, `SRP_MAX_LEASE`
// - `SRP_MIN_KEY_LEASE`, `SRP_MAX_KEY_LEASE`
// - `SRP_MIN_TTL`, `SRP_MAX_TTL`
//
// ### Advertising proxy
// - `SRP_DNSSD`: DNS-SD backend, `memory` or `mdns` (default `memory`)
// - `SRP_ADV_TIMEOUT_MS`: Advertisement timeout in milliseconds
//
// ### Settings store
// - `SRP_SETTINGS_STORE_TYPE`: `file` or `memory` (default `file`)
// - `SRP_SETTINGS_STORE_PATH`: Path to the settings file (for file store)
//
// - `SRP_LOG_LEVEL`: trace, debug, info, warn or error (default `info`)
//
// ## Example
//
// ```bash
// export SRP_DNSSD=mdns
// export SRP_SETTINGS_STORE_PATH=/var/lib/srp/settings.json
//
// srpd
// ```

use anyhow::{Context, Result};
use srp_core::config::{AddressMode, LeaseConfig, ServerConfig, TtlConfig};
use srp_core::engine::{PlatformEvent, completion_channel};
use srp_core::{
    DnssdPublisher, EngineEvent, FileSettingsStore, LocalNetData, MemoryDnssd,
    MemorySettingsStore, Server, SettingsStore, SrpEngine,
};
use std::env;
use std::net::IpAddr;
use std::process::ExitCode;
use std::str::FromStr;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes, following systemd conventions
#[derive(Debug, Clone, Copy)]
enum SrpExitCode {
    /// Clean shutdown
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error
    RuntimeError = 2,
}

impl From<SrpExitCode> for ExitCode {
    fn from(code: SrpExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Daemon configuration
struct Config {
    domain: Option<String>,
    address_mode: String,
    anycast_seq: Option<u8>,
    listen_addr: IpAddr,
    min_lease: Option<u32>,
    max_lease: Option<u32>,
    min_key_lease: Option<u32>,
    max_key_lease: Option<u32>,
    min_ttl: Option<u32>,
    max_ttl: Option<u32>,
    adv_timeout_ms: Option<u64>,
    settings_store_type: String,
    settings_store_path: Option<String>,
    dnssd: String,
    log_level: String,
}

/// Parse an optional numeric variable; an unparsable value is an error
fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{} has an invalid value '{}'", name, value)),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            domain: env::var("SRP_DOMAIN").ok(),
            address_mode: env::var("SRP_ADDRESS_MODE").unwrap_or_else(|_| "unicast".to_string()),
            anycast_seq: parse_var("SRP_ANYCAST_SEQ")?,
            listen_addr: parse_var("SRP_LISTEN_ADDR")?
                .unwrap_or(IpAddr::from(std::net::Ipv6Addr::UNSPECIFIED)),
            min_lease: parse_var("SRP_MIN_LEASE")?,
            max_lease: parse_var("SRP_MAX_LEASE")?,
            min_key_lease: parse_var("SRP_MIN_KEY_LEASE")?,
            max_key_lease: parse_var("SRP_MAX_KEY_LEASE")?,
            min_ttl: parse_var("SRP_MIN_TTL")?,
            max_ttl: parse_var("SRP_MAX_TTL")?,
            adv_timeout_ms: parse_var("SRP_ADV_TIMEOUT_MS")?,
            settings_store_type: env::var("SRP_SETTINGS_STORE_TYPE")
                .unwrap_or_else(|_| "file".to_string()),
            settings_store_path: env::var("SRP_SETTINGS_STORE_PATH").ok(),
            dnssd: env::var("SRP_DNSSD").unwrap_or_else(|_| "memory".to_string()),
            log_level: env::var("SRP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the daemon-level settings
    ///
    /// Lease, TTL and domain rules are checked by the server configuration.
    fn validate(&self) -> Result<()> {
        match self.address_mode.as_str() {
            "unicast" => {
                if self.anycast_seq.is_some() {
                    anyhow::bail!("SRP_ANYCAST_SEQ is only valid with SRP_ADDRESS_MODE=anycast");
                }
            }
            "anycast" => {
                if self.anycast_seq.is_none() {
                    anyhow::bail!(
                        "SRP_ANYCAST_SEQ is required when SRP_ADDRESS_MODE=anycast. \
                        Set it via: export SRP_ANYCAST_SEQ=1"
                    );
                }
            }
            other => anyhow::bail!(
                "SRP_ADDRESS_MODE '{}' is not supported. Supported modes: unicast, anycast",
                other
            ),
        }

        match self.settings_store_type.as_str() {
            "file" => match self.settings_store_path.as_deref() {
                Some("") => anyhow::bail!(
                    "SRP_SETTINGS_STORE_PATH cannot be empty when SRP_SETTINGS_STORE_TYPE=file"
                ),
                Some(_) => {}
                None => anyhow::bail!(
                    "SRP_SETTINGS_STORE_PATH is required when SRP_SETTINGS_STORE_TYPE=file. \
                    Set it via: export SRP_SETTINGS_STORE_PATH=/var/lib/srp/settings.json"
                ),
            },
            "memory" => {}
            other => anyhow::bail!(
                "SRP_SETTINGS_STORE_TYPE '{}' is not supported. Supported types: file, memory",
                other
            ),
        }

        match self.dnssd.as_str() {
            "memory" => {}
            "mdns" if cfg!(feature = "mdns") => {}
            "mdns" => anyhow::bail!("SRP_DNSSD=mdns requires srpd built with the 'mdns' feature"),
            other => anyhow::bail!(
                "SRP_DNSSD '{}' is not supported. Supported backends: memory, mdns",
                other
            ),
        }

        self.log_level()?;
        self.server_config()?;

        Ok(())
    }

    fn log_level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "SRP_LOG_LEVEL '{}' is not valid. Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }

    /// Server configuration, unset variables keeping the defaults
    fn server_config(&self) -> Result<ServerConfig> {
        let mut config = ServerConfig::new();

        if let Some(domain) = &self.domain {
            config = config.with_domain(domain.clone());
        }

        if let Some(sequence_number) = self.anycast_seq {
            config = config.with_address_mode(AddressMode::Anycast { sequence_number });
        }

        let lease = LeaseConfig::default();
        config = config.with_lease(LeaseConfig::new(
            self.min_lease.unwrap_or(lease.min_lease),
            self.max_lease.unwrap_or(lease.max_lease),
            self.min_key_lease.unwrap_or(lease.min_key_lease),
            self.max_key_lease.unwrap_or(lease.max_key_lease),
        ));

        let ttl = TtlConfig::default();
        config = config.with_ttl(TtlConfig::new(
            self.min_ttl.unwrap_or(ttl.min_ttl),
            self.max_ttl.unwrap_or(ttl.max_ttl),
        ));

        if let Some(timeout_ms) = self.adv_timeout_ms {
            config = config.with_advertisement_timeout_ms(timeout_ms);
        }

        config.validate().context("Invalid server configuration")?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return SrpExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return SrpExitCode::ConfigError.into();
    }

    let log_level = config.log_level().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return SrpExitCode::ConfigError.into();
    }

    info!("Starting srpd daemon");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return SrpExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match run_daemon(config).await {
            Ok(()) => SrpExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                SrpExitCode::RuntimeError
            }
        }
    })
    .into()
}

/// Run the daemon until a shutdown signal arrives
async fn run_daemon(config: Config) -> Result<()> {
    let server_config = config.server_config()?;

    let settings: Box<dyn SettingsStore> = match config.settings_store_type.as_str() {
        "file" => {
            let path = config
                .settings_store_path
                .as_deref()
                .context("SRP_SETTINGS_STORE_PATH is not set")?;
            info!("Settings stored in {}", path);
            Box::new(FileSettingsStore::new(path).await?)
        }
        _ => {
            warn!("Settings are not persisted; the port resets on restart");
            Box::new(MemorySettingsStore::new())
        }
    };

    let (completion_tx, completion_rx) = completion_channel();
    let (platform_tx, platform_rx) = mpsc::unbounded_channel();

    let dnssd: Box<dyn DnssdPublisher> = match config.dnssd.as_str() {
        #[cfg(feature = "mdns")]
        "mdns" => Box::new(srp_dnssd_mdns::MdnsDnssd::new(completion_tx)?),
        _ => Box::new(MemoryDnssd::new().with_completions(completion_tx)),
    };
    info!("DNS-SD backend: {}", dnssd.name());

    let server = Server::new(
        server_config,
        dnssd,
        Box::new(LocalNetData::new(platform_tx.clone())),
    )?;

    // Standalone: the infrastructure link is the host's own network.
    platform_tx
        .send(PlatformEvent::InfraLinkRunning(true))
        .context("Platform event channel closed")?;

    let (mut engine, mut events) = SrpEngine::new(
        server,
        settings,
        completion_rx,
        Box::pin(UnboundedReceiverStream::new(platform_rx)),
        config.listen_addr,
    )?;

    let event_logger = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            log_event(&event);
        }
    });

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let signals = tokio::spawn(async move {
        match wait_for_shutdown().await {
            Ok(signal) => info!("Received shutdown signal: {}", signal),
            Err(e) => error!("Signal handling failed, shutting down: {:#}", e),
        }
        let _ = shutdown_tx.send(());
    });

    let result = engine.run_with_shutdown(Some(shutdown_rx)).await;

    signals.abort();
    drop(engine);
    if let Err(e) = event_logger.await {
        warn!("Event logger ended abnormally: {}", e);
    }

    result?;
    info!("srpd stopped");
    Ok(())
}

fn log_event(event: &EngineEvent) {
    match event {
        EngineEvent::Started { domain } => info!("Serving domain {}", domain),
        EngineEvent::StateChanged { state, port } => info!("Server {:?} on port {}", state, port),
        EngineEvent::UpdateCommitted {
            host_name,
            message_id,
        } => info!("Registered {} (update {})", host_name, message_id),
        EngineEvent::UpdateRejected {
            host_name,
            message_id,
            error,
        } => warn!("Rejected {} (update {}): {}", host_name, message_id, error),
        EngineEvent::HostRemoved {
            host_name,
            name_retained,
        } => info!(
            "Removed {}{}",
            host_name,
            if *name_retained { " (name retained)" } else { "" }
        ),
        EngineEvent::Stopped { reason } => info!("Engine stopped: {}", reason),
    }
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for Ctrl-C
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
