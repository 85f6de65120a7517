//! SRP server
//!
//! The [`Server`] owns the registry and drives every update through
//! receive, validate, delegate, commit and respond. It performs no I/O:
//! inbound datagrams, backend and handler completions, platform events and
//! timer expiry are fed in by the caller (normally [`SrpEngine`]), and
//! outbound datagrams and notices are collected for the caller to drain
//! with [`Server::take_transmits`] and [`Server::take_notices`].
//!
//! ## States
//!
//! ```text
//! Disabled ──set_enabled(true)──▶ Stopped ──EntryAdded──▶ Running
//!    ▲                              ▲   ◀──EntryRemoved──┘
//!    └──────set_enabled(false)──────┴────────────────────┘
//! ```
//!
//! ## Delegation
//!
//! A validated update goes to the [`UpdateHandler`] when one is set,
//! otherwise to the [`AdvertisingProxy`] (which commits right away while it
//! is not running). Completed delegations are committed from
//! [`Server::run_deferred`], in the order they completed.
//!
//! [`SrpEngine`]: crate::engine::SrpEngine

mod commit;
mod expiry;

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{AddressMode, LeaseConfig, ServerConfig, TtlConfig, normalize_domain};
use crate::error::{Error, ResponseCode, Result, UpdateError, UpdateResult};
use crate::proxy::{AdvertisingProxy, ProxyState};
use crate::registry::adv::RequestId;
use crate::registry::{Host, Registry};
use crate::traits::{DnssdPublisher, NetDataPublisher, PublisherEvent, ServerInfo, UpdateHandler, UpdateId};
use crate::wire::update::UpdateMessage;
use crate::wire::{Header, read_header};

/// First port tried in unicast mode
pub const UDP_PORT_MIN: u16 = 53535;

/// Last port tried in unicast mode
pub const UDP_PORT_MAX: u16 = 53554;

/// Port used in anycast mode
pub const ANYCAST_PORT: u16 = 53;

/// Server state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServerState {
    Disabled,
    Stopped,
    Running,
}

/// Arrival details of one update message
#[derive(Debug, Clone)]
pub struct MessageMetadata {
    pub header: Header,
    pub peer: SocketAddr,
    pub rx_time: Instant,
    pub ttl: TtlConfig,
    pub lease: LeaseConfig,
}

/// Outbound datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmit {
    pub peer: SocketAddr,
    pub payload: Vec<u8>,
}

/// Something the caller of the server should know about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerNotice {
    StateChanged(ServerState),
    /// Persist the port the server serves on
    SaveSettings(ServerInfo),
    UpdateCommitted {
        host_name: String,
        message_id: u16,
    },
    UpdateRejected {
        host_name: String,
        message_id: u16,
        error: UpdateError,
    },
    HostRemoved {
        host_name: String,
        name_retained: bool,
    },
}

/// Responses sent, by response code
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResponseCounters {
    pub success: u32,
    pub server_failure: u32,
    pub format_error: u32,
    pub name_exists: u32,
    pub refused: u32,
}

impl ResponseCounters {
    fn count(&mut self, code: ResponseCode) {
        match code {
            ResponseCode::Success => self.success += 1,
            ResponseCode::ServerFailure => self.server_failure += 1,
            ResponseCode::FormatError => self.format_error += 1,
            ResponseCode::NameExists => self.name_exists += 1,
            ResponseCode::Refused => self.refused += 1,
        }
    }
}

/// One update waiting for the update handler
#[derive(Debug)]
struct UpdateMetadata {
    id: UpdateId,
    expire_time: Instant,
    host: Host,
    metadata: MessageMetadata,
}

pub struct Server {
    config: ServerConfig,
    state: ServerState,
    port: u16,
    saved_port: Option<u16>,
    registry: Registry,
    proxy: AdvertisingProxy,
    update_handler: Option<Box<dyn UpdateHandler>>,
    net_data: Box<dyn NetDataPublisher>,
    /// Waiting for the handler, oldest first
    outstanding: VecDeque<UpdateMetadata>,
    /// Answered or timed out, waiting to be committed
    completed_updates: VecDeque<(UpdateMetadata, UpdateResult)>,
    next_update_id: u32,
    lease_deadline: Option<Instant>,
    has_registered_any_service: bool,
    response_counters: ResponseCounters,
    transmits: Vec<Transmit>,
    notices: Vec<ServerNotice>,
}

impl Server {
    /// Create a disabled server
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `config` does not validate.
    pub fn new(
        mut config: ServerConfig,
        dnssd: Box<dyn DnssdPublisher>,
        net_data: Box<dyn NetDataPublisher>,
    ) -> Result<Self> {
        config.validate()?;
        config.domain = normalize_domain(&config.domain)?;

        let proxy = AdvertisingProxy::new(dnssd, config.domain.clone(), &config.proxy);

        Ok(Self {
            config,
            state: ServerState::Disabled,
            port: UDP_PORT_MIN,
            saved_port: None,
            registry: Registry::new(),
            proxy,
            update_handler: None,
            net_data,
            outstanding: VecDeque::new(),
            completed_updates: VecDeque::new(),
            next_update_id: 1,
            lease_deadline: None,
            has_registered_any_service: false,
            response_counters: ResponseCounters::default(),
            transmits: Vec::new(),
            notices: Vec::new(),
        })
    }

    /// Install (or remove) the update handler
    pub fn set_update_handler(&mut self, handler: Option<Box<dyn UpdateHandler>>) {
        self.update_handler = handler;
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn domain(&self) -> &str {
        &self.config.domain
    }

    pub fn address_mode(&self) -> AddressMode {
        self.config.address_mode
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn ttl_config(&self) -> TtlConfig {
        self.config.ttl
    }

    pub fn lease_config(&self) -> LeaseConfig {
        self.config.lease
    }

    /// Committed hosts, deleted ones with retained names included
    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.registry.hosts()
    }

    pub fn find_host(&self, full_name: &str) -> Option<&Host> {
        self.registry.find_host(full_name)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn response_counters(&self) -> &ResponseCounters {
        &self.response_counters
    }

    pub fn proxy(&self) -> &AdvertisingProxy {
        &self.proxy
    }

    pub fn proxy_state(&self) -> ProxyState {
        self.proxy.state()
    }

    /// Number of updates waiting for the update handler
    pub fn outstanding_updates(&self) -> usize {
        self.outstanding.len()
    }

    /// Change the domain; only while disabled
    pub fn set_domain(&mut self, domain: &str) -> Result<()> {
        self.ensure_disabled("domain")?;

        self.config.domain = normalize_domain(domain)?;
        self.proxy.set_domain(&self.config.domain);
        info!("Domain set to {}", self.config.domain);
        Ok(())
    }

    /// Change the address mode; only while disabled
    pub fn set_address_mode(&mut self, address_mode: AddressMode) -> Result<()> {
        self.ensure_disabled("address mode")?;

        if self.config.address_mode != address_mode {
            info!(
                "Address mode: {} -> {}",
                self.config.address_mode.type_name(),
                address_mode.type_name()
            );
            self.config.address_mode = address_mode;
        }
        Ok(())
    }

    pub fn set_ttl_config(&mut self, ttl: TtlConfig) -> Result<()> {
        ttl.validate()?;
        self.config.ttl = ttl;
        Ok(())
    }

    pub fn set_lease_config(&mut self, lease: LeaseConfig) -> Result<()> {
        lease.validate()?;
        self.config.lease = lease;
        Ok(())
    }

    fn ensure_disabled(&self, what: &str) -> Result<()> {
        if self.state != ServerState::Disabled {
            return Err(Error::invalid_state(format!(
                "{} can only change while the server is disabled",
                what
            )));
        }
        Ok(())
    }

    /// Seed the port selection with previously saved settings
    pub fn restore_settings(&mut self, info: Option<ServerInfo>) {
        self.saved_port = info.map(|info| info.port);
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled {
            self.enable();
        } else {
            self.disable();
        }
    }

    fn enable(&mut self) {
        if self.state != ServerState::Disabled {
            return;
        }

        self.set_state(ServerState::Stopped);

        match self.config.address_mode {
            AddressMode::Unicast => {
                self.select_port();
                self.net_data.publish_unicast(self.port);
            }
            AddressMode::Anycast { sequence_number } => {
                self.port = ANYCAST_PORT;
                self.net_data.publish_anycast(sequence_number);
            }
        }
    }

    fn disable(&mut self) {
        if self.state == ServerState::Disabled {
            return;
        }

        self.net_data.unpublish();
        self.stop();
        self.set_state(ServerState::Disabled);
    }

    fn select_port(&mut self) {
        self.port = match self.saved_port {
            Some(saved) => match saved.checked_add(1) {
                Some(port) if (UDP_PORT_MIN..=UDP_PORT_MAX).contains(&port) => port,
                _ => UDP_PORT_MIN,
            },
            None => UDP_PORT_MIN,
        };

        debug!("Selected port {}", self.port);
    }

    /// Network Data entry added or removed
    pub fn handle_publisher_event(&mut self, event: PublisherEvent, now: Instant) {
        match event {
            PublisherEvent::EntryAdded => self.start(),
            PublisherEvent::EntryRemoved => self.stop(),
        }
        self.run_deferred(now);
    }

    fn start(&mut self) {
        if self.state != ServerState::Stopped {
            return;
        }

        self.set_state(ServerState::Running);
        info!("Start listening on port {}", self.port);

        self.proxy.update_state(true, &mut self.registry);
    }

    fn stop(&mut self) {
        if self.state != ServerState::Running {
            return;
        }

        self.set_state(ServerState::Stopped);

        for host in self.registry.take_all() {
            self.remove_host(host, true);
        }

        let dropped = self.outstanding.len() + self.completed_updates.len();
        self.outstanding.clear();
        self.completed_updates.clear();
        if dropped > 0 {
            debug!("Dropped {} outstanding update(s)", dropped);
        }

        self.proxy.update_state(false, &mut self.registry);
        // Aborted advertisements are released without a response.
        self.proxy.take_completed();

        self.lease_deadline = None;
        self.has_registered_any_service = false;

        info!("Stop listening on port {}", self.port);
    }

    fn set_state(&mut self, state: ServerState) {
        if self.state == state {
            return;
        }

        info!("State: {:?} -> {:?}", self.state, state);
        self.state = state;
        self.notices.push(ServerNotice::StateChanged(state));
    }

    /// Infrastructure link came up or went down
    pub fn set_infra_link_running(&mut self, running: bool, now: Instant) {
        self.proxy.set_infra_link_running(running);
        self.handle_dnssd_state_change(now);
    }

    /// DNS-SD backend readiness changed
    pub fn handle_dnssd_state_change(&mut self, now: Instant) {
        let running = self.state == ServerState::Running;
        self.proxy.update_state(running, &mut self.registry);
        self.run_deferred(now);
    }

    /// Process one datagram received from `peer`
    ///
    /// # Returns
    ///
    /// - `Ok(())`: the update was accepted for processing
    /// - `Err(UpdateError::Drop)`: not running, not an update, or a
    ///   retransmission of an update still in progress; nothing was sent
    /// - `Err(error)`: the update was rejected and an error response queued
    pub fn handle_message(&mut self, message: &[u8], peer: SocketAddr, now: Instant) -> UpdateResult {
        if self.state != ServerState::Running {
            return Err(UpdateError::Drop);
        }

        let result = self.process_message(message, peer, now);
        self.run_deferred(now);
        result
    }

    fn process_message(&mut self, message: &[u8], peer: SocketAddr, now: Instant) -> UpdateResult {
        let header = read_header(message).map_err(|_| UpdateError::Drop)?;

        let update = match UpdateMessage::parse(message, &self.config.domain) {
            Ok(update) => update,
            Err(UpdateError::Drop) => return Err(UpdateError::Drop),
            Err(err) => {
                warn!("Update {} from {}: bad zone section: {}", header.id(), peer, err);
                self.send_response(&header, peer, ResponseCode::from_result(&Err(err.clone())));
                return Err(err);
            }
        };

        if self.is_outstanding(header.id(), peer) {
            info!(
                "Update {} from {} is already being processed, dropping",
                header.id(), peer
            );
            return Err(UpdateError::Drop);
        }

        let host = match update.to_host(&self.config.domain, &self.registry, now) {
            Ok(host) => host,
            Err(err) => {
                warn!("Update {} from {} rejected: {}", header.id(), peer, err);
                self.send_response(&header, peer, err.response_code());
                return Err(err);
            }
        };

        let metadata = MessageMetadata {
            header,
            peer,
            rx_time: now,
            ttl: self.config.ttl,
            lease: self.config.lease,
        };

        self.handle_update(host, metadata, now);
        Ok(())
    }

    fn is_outstanding(&self, message_id: u16, peer: SocketAddr) -> bool {
        self.outstanding
            .iter()
            .chain(self.completed_updates.iter().map(|(update, _)| update))
            .any(|update| update.metadata.header.id() == message_id && update.metadata.peer == peer)
            || self.proxy.has_outstanding(message_id, peer)
    }

    fn allocate_update_id(&mut self) -> UpdateId {
        let id = UpdateId(self.next_update_id);
        self.next_update_id = self.next_update_id.wrapping_add(1);
        id
    }

    /// Result from the update handler for update `id`
    pub fn handle_service_update_result(&mut self, id: UpdateId, result: UpdateResult, now: Instant) {
        match self.outstanding.iter().position(|update| update.id == id) {
            Some(index) => {
                if let Some(update) = self.outstanding.remove(index) {
                    debug!("Update handler answered update {}: {:?}", id, result);
                    self.completed_updates.push_back((update, result));
                }
            }
            None => debug!("No outstanding update with id {}", id),
        }

        self.run_deferred(now);
    }

    /// Completion of backend request `id`
    pub fn handle_registered(&mut self, id: RequestId, result: UpdateResult, now: Instant) {
        self.proxy.handle_registered(id, result, &mut self.registry);
        self.run_deferred(now);
    }

    /// Earliest time [`process_timers`](Self::process_timers) has work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.lease_deadline,
            self.outstanding.iter().map(|update| update.expire_time).min(),
            self.proxy.next_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Fire every timer due at `now`
    pub fn process_timers(&mut self, now: Instant) {
        self.expire_outstanding_updates(now);
        self.proxy.handle_timer(now, &self.registry);

        if self.lease_deadline.is_some_and(|deadline| deadline <= now) {
            self.handle_lease_timer(now);
        }

        self.run_deferred(now);
    }

    fn expire_outstanding_updates(&mut self, now: Instant) {
        while self
            .outstanding
            .front()
            .is_some_and(|update| update.expire_time <= now)
        {
            if let Some(update) = self.outstanding.pop_front() {
                warn!("Update handler did not answer update {} in time", update.id);
                self.completed_updates
                    .push_back((update, Err(UpdateError::ResponseTimeout)));
            }
        }
    }

    /// Commit every finished delegation until nothing is left to do
    pub fn run_deferred(&mut self, now: Instant) {
        loop {
            if self.proxy.has_pending_work() {
                self.proxy.run_tasklet(&self.registry);
            }

            let advertised = self.proxy.take_completed();
            if advertised.is_empty() && self.completed_updates.is_empty() {
                break;
            }

            while let Some((update, result)) = self.completed_updates.pop_front() {
                self.commit(result, update.host, update.metadata, now);
            }

            for completion in advertised {
                self.commit(completion.result, completion.host, completion.metadata, now);
            }
        }
    }

    /// Datagrams to send
    pub fn take_transmits(&mut self) -> Vec<Transmit> {
        std::mem::take(&mut self.transmits)
    }

    /// Notices raised since the last call
    pub fn take_notices(&mut self) -> Vec<ServerNotice> {
        std::mem::take(&mut self.notices)
    }

    fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.config.update_handler_timeout_ms)
    }
}
