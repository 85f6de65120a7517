//! SRP run loop
//!
//! The SrpEngine drives a [`Server`] from one tokio task:
//! - Receives SRP updates on the UDP socket (bound while the server runs)
//! - Feeds DNS-SD and update-handler completions back into the server
//! - Applies platform events (Network Data entry, infrastructure link,
//!   DNS-SD readiness)
//! - Fires server timers
//! - Persists settings and emits events for monitoring
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────────┐
//! │  UDP socket  │   │ Completions  │   │PlatformEvents │
//! └──────┬───────┘   └──────┬───────┘   └───────┬───────┘
//!        │                  │                   │
//!        └──────────────────┼───────────────────┘
//!                           ▼
//!                    ┌─────────────┐
//!                    │  SrpEngine  │──── timers (sleep_until)
//!                    └──────┬──────┘
//!                           │
//!        ┌──────────────────┼───────────────────┐
//!        ▼                  ▼                   ▼
//! ┌─────────────┐    ┌─────────────┐     ┌─────────────┐
//! │  Responses  │    │SettingsStore│     │   Events    │
//! └─────────────┘    └─────────────┘     └─────────────┘
//! ```

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::time::Instant;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, error, info, warn};

use crate::error::{Result, UpdateResult};
use crate::registry::RequestId;
use crate::server::{Server, ServerNotice, ServerState};
use crate::traits::{NetDataPublisher, PublisherEvent, SettingsStore, UpdateId};

/// Completion reported by a DNS-SD backend or an update handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// A backend registration finished
    Registered { id: RequestId, result: UpdateResult },
    /// The update handler decided on an update
    UpdateResult { id: UpdateId, result: UpdateResult },
}

/// Sending half of the completion channel handed to backends and handlers
pub type CompletionSender = mpsc::UnboundedSender<Completion>;

/// Receiving half consumed by the engine
pub type CompletionReceiver = mpsc::UnboundedReceiver<Completion>;

/// Create the completion channel
pub fn completion_channel() -> (CompletionSender, CompletionReceiver) {
    mpsc::unbounded_channel()
}

/// Platform state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformEvent {
    /// Network Data publisher entry added or removed
    Publisher(PublisherEvent),
    /// Infrastructure link up or down
    InfraLinkRunning(bool),
    /// DNS-SD backend readiness may have changed
    DnssdStateChanged,
}

/// Stream of platform events consumed by the engine
pub type PlatformEvents = Pin<Box<dyn Stream<Item = PlatformEvent> + Send>>;

/// Events emitted by the SrpEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started
    Started { domain: String },

    /// Server state changed
    StateChanged { state: ServerState, port: u16 },

    /// An update was committed
    UpdateCommitted { host_name: String, message_id: u16 },

    /// An update was rejected or failed
    UpdateRejected {
        host_name: String,
        message_id: u16,
        error: String,
    },

    /// A host was removed
    HostRemoved { host_name: String, name_retained: bool },

    /// Engine stopped
    Stopped { reason: String },
}

/// Network Data publisher without a mesh behind it
///
/// Reports the entry as added (or removed) right away through the platform
/// event channel, so a standalone server starts as soon as it is enabled.
#[derive(Debug, Clone)]
pub struct LocalNetData {
    events: mpsc::UnboundedSender<PlatformEvent>,
}

impl LocalNetData {
    pub fn new(events: mpsc::UnboundedSender<PlatformEvent>) -> Self {
        Self { events }
    }

    fn report(&self, event: PublisherEvent) {
        if self.events.send(PlatformEvent::Publisher(event)).is_err() {
            warn!("Platform event channel closed, dropping {:?}", event);
        }
    }
}

impl NetDataPublisher for LocalNetData {
    fn publish_unicast(&mut self, port: u16) {
        debug!("Publishing unicast entry for port {}", port);
        self.report(PublisherEvent::EntryAdded);
    }

    fn publish_anycast(&mut self, sequence_number: u8) {
        debug!("Publishing anycast entry, sequence number {}", sequence_number);
        self.report(PublisherEvent::EntryAdded);
    }

    fn unpublish(&mut self) {
        debug!("Withdrawing published entry");
        self.report(PublisherEvent::EntryRemoved);
    }
}

/// SRP run loop
///
/// ## Lifecycle
///
/// 1. Create with [`SrpEngine::new()`]
/// 2. Run with [`SrpEngine::run()`]; the server is enabled on entry
/// 3. On shutdown the server is disabled and pending transmits flushed
pub struct SrpEngine {
    server: Server,
    settings: Box<dyn SettingsStore>,
    completions: CompletionReceiver,
    platform_events: PlatformEvents,
    listen_addr: IpAddr,
    max_message_size: usize,
    event_tx: mpsc::Sender<EngineEvent>,
}

impl SrpEngine {
    /// Create a new engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        server: Server,
        settings: Box<dyn SettingsStore>,
        completions: CompletionReceiver,
        platform_events: PlatformEvents,
        listen_addr: IpAddr,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        let engine_config = server.config().engine.clone();
        engine_config.validate()?;

        let (tx, rx) = mpsc::channel(engine_config.event_channel_capacity);

        let engine = Self {
            server,
            settings,
            completions,
            platform_events,
            listen_addr,
            max_message_size: engine_config.max_message_size,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    /// Run until Ctrl-C
    pub async fn run(&mut self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run until `shutdown_rx` fires (or, when `None`, until Ctrl-C)
    ///
    /// Lets the caller own signal handling, as the daemon does for SIGTERM.
    pub async fn run_with_shutdown(&mut self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(&mut self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        match self.settings.load().await {
            Ok(info) => self.server.restore_settings(info),
            Err(e) => warn!("Failed to load settings, starting fresh: {}", e),
        }

        self.emit_event(EngineEvent::Started {
            domain: self.server.domain().to_string(),
        });

        self.server.set_enabled(true);

        let shutdown = shutdown_signal(shutdown_rx);
        tokio::pin!(shutdown);

        let mut socket: Option<UdpSocket> = None;
        let mut buf = vec![0u8; self.max_message_size];

        let result = loop {
            if let Err(e) = self.sync_socket(&mut socket).await {
                break Err(e);
            }
            self.flush(socket.as_ref()).await;

            let deadline = self.server.next_deadline();

            tokio::select! {
                received = recv_from(socket.as_ref(), &mut buf) => match received {
                    Ok((len, peer)) => {
                        if let Err(e) = self.server.handle_message(&buf[..len], peer, Instant::now()) {
                            debug!("Message from {} not processed: {}", peer, e);
                        }
                    }
                    Err(e) => warn!("Failed to receive: {}", e),
                },

                Some(completion) = self.completions.recv() => {
                    self.handle_completion(completion);
                }

                Some(event) = self.platform_events.next() => {
                    self.handle_platform_event(event);
                }

                _ = sleep_until(deadline), if deadline.is_some() => {
                    self.server.process_timers(Instant::now());
                }

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break Ok(());
                }
            }
        };

        self.server.set_enabled(false);
        self.flush(socket.as_ref()).await;

        self.emit_event(EngineEvent::Stopped {
            reason: match &result {
                Ok(()) => "Shutdown signal".to_string(),
                Err(e) => e.to_string(),
            },
        });

        result
    }

    /// Bind the socket while the server runs, close it otherwise
    async fn sync_socket(&mut self, socket: &mut Option<UdpSocket>) -> Result<()> {
        let running = self.server.state() == ServerState::Running;

        if running && socket.is_none() {
            let addr = SocketAddr::new(self.listen_addr, self.server.port());
            let bound = UdpSocket::bind(addr).await.map_err(|e| {
                error!("Failed to bind {}: {}", addr, e);
                e
            })?;
            info!("Listening on {}", addr);
            *socket = Some(bound);
        } else if !running && socket.is_some() {
            info!("Closing socket");
            *socket = None;
        }

        Ok(())
    }

    fn handle_completion(&mut self, completion: Completion) {
        let now = Instant::now();

        match completion {
            Completion::Registered { id, result } => self.server.handle_registered(id, result, now),
            Completion::UpdateResult { id, result } => {
                self.server.handle_service_update_result(id, result, now)
            }
        }
    }

    fn handle_platform_event(&mut self, event: PlatformEvent) {
        let now = Instant::now();
        debug!("Platform event: {:?}", event);

        match event {
            PlatformEvent::Publisher(event) => self.server.handle_publisher_event(event, now),
            PlatformEvent::InfraLinkRunning(running) => self.server.set_infra_link_running(running, now),
            PlatformEvent::DnssdStateChanged => self.server.handle_dnssd_state_change(now),
        }
    }

    /// Send queued responses and act on server notices
    async fn flush(&mut self, socket: Option<&UdpSocket>) {
        for transmit in self.server.take_transmits() {
            match socket {
                Some(socket) => {
                    if let Err(e) = socket.send_to(&transmit.payload, transmit.peer).await {
                        warn!("Failed to send response to {}: {}", transmit.peer, e);
                    }
                }
                None => debug!("No socket, dropping response to {}", transmit.peer),
            }
        }

        for notice in self.server.take_notices() {
            match notice {
                ServerNotice::SaveSettings(info) => {
                    if let Err(e) = self.settings.save(&info).await {
                        error!("Failed to save settings: {}", e);
                    }
                }
                ServerNotice::StateChanged(state) => self.emit_event(EngineEvent::StateChanged {
                    state,
                    port: self.server.port(),
                }),
                ServerNotice::UpdateCommitted {
                    host_name,
                    message_id,
                } => self.emit_event(EngineEvent::UpdateCommitted {
                    host_name,
                    message_id,
                }),
                ServerNotice::UpdateRejected {
                    host_name,
                    message_id,
                    error,
                } => self.emit_event(EngineEvent::UpdateRejected {
                    host_name,
                    message_id,
                    error: error.to_string(),
                }),
                ServerNotice::HostRemoved {
                    host_name,
                    name_retained,
                } => self.emit_event(EngineEvent::HostRemoved {
                    host_name,
                    name_retained,
                }),
            }
        }
    }

    fn emit_event(&self, event: EngineEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}

async fn recv_from(socket: Option<&UdpSocket>, buf: &mut [u8]) -> std::io::Result<(usize, SocketAddr)> {
    match socket {
        Some(socket) => socket.recv_from(buf).await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

fn shutdown_signal(shutdown_rx: Option<oneshot::Receiver<()>>) -> impl Future<Output = ()> {
    async move {
        match shutdown_rx {
            Some(rx) => {
                let _ = rx.await;
            }
            None => {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for shutdown signal: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        }
    }
}
