//! Delegation and commit of validated updates

use std::net::SocketAddr;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::{MessageMetadata, Server, ServerNotice, Transmit, UpdateMetadata};
use crate::config::AddressMode;
use crate::error::{ResponseCode, UpdateResult};
use crate::registry::Host;
use crate::traits::ServerInfo;
use crate::wire::Header;
use crate::wire::record::LeaseOption;
use crate::wire::response::{encode_lease_response, encode_response};

impl Server {
    /// Complete a validated candidate and hand it on
    pub(super) fn handle_update(&mut self, mut host: Host, metadata: MessageMetadata, now: Instant) {
        if host.lease == 0 {
            host.clear_resources();

            // A removal may omit services the client registered earlier;
            // add them as deleted so the handler or proxy sees all of them.
            if let Some(existing) = self.registry.find_host(&host.full_name) {
                for service in existing.services.iter().filter(|service| !service.is_deleted()) {
                    host.add_copy_of_service_as_deleted(service);
                }
            }
        }

        self.inform_update_handler_or_commit(host, metadata, now);
    }

    fn inform_update_handler_or_commit(&mut self, host: Host, metadata: MessageMetadata, now: Instant) {
        log_update(&host, &metadata);

        let timeout = self.handler_timeout();

        if self.update_handler.is_some() {
            let id = self.allocate_update_id();

            if let Some(handler) = self.update_handler.as_mut() {
                debug!("Update handler is notified, update id {}", id);
                handler.handle_update(id, &host, timeout);
            }

            self.outstanding.push_back(UpdateMetadata {
                id,
                expire_time: now + timeout,
                host,
                metadata,
            });
        } else {
            self.proxy.advertise(host, metadata, &mut self.registry, now);
        }
    }

    /// Commit (or reject) a candidate whose delegation finished
    pub(super) fn commit(&mut self, result: UpdateResult, mut host: Host, metadata: MessageMetadata, now: Instant) {
        let message_id = metadata.header.id();

        if let Err(err) = result {
            warn!(
                "Update {} for host '{}' failed: {}",
                message_id, host.full_name, err
            );
            self.send_response(&metadata.header, metadata.peer, err.response_code());
            self.notices.push(ServerNotice::UpdateRejected {
                host_name: host.full_name,
                message_id,
                error: err,
            });
            return;
        }

        let requested_lease = host.lease;
        let requested_key_lease = host.key_lease;
        let short_lease_option = host.use_short_lease_option;

        let granted_lease = metadata.lease.grant_lease(requested_lease);
        let granted_key_lease = if short_lease_option {
            granted_lease
        } else {
            metadata.lease.grant_key_lease(requested_key_lease)
        };
        let granted_ttl = metadata.ttl.grant_ttl(granted_lease, host.ttl);

        host.apply_grant(granted_lease, granted_key_lease, granted_ttl);

        let host_name = host.full_name.clone();
        let existing = self.registry.take(&host_name);

        if granted_key_lease == 0 {
            info!("Remove key of host '{}'", host_name);
            if let Some(existing) = existing {
                self.remove_host(existing, false);
            }
        } else {
            if let Some(existing) = existing {
                let deleted = host.is_deleted();

                for service in existing.services {
                    if host.find_service(&service.instance_name).is_some() {
                        continue;
                    }

                    let mut carried = service;
                    if deleted && !carried.is_deleted() {
                        carried.mark_deleted(true);
                    }
                    host.services.push(carried);
                }
            }

            for service in &mut host.services {
                if !service.committed {
                    debug!(
                        "{} service '{}'",
                        if service.is_deleted() { "Deleting" } else { "Adding" },
                        service.instance_name
                    );
                }
                service.committed = true;
            }

            let adds_service = host.services.iter().any(|service| !service.is_deleted());
            self.registry.insert(host);

            if adds_service {
                self.note_registered_service();
            }
        }

        info!(
            "Committed update {} for host '{}': lease {}, key-lease {}, ttl {}",
            message_id, host_name, granted_lease, granted_key_lease, granted_ttl
        );

        self.handle_lease_timer(now);

        if granted_lease == requested_lease && granted_key_lease == requested_key_lease {
            self.send_response(&metadata.header, metadata.peer, ResponseCode::Success);
        } else {
            let option = if short_lease_option {
                LeaseOption::short(granted_lease)
            } else {
                LeaseOption::long(granted_lease, granted_key_lease)
            };
            self.send_lease_response(&metadata.header, metadata.peer, option);
        }

        self.notices.push(ServerNotice::UpdateCommitted {
            host_name,
            message_id,
        });
    }

    fn note_registered_service(&mut self) {
        if self.has_registered_any_service || self.config.address_mode != AddressMode::Unicast {
            return;
        }

        self.has_registered_any_service = true;
        debug!("First service registered, saving port {}", self.port);
        self.notices
            .push(ServerNotice::SaveSettings(ServerInfo::new(self.port)));
    }

    pub(super) fn send_response(&mut self, query: &Header, peer: SocketAddr, rcode: ResponseCode) {
        self.response_counters.count(rcode);
        debug!("Sending response {:?} to {} for {}", rcode, peer, query.id());

        match encode_response(query, rcode) {
            Ok(payload) => self.transmits.push(Transmit { peer, payload }),
            Err(e) => warn!("Failed to encode response to {}: {}", peer, e),
        }
    }

    fn send_lease_response(&mut self, query: &Header, peer: SocketAddr, granted: LeaseOption) {
        self.response_counters.count(ResponseCode::Success);
        debug!(
            "Sending granted lease {}/{} to {} for {}",
            granted.lease, granted.key_lease, peer, query.id()
        );

        match encode_lease_response(query, granted) {
            Ok(payload) => self.transmits.push(Transmit { peer, payload }),
            Err(e) => warn!("Failed to encode response to {}: {}", peer, e),
        }
    }
}

fn log_update(host: &Host, metadata: &MessageMetadata) {
    info!(
        "Processed update {} from {} for host '{}'",
        metadata.header.id(), metadata.peer, host.full_name
    );
    debug!(
        "    lease:{}, key-lease:{}, ttl:{}, {} address(es)",
        host.lease,
        host.key_lease,
        host.ttl,
        host.addresses.len()
    );

    for service in &host.services {
        debug!(
            "    {} service '{}'{}",
            if service.is_deleted() { "Deleting" } else { "Adding" },
            service.instance_name,
            if service.sub_types.is_empty() {
                String::new()
            } else {
                format!(" sub-types: {}", service.sub_type_labels().collect::<Vec<_>>().join(","))
            }
        );
    }
}
