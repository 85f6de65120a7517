//! Lease expiry and removal of committed entries

use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::{Server, ServerNotice};
use crate::proxy::AdvertisingProxy;
use crate::registry::Host;
use crate::traits::{UpdateHandler, UpdateId};

/// Removal notification for the handler (when set) or the proxy
enum Removal {
    Host,
    Service(usize),
}

impl Server {
    /// Expire leases due at `now` and re-arm the lease timer
    pub(super) fn handle_lease_timer(&mut self, now: Instant) {
        let mut earliest = None;
        let mut index = 0;

        while let Some(host) = self.registry.host_at_mut(index) {
            let key_expire_time = host.key_expire_time();

            if key_expire_time <= now {
                info!("Key lease of host '{}' expired", host.full_name);
                if let Some(host) = self.registry.remove_at(index) {
                    self.remove_host(host, true);
                }
                continue;
            }

            if host.is_deleted() {
                extend(&mut earliest, key_expire_time);
                self.expire_services(index, now, &mut earliest);
            } else if host.expire_time() <= now {
                info!("Lease of host '{}' expired", host.full_name);

                let service_count = host.services.len();
                for service_index in 0..service_count {
                    self.remove_service(index, service_index, true, false);
                }
                self.remove_host_retaining_name(index, true);

                extend(&mut earliest, key_expire_time);
            } else {
                extend(&mut earliest, host.expire_time());
                self.expire_services(index, now, &mut earliest);
            }

            index += 1;
        }

        if let Some(deadline) = earliest {
            debug!(
                "Lease timer scheduled in {}s",
                deadline.saturating_duration_since(now).as_secs()
            );
        }
        self.lease_deadline = earliest;
    }

    fn expire_services(&mut self, host_index: usize, now: Instant, earliest: &mut Option<Instant>) {
        let mut service_index = 0;

        loop {
            let Some(service) = self
                .registry
                .host_at_mut(host_index)
                .and_then(|host| host.services.get(service_index))
            else {
                break;
            };

            if service.key_expire_time() <= now {
                info!("Key lease of service '{}' expired", service.instance_name);
                self.remove_service(host_index, service_index, false, true);
                continue;
            }

            if service.is_deleted() {
                extend(earliest, service.key_expire_time());
            } else if service.expire_time() <= now {
                info!("Lease of service '{}' expired", service.instance_name);
                let key_expire_time = service.key_expire_time();
                self.remove_service(host_index, service_index, true, true);
                extend(earliest, key_expire_time);
            } else {
                extend(earliest, service.expire_time());
            }

            service_index += 1;
        }
    }

    /// Fully remove a host already taken out of the registry
    pub(super) fn remove_host(&mut self, mut host: Host, notify: bool) {
        host.mark_deleted(false);
        info!("Fully remove host '{}'", host.full_name);

        if notify {
            self.notify_removal(&mut host, Removal::Host);
        }

        self.notices.push(ServerNotice::HostRemoved {
            host_name: host.full_name,
            name_retained: false,
        });
    }

    fn remove_host_retaining_name(&mut self, index: usize, notify: bool) {
        let Some(host) = self.registry.host_at_mut(index) else {
            return;
        };

        host.mark_deleted(true);
        let host_name = host.full_name.clone();
        info!("Remove host '{}' (but retain its name)", host_name);

        if notify {
            self.notify_removal_at(index, Removal::Host);
        }

        self.notices.push(ServerNotice::HostRemoved {
            host_name,
            name_retained: true,
        });
    }

    fn remove_service(&mut self, host_index: usize, service_index: usize, retain_name: bool, notify: bool) {
        let Some(service) = self
            .registry
            .host_at_mut(host_index)
            .and_then(|host| host.services.get_mut(service_index))
        else {
            return;
        };

        service.mark_deleted(retain_name);
        if retain_name {
            info!("Remove service '{}' (but retain its name)", service.instance_name);
        } else {
            info!("Fully remove service '{}'", service.instance_name);
        }

        if notify {
            self.notify_removal_at(host_index, Removal::Service(service_index));
        }

        if !retain_name && let Some(host) = self.registry.host_at_mut(host_index) {
            host.services.remove(service_index);
        }
    }

    fn notify_removal_at(&mut self, host_index: usize, removal: Removal) {
        let id = self.update_handler.is_some().then(|| self.allocate_update_id());
        let timeout = self.handler_timeout();

        if let Some(host) = self.registry.host_at_mut(host_index) {
            notify(self.update_handler.as_deref_mut(), &mut self.proxy, id, host, removal, timeout);
        }
    }

    fn notify_removal(&mut self, host: &mut Host, removal: Removal) {
        let id = self.update_handler.is_some().then(|| self.allocate_update_id());
        let timeout = self.handler_timeout();

        notify(self.update_handler.as_deref_mut(), &mut self.proxy, id, host, removal, timeout);
    }
}

/// Report a removal without waiting for the handler's answer
fn notify(
    handler: Option<&mut (dyn UpdateHandler + 'static)>,
    proxy: &mut AdvertisingProxy,
    id: Option<UpdateId>,
    host: &mut Host,
    removal: Removal,
    timeout: Duration,
) {
    if let (Some(handler), Some(id)) = (handler, id) {
        info!("Update handler is notified of a removal, update id {}", id);
        handler.handle_update(id, host, timeout);
        return;
    }

    match removal {
        Removal::Host => proxy.advertise_removal_of_host(host),
        Removal::Service(index) => {
            let host_name = host.full_name.clone();
            if let Some(service) = host.services.get_mut(index) {
                proxy.advertise_removal_of_service(&host_name, service);
            }
        }
    }
}

fn extend(earliest: &mut Option<Instant>, time: Instant) {
    *earliest = Some(earliest.map_or(time, |current| current.min(time)));
}
