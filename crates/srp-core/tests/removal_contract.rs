//! Contract Test: Removal
//!
//! Clients remove registrations with a zero lease:
//! - Zero lease, non-zero key lease: entries are deleted, names retained
//! - Zero key lease: the host and its services are removed entirely, on the
//!   backend too, with no completion to wait for
//! - A removal that omits services still removes every service of the host
//! - A deleted PTR removes one service and keeps the host

mod common;

use common::*;
use srp_core::server::ServerNotice;
use srp_core::wire::builder::{ServiceSpec, UpdateBuilder};
use srp_core::{EntryState, ResponseCode};

const INSTANCE: &str = "inst._test._udp.default.service.arpa.";

fn removal(message_id: u16, key_lease: u32) -> UpdateBuilder {
    UpdateBuilder::new(DOMAIN, "foo")
        .message_id(message_id)
        .lease(0, key_lease)
}

#[test]
fn zero_lease_retains_names() {
    let mut harness = Harness::new();
    let key = new_key();

    harness.send(&build(registration("foo", 1), &key));
    assert_rcode(&harness.response(), ResponseCode::Success);

    harness.send(&build(removal(2, 1_209_600), &key));
    assert_rcode(&harness.response(), ResponseCode::Success);

    let host = harness.host("foo").expect("name retained");
    assert_eq!(host.state(), EntryState::DeletedNameRetained);
    assert!(host.addresses().is_empty());
    assert_eq!(host.key_lease(), 1_209_600);

    let service = host.find_service(INSTANCE).expect("service name retained");
    assert!(service.is_deleted());

    // The retained name is still bound to the key.
    let intruder = new_key();
    harness.send(&build(registration("foo", 3), &intruder));
    assert_rcode(&harness.response(), ResponseCode::NameExists);

    // The owner can register again.
    harness.send(&build(registration("foo", 4), &key));
    assert_rcode(&harness.response(), ResponseCode::Success);
    assert!(!harness.host("foo").unwrap().is_deleted());
}

#[test]
fn zero_key_lease_removes_everything() {
    let mut harness = Harness::new();
    let key = new_key();

    harness.send(&build(registration("foo", 1), &key));
    harness.responses();
    harness.server.take_notices();

    harness.send(&build(removal(2, 0), &key));
    assert_rcode(&harness.response(), ResponseCode::Success);

    assert!(harness.host("foo").is_none());
    assert!(harness.server.registry().find_service(INSTANCE).is_none());
    assert!(harness.server.take_notices().contains(&ServerNotice::HostRemoved {
        host_name: format!("foo.{}", DOMAIN),
        name_retained: false,
    }));

    // Names are free for any key now.
    let other = new_key();
    harness.send(&build(registration("foo", 3), &other));
    assert_rcode(&harness.response(), ResponseCode::Success);
}

#[test]
fn zero_key_lease_removes_everything_through_proxy() {
    let mut harness = Harness::with_proxy();
    let key = new_key();

    harness.send(&build(registration("foo", 1), &key));
    harness.complete_registrations();
    assert_rcode(&harness.response(), ResponseCode::Success);

    assert_eq!(harness.dnssd.hosts().len(), 1);
    assert_eq!(harness.dnssd.services().len(), 1);
    assert_eq!(harness.dnssd.keys().len(), 2);

    harness.send(&build(removal(2, 0), &key));

    // Unregistrations need no completion, so the client hears back at once.
    assert!(harness.dnssd.take_pending().is_empty());
    let responses = harness.responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].message_id, 2);
    assert_rcode(&responses[0], ResponseCode::Success);

    assert!(harness.dnssd.hosts().is_empty());
    assert!(harness.dnssd.services().is_empty());
    assert!(harness.dnssd.keys().is_empty());
    assert!(harness.host("foo").is_none());
}

#[test]
fn removal_covers_services_it_does_not_list() {
    let mut harness = Harness::with_proxy();
    let key = new_key();

    harness.send(&build(
        registration("foo", 1).service(ServiceSpec::new("other", "_test._udp").port(99)),
        &key,
    ));
    harness.complete_registrations();
    assert_rcode(&harness.response(), ResponseCode::Success);
    assert_eq!(harness.dnssd.services().len(), 2);

    harness.send(&build(removal(2, 1_209_600), &key));
    harness.complete_registrations();
    assert_rcode(&harness.response(), ResponseCode::Success);

    let host = harness.host("foo").unwrap();
    assert_eq!(host.services().len(), 2);
    assert!(host.services().iter().all(|service| service.is_deleted()));

    assert!(harness.dnssd.hosts().is_empty());
    assert!(harness.dnssd.services().is_empty());
    // Keys keep the names reserved on the backend too.
    assert_eq!(harness.dnssd.keys().len(), 3);
}

#[test]
fn deleted_service_keeps_host() {
    let mut harness = Harness::with_proxy();
    let key = new_key();

    harness.send(&build(
        registration("foo", 1).service(ServiceSpec::new("other", "_test._udp").port(99)),
        &key,
    ));
    harness.complete_registrations();
    harness.responses();

    let update = UpdateBuilder::new(DOMAIN, "foo")
        .message_id(2)
        .address("fd00::1".parse().unwrap())
        .service(ServiceSpec::new("inst", "_test._udp").port(1234).txt_entry("k=v"))
        .service(ServiceSpec::new("other", "_test._udp").deleted());
    harness.send(&build(update, &key));
    harness.complete_registrations();
    assert_rcode(&harness.response(), ResponseCode::Success);

    let host = harness.host("foo").unwrap();
    assert!(!host.is_deleted());
    assert!(!host.find_service(INSTANCE).unwrap().is_deleted());
    assert!(
        host.find_service("other._test._udp.default.service.arpa.")
            .unwrap()
            .is_deleted()
    );

    let services = harness.dnssd.services();
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].service_instance, "inst");
    assert_eq!(harness.dnssd.hosts().len(), 1);
}

#[test]
fn omitted_service_is_carried_over() {
    let mut harness = Harness::new();
    let key = new_key();

    harness.send(&build(
        registration("foo", 1).service(ServiceSpec::new("other", "_test._udp").port(99)),
        &key,
    ));
    harness.responses();

    // Refresh listing only one of the two services.
    harness.send(&build(registration("foo", 2), &key));
    assert_rcode(&harness.response(), ResponseCode::Success);

    let host = harness.host("foo").unwrap();
    assert_eq!(host.services().len(), 2);
    assert!(host.services().iter().all(|service| !service.is_deleted()));
}
