//! Contract Test: Leases
//!
//! Constraints verified:
//! - Requested leases are clamped to the configured bounds
//! - A clamped grant is reported back with the lease option
//! - The short lease option is answered in the short form
//! - An expired lease deletes the entries and retains their names
//! - An expired key lease removes the entries and frees their names

mod common;

use common::*;
use srp_core::config::{LeaseConfig, ServerConfig, TtlConfig};
use srp_core::server::ServerNotice;
use srp_core::wire::builder::ServiceSpec;
use srp_core::{EntryState, ResponseCode};
use std::time::Duration;

const LEASE: u32 = 7200;
const KEY_LEASE: u32 = 1_209_600;

fn secs(seconds: u32) -> Duration {
    Duration::from_secs(seconds.into())
}

#[test]
fn granted_lease_within_bounds_gets_plain_success() {
    let mut harness = Harness::new();

    harness.send(&build(registration("foo", 1).lease(3600, 86400), &new_key()));

    let response = harness.response();
    assert_rcode(&response, ResponseCode::Success);
    assert_eq!(response.lease, None);
}

#[test]
fn clamped_lease_is_reported() {
    let mut harness = Harness::new();

    harness.send(&build(registration("foo", 1).lease(10, 100), &new_key()));

    let response = harness.response();
    assert_rcode(&response, ResponseCode::Success);
    let granted = response.lease.expect("granted lease reported");
    assert_eq!(granted.lease, 1800);
    assert_eq!(granted.key_lease, 86400);
    assert!(!granted.short);

    let host = harness.host("foo").unwrap();
    assert_eq!(host.lease(), 1800);
    assert_eq!(host.key_lease(), 86400);
    assert_eq!(host.services()[0].lease(), 1800);
}

#[test]
fn ttl_is_bounded_by_lease_and_config() {
    let config = ServerConfig::new().with_ttl(TtlConfig::new(60, 600));
    let mut harness = Harness::with_config(config);

    harness.send(&build(registration("foo", 1).ttl(3600), &new_key()));
    harness.response();

    let host = harness.host("foo").unwrap();
    assert_eq!(host.ttl(), 600);
    assert_eq!(host.services()[0].ttl(), 600);
}

#[test]
fn short_lease_option_is_answered_short() {
    let mut harness = Harness::new();
    let key = new_key();

    harness.send(&build(registration("foo", 1).short_lease(1800), &key));
    let response = harness.response();
    assert_rcode(&response, ResponseCode::Success);
    assert_eq!(response.lease, None);

    let host = harness.host("foo").unwrap();
    assert!(host.uses_short_lease_option());
    assert_eq!(host.key_lease(), 1800);

    harness.send(&build(registration("foo", 2).short_lease(60), &key));
    let granted = harness.response().lease.expect("granted lease reported");
    assert!(granted.short);
    assert_eq!(granted.lease, 1800);
    assert_eq!(harness.host("foo").unwrap().key_lease(), 1800);
}

#[test]
fn lease_expiry_retains_name_until_key_lease_expires() {
    let mut harness = Harness::new();
    let key = new_key();
    let registered_at = harness.now;

    harness.send(&build(registration("foo", 1), &key));
    harness.response();
    harness.server.take_notices();

    assert_eq!(harness.server.next_deadline(), Some(registered_at + secs(LEASE)));

    harness.advance(secs(LEASE) - Duration::from_secs(1));
    harness.fire_timers();
    assert!(!harness.host("foo").unwrap().is_deleted());

    harness.advance(Duration::from_secs(1));
    harness.fire_timers();

    let host = harness.host("foo").expect("name retained");
    assert_eq!(host.state(), EntryState::DeletedNameRetained);
    assert!(host.services().iter().all(|service| service.is_deleted()));
    assert_eq!(harness.server.next_deadline(), Some(registered_at + secs(KEY_LEASE)));
    assert!(harness.server.take_notices().contains(&ServerNotice::HostRemoved {
        host_name: format!("foo.{}", DOMAIN),
        name_retained: true,
    }));

    // Name is still bound to the key in the meantime.
    harness.send(&build(registration("foo", 2), &new_key()));
    assert_rcode(&harness.response(), ResponseCode::NameExists);

    harness.now = registered_at + secs(KEY_LEASE);
    harness.fire_timers();

    assert!(harness.server.registry().is_empty());
    assert_eq!(harness.server.next_deadline(), None);

    harness.send(&build(registration("foo", 3), &new_key()));
    assert_rcode(&harness.response(), ResponseCode::Success);
}

#[test]
fn services_expire_independently() {
    let config = ServerConfig::new().with_lease(LeaseConfig::new(30, 7200, 60, 1_209_600));
    let mut harness = Harness::with_config(config);
    let key = new_key();
    let start = harness.now;

    harness.send(&build(
        registration("foo", 1).service(ServiceSpec::new("other", "_test._udp").port(99)),
        &key,
    ));
    harness.response();

    // A later, shorter refresh listing only one service keeps the other
    // on its original lease.
    harness.advance(secs(100));
    harness.send(&build(registration("foo", 2).lease(60, 120), &key));
    harness.response();

    let host = harness.host("foo").unwrap();
    assert_eq!(host.lease(), 60);
    let other = host.find_service("other._test._udp.default.service.arpa.").unwrap();
    assert_eq!(other.lease(), LEASE);
    assert_eq!(other.expire_time(), start + secs(LEASE));

    // Host lease runs out first: everything is deleted with it.
    harness.advance(secs(60));
    harness.fire_timers();

    let host = harness.host("foo").unwrap();
    assert!(host.is_deleted());
    assert!(host.services().iter().all(|service| service.is_deleted()));

    // Host key lease runs out: the whole host goes.
    harness.advance(secs(60));
    harness.fire_timers();
    assert!(harness.host("foo").is_none());
}

#[test]
fn lease_info_reports_remaining_time() {
    let mut harness = Harness::new();

    harness.send(&build(registration("foo", 1), &new_key()));
    harness.response();

    let later = harness.now + secs(1000);
    let info = harness.host("foo").unwrap().lease_info(later);

    assert_eq!(info.lease, secs(LEASE));
    assert_eq!(info.key_lease, secs(KEY_LEASE));
    assert_eq!(info.remaining_lease, secs(LEASE - 1000));
    assert_eq!(info.remaining_key_lease, secs(KEY_LEASE - 1000));
}
