//! Contract Test: Delegation Ordering
//!
//! Constraints verified:
//! - With an update handler set, nothing is committed until it answers
//! - Handler results are committed in the order they arrive
//! - Unanswered updates time out and are rejected
//! - Updates for one name through the proxy complete in arrival order
//! - Stopping the server drops everything in flight without responses

mod common;

use common::*;
use srp_core::config::ServerConfig;
use srp_core::server::ServerNotice;
use srp_core::traits::PublisherEvent;
use srp_core::wire::builder::{ServiceSpec, UpdateBuilder};
use srp_core::{ResponseCode, UpdateError};
use std::time::Duration;

fn with_handler(harness: &mut Harness) -> RecordingHandler {
    let handler = RecordingHandler::new();
    harness
        .server
        .set_update_handler(Some(Box::new(RecordingHandler::sharing_state_with(&handler))));
    handler
}

#[test]
fn handler_sees_validated_candidate() {
    let mut harness = Harness::new();
    let handler = with_handler(&mut harness);

    harness.send(&build(registration("foo", 1), &new_key()));

    assert!(harness.responses().is_empty());
    assert!(harness.host("foo").is_none());

    let updates = handler.updates();
    assert_eq!(updates.len(), 1);
    let candidate = &updates[0].1;
    assert_eq!(candidate.full_name(), format!("foo.{}", DOMAIN));
    assert_eq!(candidate.services().len(), 1);
    assert_eq!(candidate.lease(), 7200);
}

#[test]
fn results_commit_in_arrival_order() {
    let mut harness = Harness::new();
    let handler = with_handler(&mut harness);

    harness.send(&build(registration("foo", 1), &new_key()));
    let bar = UpdateBuilder::new(DOMAIN, "bar")
        .message_id(2)
        .address("fd00::2".parse().unwrap())
        .service(ServiceSpec::new("second", "_test._udp").port(5));
    harness.send(&build(bar, &new_key()));
    assert_eq!(harness.server.outstanding_updates(), 2);

    harness
        .server
        .handle_service_update_result(handler.id_for("bar"), Ok(()), harness.now);
    harness
        .server
        .handle_service_update_result(handler.id_for("foo"), Ok(()), harness.now);

    let order: Vec<u16> = harness
        .responses()
        .iter()
        .map(|response| response.message_id)
        .collect();
    assert_eq!(order, vec![2, 1]);
    assert_eq!(harness.server.hosts().count(), 2);
}

#[test]
fn handler_error_is_sent_to_client() {
    let mut harness = Harness::new();
    let handler = with_handler(&mut harness);

    harness.send(&build(registration("foo", 1), &new_key()));
    harness.server.handle_service_update_result(
        handler.id_for("foo"),
        Err(UpdateError::backend("policy")),
        harness.now,
    );

    assert_rcode(&harness.response(), ResponseCode::Refused);
    assert!(harness.host("foo").is_none());
}

#[test]
fn unanswered_update_times_out() {
    let config = ServerConfig::new().with_update_handler_timeout_ms(500);
    let mut harness = Harness::with_config(config);
    let handler = with_handler(&mut harness);

    harness.send(&build(registration("foo", 1), &new_key()));
    harness.advance(Duration::from_millis(500));
    harness.fire_timers();

    assert_rcode(&harness.response(), ResponseCode::Refused);
    assert_eq!(harness.server.outstanding_updates(), 0);
    assert!(harness.server.take_notices().contains(&ServerNotice::UpdateRejected {
        host_name: format!("foo.{}", DOMAIN),
        message_id: 1,
        error: UpdateError::ResponseTimeout,
    }));

    // A late answer is ignored.
    harness
        .server
        .handle_service_update_result(handler.id_for("foo"), Ok(()), harness.now);
    assert!(harness.responses().is_empty());
    assert!(harness.host("foo").is_none());
}

#[test]
fn expiry_is_reported_to_handler() {
    let mut harness = Harness::new();
    let key = new_key();

    harness.send(&build(registration("foo", 1), &key));
    harness.response();

    let handler = with_handler(&mut harness);
    harness.advance(Duration::from_secs(7200));
    harness.fire_timers();

    let updates = handler.updates();
    assert_eq!(updates.len(), 1);
    assert!(updates[0].1.is_deleted());

    // Removals are not waited for.
    assert_eq!(harness.server.outstanding_updates(), 0);
}

#[test]
fn proxy_completes_same_name_in_order() {
    let mut harness = Harness::with_proxy();
    let key = new_key();

    harness.send(&build(registration("foo", 1), &key));
    let moved = UpdateBuilder::new(DOMAIN, "foo")
        .message_id(2)
        .address("fd00::1".parse().unwrap())
        .service(ServiceSpec::new("inst", "_test._udp").port(4321).txt_entry("k=v"));
    harness.send(&build(moved, &key));
    assert_eq!(harness.server.proxy().outstanding(), 2);

    let pending = harness.dnssd.take_pending();
    assert_eq!(pending.len(), 5);
    for id in pending.iter().rev() {
        harness.server.handle_registered(*id, Ok(()), harness.now);
    }

    let order: Vec<u16> = harness
        .responses()
        .iter()
        .map(|response| response.message_id)
        .collect();
    assert_eq!(order, vec![1, 2]);
    assert_eq!(harness.host("foo").unwrap().services()[0].port(), 4321);
}

#[test]
fn stop_drops_in_flight_updates() {
    let mut harness = Harness::with_proxy();
    let key = new_key();

    harness.send(&build(registration("foo", 1), &key));
    harness.complete_registrations();
    harness.responses();

    harness.send(&build(registration("bar", 2), &new_key()));
    assert_eq!(harness.server.proxy().outstanding(), 1);

    harness
        .server
        .handle_publisher_event(PublisherEvent::EntryRemoved, harness.now);

    assert!(harness.responses().is_empty());
    assert!(harness.server.registry().is_empty());
    assert_eq!(harness.server.proxy().outstanding(), 0);
    assert!(harness.dnssd.hosts().is_empty());
    assert!(harness.dnssd.services().is_empty());
}
