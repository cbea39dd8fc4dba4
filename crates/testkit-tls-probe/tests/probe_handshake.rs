// crates/testkit-tls-probe/tests/probe_handshake.rs
// ============================================================================
// Module: Probe Handshake Tests
// Description: End-to-end handshake scenarios against generated fixtures.
// Purpose: Verify signature checks, deadlines, version floors, and client auth.
// Dependencies: testkit-tls-probe, testkit-pki, rustls
// ============================================================================
//! ## Overview
//! Each test binds a probe on an ephemeral port, drives it with a rustls
//! client on another thread, and asserts the probe's verdict.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use rustls::ProtocolVersion;
use rustls::version::TLS12;
use rustls::version::TLS13;
use testkit_tls_probe::NoopObserver;
use testkit_tls_probe::ProbeConfig;
use testkit_tls_probe::ProbeError;
use testkit_tls_probe::ProbeEvent;
use testkit_tls_probe::ProbeObserver;
use testkit_tls_probe::ProbeServer;
use testkit_tls_probe::ProbeStage;
use testkit_tls_probe::TlsVersionRange;

use crate::common::Fixtures;
use crate::common::GOOD_PREAMBLE;
use crate::common::client_config;
use crate::common::send_and_close;
use crate::common::send_over_tls;
use crate::common::trickle_over_tls;
use crate::common::trickle_raw;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Observer collecting every event.
#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<ProbeEvent>>,
}

impl ProbeObserver for RecordingObserver {
    fn record(&self, event: &ProbeEvent) {
        self.events.lock().expect("events lock").push(event.clone());
    }
}

/// Binds a probe and serves one client on a background thread.
fn spawn_probe(
    config: &ProbeConfig,
) -> (SocketAddr, thread::JoinHandle<(Result<SocketAddr, ProbeError>, Vec<ProbeEvent>)>) {
    let server = ProbeServer::bind(config).expect("bind");
    let addr = server.local_addr();
    let handle = thread::spawn(move || {
        let observer = RecordingObserver::default();
        let result = server.serve_once(&observer);
        (result, observer.events.into_inner().expect("events"))
    });
    (addr, handle)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn correct_preamble_is_verified() {
    let fixtures = Fixtures::generate();
    let (addr, handle) = spawn_probe(&fixtures.probe_config("trustedRoot", false));

    let client = client_config(&fixtures.trusted_root(), &[&TLS12], None);
    send_over_tls(addr, client, &GOOD_PREAMBLE).expect("client");

    let (result, events) = handle.join().expect("probe thread");
    let peer = result.expect("verified");
    assert!(matches!(events.first(), Some(ProbeEvent::Listening { addr: bound, .. }) if *bound == addr));
    assert!(events.contains(&ProbeEvent::HandshakeComplete {
        peer,
        protocol: Some(ProtocolVersion::TLSv1_2),
    }));
    assert_eq!(events.last(), Some(&ProbeEvent::Verified { peer }));
}

#[test]
fn wrong_signature_is_rejected() {
    let fixtures = Fixtures::generate();
    let (addr, handle) = spawn_probe(&fixtures.probe_config("trustedRoot", false));

    let mut preamble = [0_u8; 20];
    preamble[..4].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
    let client = client_config(&fixtures.trusted_root(), &[&TLS12], None);
    send_over_tls(addr, client, &preamble).expect("client");

    let (result, events) = handle.join().expect("probe thread");
    match result {
        Err(ProbeError::BadSignature { found }) => assert_eq!(found, [0xDE, 0xAD, 0xBE, 0xEF]),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(!events.iter().any(|event| matches!(event, ProbeEvent::Verified { .. })));
}

#[test]
fn short_preamble_hits_deadline() {
    let fixtures = Fixtures::generate();
    let config =
        fixtures.probe_config("trustedRoot", false).with_read_deadline(Duration::from_millis(300));
    let (addr, handle) = spawn_probe(&config);

    let client = client_config(&fixtures.trusted_root(), &[&TLS12], None);
    let _ = send_over_tls(addr, client, &GOOD_PREAMBLE[..4]);

    let (result, _) = handle.join().expect("probe thread");
    match result {
        Err(ProbeError::DeadlineExceeded { stage, received }) => {
            assert_eq!(stage, ProbeStage::Preamble);
            assert_eq!(received, 4);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn silent_client_times_out_during_handshake() {
    let fixtures = Fixtures::generate();
    let config =
        fixtures.probe_config("trustedRoot", false).with_read_deadline(Duration::from_millis(200));
    let server = ProbeServer::bind(&config).expect("bind");
    let addr = server.local_addr();
    let handle = thread::spawn(move || server.serve_once(&NoopObserver));

    let socket = std::net::TcpStream::connect(addr).expect("connect");
    let result = handle.join().expect("probe thread");
    drop(socket);
    assert!(matches!(
        result,
        Err(ProbeError::DeadlineExceeded { stage: ProbeStage::Handshake, received: 0 })
    ));
}

#[test]
fn slow_handshake_bytes_do_not_extend_deadline() {
    let fixtures = Fixtures::generate();
    let config =
        fixtures.probe_config("trustedRoot", false).with_read_deadline(Duration::from_millis(300));
    let (addr, handle) = spawn_probe(&config);

    // Handshake record header announcing 512 bytes, followed by a slow body.
    let mut bytes = vec![0x16, 0x03, 0x01, 0x02, 0x00];
    bytes.extend_from_slice(&[0_u8; 55]);
    let started = Instant::now();
    let client = thread::spawn(move || trickle_raw(addr, &bytes, Duration::from_millis(50)));

    let (result, _) = handle.join().expect("server thread");
    let elapsed = started.elapsed();
    assert!(matches!(
        result,
        Err(ProbeError::DeadlineExceeded { stage: ProbeStage::Handshake, received: 0 })
    ));
    assert!(elapsed < Duration::from_millis(1500), "connection held for {elapsed:?}");
    client.join().expect("client thread");
}

#[test]
fn slow_preamble_bytes_do_not_extend_deadline() {
    let fixtures = Fixtures::generate();
    let config =
        fixtures.probe_config("trustedRoot", false).with_read_deadline(Duration::from_millis(500));
    let (addr, handle) = spawn_probe(&config);

    let client_tls = client_config(&fixtures.trusted_root(), &[&TLS12], None);
    let started = Instant::now();
    let client = thread::spawn(move || {
        trickle_over_tls(addr, client_tls, &GOOD_PREAMBLE, Duration::from_millis(100));
    });

    let (result, _) = handle.join().expect("server thread");
    let elapsed = started.elapsed();
    match result {
        Err(ProbeError::DeadlineExceeded { stage, received }) => {
            assert_eq!(stage, ProbeStage::Preamble);
            assert!(received < GOOD_PREAMBLE.len(), "received {received} bytes");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(elapsed < Duration::from_millis(1500), "connection held for {elapsed:?}");
    client.join().expect("client thread");
}

#[test]
fn clean_close_before_full_preamble_is_short() {
    let fixtures = Fixtures::generate();
    let (addr, handle) = spawn_probe(&fixtures.probe_config("trustedRoot", false));

    let client = client_config(&fixtures.trusted_root(), &[&TLS12], None);
    send_and_close(addr, client, &GOOD_PREAMBLE[..4]).expect("client");

    let (result, events) = handle.join().expect("server thread");
    match result {
        Err(ProbeError::ShortPreamble { received }) => assert_eq!(received, 4),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(events.iter().any(|event| matches!(event, ProbeEvent::HandshakeComplete { .. })));
    assert!(!events.iter().any(|event| matches!(event, ProbeEvent::Verified { .. })));
}

#[test]
fn version_floor_above_client_maximum_fails_handshake() {
    let fixtures = Fixtures::generate();
    let config = fixtures
        .probe_config("trustedRoot", false)
        .with_versions(TlsVersionRange::new(3, 3).expect("range"));
    let (addr, handle) = spawn_probe(&config);

    let client = client_config(&fixtures.trusted_root(), &[&TLS12], None);
    assert!(send_over_tls(addr, client, &GOOD_PREAMBLE).is_err());

    let (result, _) = handle.join().expect("probe thread");
    assert!(matches!(result, Err(ProbeError::Handshake(_))), "unexpected result: {result:?}");
}

#[test]
fn tls13_is_negotiated_when_enabled() {
    let fixtures = Fixtures::generate();
    let config = fixtures
        .probe_config("trustedRoot", false)
        .with_versions(TlsVersionRange::new(0, 3).expect("range"));
    let (addr, handle) = spawn_probe(&config);

    let client = client_config(&fixtures.trusted_root(), &[&TLS13, &TLS12], None);
    send_over_tls(addr, client, &GOOD_PREAMBLE).expect("client");

    let (result, events) = handle.join().expect("probe thread");
    let peer = result.expect("verified");
    assert!(events.contains(&ProbeEvent::HandshakeComplete {
        peer,
        protocol: Some(ProtocolVersion::TLSv1_3),
    }));
}

#[test]
fn expired_leaf_is_refused_by_client() {
    let fixtures = Fixtures::generate();
    let (addr, handle) = spawn_probe(&fixtures.probe_config("trustedRoot", true));

    let client = client_config(&fixtures.trusted_root(), &[&TLS12], None);
    assert!(send_over_tls(addr, client, &GOOD_PREAMBLE).is_err());

    let (result, _) = handle.join().expect("probe thread");
    assert!(matches!(result, Err(ProbeError::Handshake(_))), "unexpected result: {result:?}");
}

#[test]
fn untrusted_chain_is_refused_by_client() {
    let fixtures = Fixtures::generate();
    let (addr, handle) = spawn_probe(&fixtures.probe_config("untrustedRoot", false));

    let client = client_config(&fixtures.trusted_root(), &[&TLS12], None);
    assert!(send_over_tls(addr, client, &GOOD_PREAMBLE).is_err());

    let (result, _) = handle.join().expect("probe thread");
    assert!(matches!(result, Err(ProbeError::Handshake(_))), "unexpected result: {result:?}");
}

#[test]
fn custom_chain_is_served() {
    let fixtures = Fixtures::generate();
    let config = fixtures.probe_config("customRoot2", false);
    let (addr, handle) = spawn_probe(&config);

    let root = fixtures.layout.root_certificate("customRoot2", testkit_pki::RootPlacement::Custom);
    let client = client_config(&root, &[&TLS12], None);
    send_over_tls(addr, client, &GOOD_PREAMBLE).expect("client");

    let (result, _) = handle.join().expect("probe thread");
    assert!(result.is_ok(), "unexpected result: {result:?}");
}

#[test]
fn client_certificate_is_required_when_configured() {
    let fixtures = Fixtures::generate();
    let config = fixtures
        .probe_config("trustedRoot", false)
        .with_client_ca(fixtures.layout.client_certificate_on_server(1));
    let (addr, handle) = spawn_probe(&config);

    let client = client_config(&fixtures.trusted_root(), &[&TLS12], None);
    let _ = send_over_tls(addr, client, &GOOD_PREAMBLE);

    let (result, _) = handle.join().expect("probe thread");
    assert!(matches!(result, Err(ProbeError::Handshake(_))), "unexpected result: {result:?}");
}

#[test]
fn trusted_client_certificate_is_accepted() {
    let fixtures = Fixtures::generate();
    let config = fixtures
        .probe_config("trustedRoot", false)
        .with_client_ca(fixtures.layout.client_certificate_on_server(1));
    let (addr, handle) = spawn_probe(&config);

    let cert = fixtures.layout.client_certificate(1);
    let key = fixtures.layout.client_key(1);
    let client = client_config(&fixtures.trusted_root(), &[&TLS12], Some((&cert, &key)));
    send_over_tls(addr, client, &GOOD_PREAMBLE).expect("client");

    let (result, _) = handle.join().expect("probe thread");
    assert!(result.is_ok(), "unexpected result: {result:?}");
}

#[test]
fn mismatched_key_fails_bind() {
    let fixtures = Fixtures::generate();
    let mut config = fixtures.probe_config("trustedRoot", false);
    config.key_path = fixtures.layout.server_key("customRoot", testkit_pki::FIXTURE_HOSTNAME, false);
    let err = ProbeServer::bind(&config).expect_err("mismatched key");
    assert!(matches!(err, ProbeError::Identity(_)));
}

#[test]
fn occupied_address_fails_bind() {
    let fixtures = Fixtures::generate();
    let first = ProbeServer::bind(&fixtures.probe_config("trustedRoot", false)).expect("bind");
    let mut config = fixtures.probe_config("trustedRoot", false);
    config.bind = first.local_addr().to_string();
    let err = ProbeServer::bind(&config).expect_err("address in use");
    assert!(matches!(err, ProbeError::Bind { .. }));
}
