// crates/testkit-tls-probe/tests/common/mod.rs
// ============================================================================
// Module: Probe Test Helpers
// Description: Shared fixtures and TLS client helpers for probe tests.
// Purpose: Generate certificates and drive the probe like a client under test.
// Dependencies: testkit-pki, rustls, tempfile
// ============================================================================

#![allow(
    dead_code,
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only helpers shared across integration test crates."
)]

use std::io;
use std::io::Read;
use std::io::Write;
use std::net::SocketAddr;
use std::net::TcpStream;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rustls::ClientConfig;
use rustls::ClientConnection;
use rustls::RootCertStore;
use rustls::StreamOwned;
use rustls::SupportedProtocolVersion;
use rustls::pki_types::CertificateDer;
use rustls::pki_types::PrivateKeyDer;
use rustls::pki_types::ServerName;
use rustls::pki_types::pem::PemObject;
use tempfile::TempDir;
use testkit_pki::FIXTURE_HOSTNAME;
use testkit_pki::FixtureLayout;
use testkit_pki::RootPlacement;
use testkit_pki::ValidityAnchors;
use testkit_pki::generate_fixture_set;
use testkit_tls_probe::ProbeConfig;

/// Preamble a well-behaved client sends.
pub const GOOD_PREAMBLE: [u8; 20] =
    [0x60, 0x60, 0xB0, 0x17, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];

/// Generated fixture set kept alive for the duration of a test.
pub struct Fixtures {
    /// Scratch directory owning the files.
    _dir: TempDir,
    /// Layout of the generated files.
    pub layout: FixtureLayout,
}

impl Fixtures {
    /// Generates the full fixture set into a fresh scratch directory.
    pub fn generate() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = FixtureLayout::new(dir.path());
        layout.prepare().expect("prepare");
        generate_fixture_set(&layout, &ValidityAnchors::now()).expect("generate");
        Self {
            _dir: dir,
            layout,
        }
    }

    /// Probe configuration serving the given leaf on an ephemeral port.
    pub fn probe_config(&self, chain: &str, expired: bool) -> ProbeConfig {
        ProbeConfig::new(
            "127.0.0.1:0",
            self.layout.server_certificate(chain, FIXTURE_HOSTNAME, expired),
            self.layout.server_key(chain, FIXTURE_HOSTNAME, expired),
        )
    }

    /// Trusted root certificate path.
    pub fn trusted_root(&self) -> PathBuf {
        self.layout.root_certificate("trustedRoot", RootPlacement::Trusted)
    }
}

/// Builds a client trusting `root` and offering `versions`.
pub fn client_config(
    root: &Path,
    versions: &[&'static SupportedProtocolVersion],
    identity: Option<(&Path, &Path)>,
) -> Arc<ClientConfig> {
    let mut roots = RootCertStore::empty();
    for cert in CertificateDer::pem_file_iter(root).expect("open root") {
        roots.add(cert.expect("root pem")).expect("add root");
    }
    let builder = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::aws_lc_rs::default_provider(),
    ))
    .with_protocol_versions(versions)
    .expect("versions")
    .with_root_certificates(roots);
    let config = match identity {
        Some((cert, key)) => {
            let chain = CertificateDer::pem_file_iter(cert)
                .expect("open client cert")
                .collect::<Result<Vec<_>, _>>()
                .expect("client cert pem");
            let key = PrivateKeyDer::from_pem_file(key).expect("client key pem");
            builder.with_client_auth_cert(chain, key).expect("client auth")
        }
        None => builder.with_no_client_auth(),
    };
    Arc::new(config)
}

/// Connects, sends `payload` over TLS, then waits for the server to close.
pub fn send_over_tls(addr: SocketAddr, config: Arc<ClientConfig>, payload: &[u8]) -> io::Result<()> {
    let mut stream = connect_tls(addr, config)?;
    stream.write_all(payload)?;
    stream.flush()?;
    let mut sink = [0_u8; 64];
    let _ = stream.read(&mut sink);
    Ok(())
}

/// Connects, sends `payload` over TLS, closes cleanly with close_notify, then
/// waits for the server to close.
pub fn send_and_close(addr: SocketAddr, config: Arc<ClientConfig>, payload: &[u8]) -> io::Result<()> {
    let mut stream = connect_tls(addr, config)?;
    stream.write_all(payload)?;
    stream.conn.send_close_notify();
    stream.flush()?;
    let mut sink = [0_u8; 64];
    let _ = stream.read(&mut sink);
    Ok(())
}

/// Completes a handshake, then sends `payload` one TLS record per byte with
/// `pause` between records. Stops quietly once the server hangs up.
pub fn trickle_over_tls(addr: SocketAddr, config: Arc<ClientConfig>, payload: &[u8], pause: Duration) {
    let Ok(mut stream) = connect_tls(addr, config) else {
        return;
    };
    for byte in payload {
        if stream.write_all(std::slice::from_ref(byte)).and_then(|()| stream.flush()).is_err() {
            return;
        }
        std::thread::sleep(pause);
    }
}

/// Sends `bytes` over plain TCP one at a time with `pause` between them.
/// Stops quietly once the server hangs up.
pub fn trickle_raw(addr: SocketAddr, bytes: &[u8], pause: Duration) {
    let Ok(mut tcp) = TcpStream::connect(addr) else {
        return;
    };
    for byte in bytes {
        if tcp.write_all(std::slice::from_ref(byte)).is_err() {
            return;
        }
        std::thread::sleep(pause);
    }
}

/// Opens a TLS client stream to the fixture hostname.
fn connect_tls(
    addr: SocketAddr,
    config: Arc<ClientConfig>,
) -> io::Result<StreamOwned<ClientConnection, TcpStream>> {
    let tcp = TcpStream::connect(addr)?;
    tcp.set_read_timeout(Some(Duration::from_secs(5)))?;
    let name = ServerName::try_from(FIXTURE_HOSTNAME).map_err(io::Error::other)?;
    let conn = ClientConnection::new(config, name).map_err(io::Error::other)?;
    Ok(StreamOwned::new(conn, tcp))
}
