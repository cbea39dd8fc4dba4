// crates/testkit-tls-probe/src/server.rs
// ============================================================================
// Module: Handshake Probe Server
// Description: One-shot TLS listener that checks a plaintext preamble.
// Purpose: Confirm a client under test completes a handshake and speaks first.
// Dependencies: rustls, thiserror
// ============================================================================

//! ## Overview
//! The probe moves through `Listening -> Accepted -> HandshakeComplete ->
//! Verified`, one consuming transition per state:
//! [`ProbeServer::bind`], [`ProbeServer::accept`],
//! [`AcceptedConnection::complete_handshake`],
//! [`EstablishedSession::read_preamble`] and [`Preamble::verify`].
//! [`ProbeServer::serve_once`] runs them in order for exactly one client.
//!
//! ## Invariants
//! - One connection is served; the listener is dropped after accept.
//! - One absolute deadline, started at accept, bounds the handshake and the
//!   preamble read together. The socket timeout is re-armed with the remaining
//!   budget before every single blocking read, so a client trickling bytes
//!   cannot extend it.
//! - Every failure is terminal and returned as a [`ProbeError`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io;
use std::io::Read;
use std::net::SocketAddr;
use std::net::TcpListener;
use std::net::TcpStream;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use rustls::ProtocolVersion;
use rustls::ServerConfig;
use rustls::ServerConnection;
use rustls::crypto::CryptoProvider;
use rustls::server::WebPkiClientVerifier;
use thiserror::Error;

use crate::config::ConfigError;
use crate::config::PREAMBLE_LEN;
use crate::config::PROTOCOL_SIGNATURE;
use crate::config::ProbeConfig;
use crate::events::ProbeEvent;
use crate::events::ProbeObserver;
use crate::events::ProbeStage;
use crate::resolver::IdentityError;
use crate::resolver::SingleCertResolver;
use crate::resolver::load_client_roots;

// ============================================================================
// SECTION: TLS Configuration
// ============================================================================

/// Builds the immutable server configuration for a probe.
///
/// # Errors
///
/// Returns [`ProbeError`] when the identity or client trust store cannot be
/// loaded, or the TLS stack rejects the version set.
pub fn build_server_config(config: &ProbeConfig) -> Result<Arc<ServerConfig>, ProbeError> {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let resolver = SingleCertResolver::load(&config.cert_path, &config.key_path, &provider)?;
    let versions = config.versions.protocol_versions();
    let builder = ServerConfig::builder_with_provider(Arc::clone(&provider))
        .with_protocol_versions(&versions)
        .map_err(|err| ConfigError::Tls(err.to_string()))?;

    let builder = match &config.client_ca_path {
        Some(path) => {
            let roots = load_client_roots(path)?;
            let verifier = client_verifier(roots, provider)?;
            builder.with_client_cert_verifier(verifier)
        }
        None => builder.with_no_client_auth(),
    };
    Ok(Arc::new(builder.with_cert_resolver(Arc::new(resolver))))
}

/// Builds a verifier that requires a client certificate chaining to `roots`.
fn client_verifier(
    roots: rustls::RootCertStore,
    provider: Arc<CryptoProvider>,
) -> Result<Arc<dyn rustls::server::danger::ClientCertVerifier>, ProbeError> {
    WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider)
        .build()
        .map_err(|err| ProbeError::Config(ConfigError::Tls(err.to_string())))
}

// ============================================================================
// SECTION: Deadline
// ============================================================================

/// Absolute deadline applied to blocking socket reads.
#[derive(Debug, Clone, Copy)]
pub struct ReadDeadline {
    /// Instant after which reads fail.
    expires_at: Instant,
}

impl ReadDeadline {
    /// Starts a deadline `budget` from now.
    #[must_use]
    pub fn start(budget: Duration) -> Self {
        Self {
            expires_at: Instant::now() + budget,
        }
    }

    /// Time left before expiry; zero once expired.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    /// Re-arms the socket read timeout with the remaining budget.
    ///
    /// # Errors
    ///
    /// Returns a `TimedOut` I/O error once the deadline has passed.
    pub fn arm(&self, socket: &TcpStream) -> io::Result<()> {
        let remaining = self.remaining();
        if remaining.is_zero() {
            return Err(io::Error::from(io::ErrorKind::TimedOut));
        }
        socket.set_read_timeout(Some(remaining))
    }
}

/// Returns true for the error kinds a read timeout surfaces as.
fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

// ============================================================================
// SECTION: Listening
// ============================================================================

/// A bound probe awaiting its one connection.
#[derive(Debug)]
pub struct ProbeServer {
    /// Bound listener.
    listener: TcpListener,
    /// Bound local address.
    local_addr: SocketAddr,
    /// Certificate file being served.
    cert_path: PathBuf,
    /// Shared TLS configuration.
    tls: Arc<ServerConfig>,
    /// Budget applied after accept.
    read_deadline: Duration,
}

impl ProbeServer {
    /// Loads the identity, builds the TLS configuration and binds the listener.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError`] on invalid configuration, unreadable or
    /// mismatched certificate material, or when the address cannot be bound.
    pub fn bind(config: &ProbeConfig) -> Result<Self, ProbeError> {
        config.validate()?;
        let tls = build_server_config(config)?;
        let listener = TcpListener::bind(config.bind.as_str()).map_err(|source| {
            ProbeError::Bind {
                addr: config.bind.clone(),
                source,
            }
        })?;
        let local_addr = listener.local_addr().map_err(|source| ProbeError::Bind {
            addr: config.bind.clone(),
            source,
        })?;
        Ok(Self {
            listener,
            local_addr,
            cert_path: config.cert_path.clone(),
            tls,
            read_deadline: config.read_deadline,
        })
    }

    /// Bound local address; reflects the real port when binding port 0.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Blocks until one client connects and starts the read deadline.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Accept`] when accepting fails.
    pub fn accept(self) -> Result<AcceptedConnection, ProbeError> {
        let (socket, peer) = self.listener.accept().map_err(ProbeError::Accept)?;
        let deadline = ReadDeadline::start(self.read_deadline);
        let connection = ServerConnection::new(self.tls)
            .map_err(|err| ProbeError::Config(ConfigError::Tls(err.to_string())))?;
        Ok(AcceptedConnection {
            transport: Transport {
                conn: connection,
                socket,
                deadline,
            },
            peer,
        })
    }

    /// Serves exactly one client and reports each transition to `observer`.
    ///
    /// # Errors
    ///
    /// Returns the first [`ProbeError`] of any stage.
    pub fn serve_once(self, observer: &dyn ProbeObserver) -> Result<SocketAddr, ProbeError> {
        observer.record(&ProbeEvent::Listening {
            addr: self.local_addr,
            cert_path: self.cert_path.clone(),
        });
        let accepted = self.accept()?;
        let peer = accepted.peer();
        observer.record(&ProbeEvent::Connected {
            peer,
        });

        let session = accepted.complete_handshake()?;
        observer.record(&ProbeEvent::HandshakeComplete {
            peer,
            protocol: session.protocol_version(),
        });

        session.read_preamble()?.verify()?;
        observer.record(&ProbeEvent::Verified {
            peer,
        });
        Ok(peer)
    }
}

// ============================================================================
// SECTION: Transport
// ============================================================================

/// Server-side TLS state over the accepted socket, driven one read at a time.
#[derive(Debug)]
struct Transport {
    /// TLS state machine.
    conn: ServerConnection,
    /// Accepted socket.
    socket: TcpStream,
    /// Deadline started at accept.
    deadline: ReadDeadline,
}

impl Transport {
    /// Writes every pending TLS record.
    fn flush(&mut self) -> io::Result<()> {
        while self.conn.wants_write() {
            self.conn.write_tls(&mut self.socket)?;
        }
        Ok(())
    }

    /// Performs exactly one blocking socket read under the deadline and
    /// processes the records it carried. Returns zero when the peer closed.
    fn fetch(&mut self) -> io::Result<usize> {
        let count = loop {
            self.deadline.arm(&self.socket)?;
            match self.conn.read_tls(&mut self.socket) {
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                other => break other?,
            }
        };
        if count == 0 {
            return Ok(0);
        }
        if let Err(err) = self.conn.process_new_packets() {
            // Best effort: the alert describing the failure may still go out.
            let _alert = self.flush();
            return Err(io::Error::new(io::ErrorKind::InvalidData, err));
        }
        Ok(count)
    }
}

// ============================================================================
// SECTION: Accepted
// ============================================================================

/// A connected client before the TLS handshake.
#[derive(Debug)]
pub struct AcceptedConnection {
    /// TLS state over the accepted socket.
    transport: Transport,
    /// Client address.
    peer: SocketAddr,
}

impl AcceptedConnection {
    /// Client address.
    #[must_use]
    pub const fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Drives the TLS handshake to completion under the deadline.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::DeadlineExceeded`] when the budget runs out and
    /// [`ProbeError::Handshake`] on any TLS failure or early disconnect.
    pub fn complete_handshake(mut self) -> Result<EstablishedSession, ProbeError> {
        let transport = &mut self.transport;
        while transport.conn.is_handshaking() {
            transport.flush().map_err(|err| handshake_error(&err))?;
            if !transport.conn.wants_read() {
                return Err(ProbeError::Handshake("handshake stalled".to_string()));
            }
            if transport.fetch().map_err(|err| handshake_error(&err))? == 0 {
                return Err(ProbeError::Handshake("peer closed the connection".to_string()));
            }
        }
        transport.flush().map_err(|err| handshake_error(&err))?;
        Ok(EstablishedSession {
            transport: self.transport,
            peer: self.peer,
        })
    }
}

/// Classifies an I/O error raised while handshaking.
fn handshake_error(err: &io::Error) -> ProbeError {
    if is_timeout(err) {
        ProbeError::DeadlineExceeded {
            stage: ProbeStage::Handshake,
            received: 0,
        }
    } else {
        ProbeError::Handshake(err.to_string())
    }
}

// ============================================================================
// SECTION: Established
// ============================================================================

/// A client with a completed TLS handshake.
#[derive(Debug)]
pub struct EstablishedSession {
    /// TLS state over the accepted socket.
    transport: Transport,
    /// Client address.
    peer: SocketAddr,
}

impl EstablishedSession {
    /// Client address.
    #[must_use]
    pub const fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Negotiated protocol version.
    #[must_use]
    pub fn protocol_version(&self) -> Option<ProtocolVersion> {
        self.transport.conn.protocol_version()
    }

    /// Reads exactly [`PREAMBLE_LEN`] plaintext bytes, then closes the session.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::DeadlineExceeded`] when the budget runs out,
    /// [`ProbeError::ShortPreamble`] when the client closes early, and
    /// [`ProbeError::Read`] on other I/O failures.
    pub fn read_preamble(mut self) -> Result<Preamble, ProbeError> {
        let mut bytes = [0_u8; PREAMBLE_LEN];
        let mut received = 0;
        while received < PREAMBLE_LEN {
            let outcome = self.transport.conn.reader().read(&mut bytes[received..]);
            match outcome {
                Ok(0) => {
                    return Err(ProbeError::ShortPreamble {
                        received,
                    });
                }
                Ok(count) => received += count,
                Err(pending) if pending.kind() == io::ErrorKind::WouldBlock => {
                    let fetched = self.transport.fetch().map_err(|err| read_error(err, received))?;
                    if fetched == 0 {
                        return Err(ProbeError::ShortPreamble {
                            received,
                        });
                    }
                }
                Err(err) => return Err(read_error(err, received)),
            }
        }
        self.close();
        Ok(Preamble {
            bytes,
        })
    }

    /// Sends close_notify on a best-effort basis.
    fn close(&mut self) {
        self.transport.conn.send_close_notify();
        let _sent = self.transport.flush();
    }
}

/// Classifies an I/O error raised while reading the preamble.
fn read_error(err: io::Error, received: usize) -> ProbeError {
    if is_timeout(&err) {
        ProbeError::DeadlineExceeded {
            stage: ProbeStage::Preamble,
            received,
        }
    } else if err.kind() == io::ErrorKind::UnexpectedEof {
        ProbeError::ShortPreamble {
            received,
        }
    } else {
        ProbeError::Read(err)
    }
}

// ============================================================================
// SECTION: Preamble
// ============================================================================

/// The fixed-length plaintext preamble sent by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preamble {
    /// Received bytes.
    bytes: [u8; PREAMBLE_LEN],
}

impl Preamble {
    /// Wraps received bytes.
    #[must_use]
    pub const fn new(bytes: [u8; PREAMBLE_LEN]) -> Self {
        Self {
            bytes,
        }
    }

    /// Received bytes.
    #[must_use]
    pub const fn bytes(&self) -> &[u8; PREAMBLE_LEN] {
        &self.bytes
    }

    /// Checks the leading protocol signature.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::BadSignature`] when the first four bytes differ
    /// from [`PROTOCOL_SIGNATURE`].
    pub fn verify(&self) -> Result<(), ProbeError> {
        let mut found = [0_u8; 4];
        found.copy_from_slice(&self.bytes[..PROTOCOL_SIGNATURE.len()]);
        if found == PROTOCOL_SIGNATURE {
            Ok(())
        } else {
            Err(ProbeError::BadSignature {
                found,
            })
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Handshake probe errors; all are terminal.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The configuration is invalid or rejected by the TLS stack.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The certificate or key could not be loaded.
    #[error(transparent)]
    Identity(#[from] IdentityError),
    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Configured address.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Accepting the connection failed.
    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),
    /// The TLS handshake failed.
    #[error("tls handshake failed: {0}")]
    Handshake(String),
    /// The read deadline passed.
    #[error("deadline exceeded during {stage} after {received} bytes")]
    DeadlineExceeded {
        /// Stage that timed out.
        stage: ProbeStage,
        /// Preamble bytes received before the deadline.
        received: usize,
    },
    /// The client closed before sending the full preamble.
    #[error("client closed after {received} of {expected} preamble bytes", expected = PREAMBLE_LEN)]
    ShortPreamble {
        /// Preamble bytes received.
        received: usize,
    },
    /// Reading the preamble failed.
    #[error("failed to read preamble: {0}")]
    Read(#[source] io::Error),
    /// The preamble does not start with the protocol signature.
    #[error(
        "unexpected protocol signature {found:02X?}, expected {expected:02X?}",
        expected = PROTOCOL_SIGNATURE
    )]
    BadSignature {
        /// Leading bytes received.
        found: [u8; 4],
    },
}

// ============================================================================
// SECTION: Tests
// ============================================================================
