// crates/testkit-tls-probe/src/events.rs
// ============================================================================
// Module: Probe Events
// Description: Lifecycle notifications emitted by the handshake probe.
// Purpose: Let callers report progress without coupling the probe to stdout.
// Dependencies: rustls
// ============================================================================

//! ## Overview
//! The probe reports each successful state transition to a [`ProbeObserver`].
//! The command-line binary prints them; tests pass [`NoopObserver`].
//! Failures are not events: they are returned as errors.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use rustls::ProtocolVersion;

// ============================================================================
// SECTION: Stages
// ============================================================================

/// Deadline-bounded stage of a probe connection.
///
/// # Invariants
/// - Variants are stable for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStage {
    /// TLS handshake.
    Handshake,
    /// Plaintext preamble read.
    Preamble,
}

impl ProbeStage {
    /// Returns a stable label for the stage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Handshake => "handshake",
            Self::Preamble => "preamble",
        }
    }
}

impl fmt::Display for ProbeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Events
// ============================================================================

/// Probe lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeEvent {
    /// The listener is bound and ready for its one connection.
    Listening {
        /// Bound local address.
        addr: SocketAddr,
        /// Certificate file being served.
        cert_path: PathBuf,
    },
    /// A client connected.
    Connected {
        /// Client address.
        peer: SocketAddr,
    },
    /// The TLS handshake finished.
    HandshakeComplete {
        /// Client address.
        peer: SocketAddr,
        /// Negotiated protocol version.
        protocol: Option<ProtocolVersion>,
    },
    /// The preamble carried the expected signature.
    Verified {
        /// Client address.
        peer: SocketAddr,
    },
}

/// Human-readable name of a negotiated protocol version.
#[must_use]
pub fn protocol_label(protocol: Option<ProtocolVersion>) -> String {
    match protocol {
        Some(ProtocolVersion::TLSv1_3) => "TLS 1.3".to_string(),
        Some(ProtocolVersion::TLSv1_2) => "TLS 1.2".to_string(),
        Some(other) => format!("0x{:04x}", u16::from(other)),
        None => "unknown".to_string(),
    }
}

// ============================================================================
// SECTION: Observer
// ============================================================================

/// Sink for probe lifecycle events.
pub trait ProbeObserver {
    /// Records one event.
    fn record(&self, event: &ProbeEvent);
}

/// No-op observer.
///
/// # Invariants
/// - Events are intentionally discarded.
pub struct NoopObserver;

impl ProbeObserver for NoopObserver {
    fn record(&self, _event: &ProbeEvent) {}
}

// ============================================================================
// SECTION: Tests
// ============================================================================
