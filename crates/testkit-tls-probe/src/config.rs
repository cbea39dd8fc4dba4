// crates/testkit-tls-probe/src/config.rs
// ============================================================================
// Module: Probe Configuration
// Description: Validated settings for the one-shot handshake probe.
// Purpose: Turn raw command-line values into a checked probe configuration.
// Dependencies: rustls, thiserror
// ============================================================================

//! ## Overview
//! Protocol versions are configured as minor offsets from SSL 3.0, so minor
//! `n` names the wire version `0x0300 | (n + 1)`: 0 is TLS 1.0 and 3 is
//! TLS 1.3. The TLS stack implements TLS 1.2 and TLS 1.3 only, so the
//! effective version set is the configured range narrowed to those two.
//!
//! ## Invariants
//! - A [`TlsVersionRange`] always enables at least one protocol version.
//! - A [`ProbeConfig`] always carries a non-zero read deadline.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use rustls::SupportedProtocolVersion;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default listen address.
pub const DEFAULT_BIND: &str = "0.0.0.0:6666";

/// Default minimum minor version offset.
pub const DEFAULT_MIN_MINOR: u8 = 0;

/// Default maximum minor version offset.
pub const DEFAULT_MAX_MINOR: u8 = 2;

/// Highest minor version offset with a defined wire version.
pub const MAX_KNOWN_MINOR: u8 = 3;

/// Default budget for the handshake and preamble read together.
pub const DEFAULT_READ_DEADLINE: Duration = Duration::from_secs(1);

/// Number of plaintext bytes read before the signature check.
pub const PREAMBLE_LEN: usize = 20;

/// Signature the preamble must start with.
pub const PROTOCOL_SIGNATURE: [u8; 4] = [0x60, 0x60, 0xB0, 0x17];

/// Minor offset of TLS 1.2.
const TLS12_MINOR: u8 = 2;

/// Minor offset of TLS 1.3.
const TLS13_MINOR: u8 = 3;

// ============================================================================
// SECTION: Version Range
// ============================================================================

/// Inclusive range of accepted protocol versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsVersionRange {
    /// Lowest accepted minor offset.
    min: u8,
    /// Highest accepted minor offset.
    max: u8,
}

impl TlsVersionRange {
    /// Validates a minor offset range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an offset is unknown, the range is
    /// inverted, or no version the TLS stack implements falls inside it.
    pub const fn new(min: u8, max: u8) -> Result<Self, ConfigError> {
        if min > MAX_KNOWN_MINOR {
            return Err(ConfigError::UnknownMinor {
                minor: min,
            });
        }
        if max > MAX_KNOWN_MINOR {
            return Err(ConfigError::UnknownMinor {
                minor: max,
            });
        }
        if min > max {
            return Err(ConfigError::InvertedRange {
                min,
                max,
            });
        }
        if max < TLS12_MINOR {
            return Err(ConfigError::NoSupportedVersion {
                min,
                max,
            });
        }
        Ok(Self {
            min,
            max,
        })
    }

    /// Lowest accepted minor offset as configured.
    #[must_use]
    pub const fn min(&self) -> u8 {
        self.min
    }

    /// Highest accepted minor offset as configured.
    #[must_use]
    pub const fn max(&self) -> u8 {
        self.max
    }

    /// Wire versions of the configured bounds.
    #[must_use]
    pub fn wire_bounds(&self) -> (u16, u16) {
        (wire_version(self.min), wire_version(self.max))
    }

    /// Returns true when the configured range includes `minor`.
    #[must_use]
    pub const fn includes(&self, minor: u8) -> bool {
        self.min <= minor && minor <= self.max
    }

    /// Protocol versions enabled on the TLS stack, newest first.
    #[must_use]
    pub fn protocol_versions(&self) -> Vec<&'static SupportedProtocolVersion> {
        let mut versions = Vec::with_capacity(2);
        if self.includes(TLS13_MINOR) {
            versions.push(&rustls::version::TLS13);
        }
        if self.includes(TLS12_MINOR) {
            versions.push(&rustls::version::TLS12);
        }
        versions
    }
}

impl Default for TlsVersionRange {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_MINOR,
            max: DEFAULT_MAX_MINOR,
        }
    }
}

/// Wire version of a minor offset.
#[must_use]
pub fn wire_version(minor: u8) -> u16 {
    0x0300 | (u16::from(minor) + 1)
}

// ============================================================================
// SECTION: Probe Configuration
// ============================================================================

/// Validated probe settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Listen address, resolved at bind time.
    pub bind: String,
    /// PEM file holding the certificate chain, leaf first.
    pub cert_path: PathBuf,
    /// PEM file holding the private key.
    pub key_path: PathBuf,
    /// Accepted protocol versions.
    pub versions: TlsVersionRange,
    /// PEM file of client certificates to require; `None` disables client auth.
    pub client_ca_path: Option<PathBuf>,
    /// Budget for the handshake and preamble read together.
    pub read_deadline: Duration,
}

impl ProbeConfig {
    /// Creates a configuration with default versions and deadline.
    #[must_use]
    pub fn new(bind: impl Into<String>, cert_path: PathBuf, key_path: PathBuf) -> Self {
        Self {
            bind: bind.into(),
            cert_path,
            key_path,
            versions: TlsVersionRange::default(),
            client_ca_path: None,
            read_deadline: DEFAULT_READ_DEADLINE,
        }
    }

    /// Replaces the accepted protocol versions.
    #[must_use]
    pub fn with_versions(mut self, versions: TlsVersionRange) -> Self {
        self.versions = versions;
        self
    }

    /// Requires client certificates chaining to the PEM file at `path`.
    #[must_use]
    pub fn with_client_ca(mut self, path: PathBuf) -> Self {
        self.client_ca_path = Some(path);
        self
    }

    /// Replaces the read deadline.
    #[must_use]
    pub fn with_read_deadline(mut self, deadline: Duration) -> Self {
        self.read_deadline = deadline;
        self
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the bind address is empty or the read
    /// deadline is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind.trim().is_empty() {
            return Err(ConfigError::EmptyBind);
        }
        if self.read_deadline.is_zero() {
            return Err(ConfigError::ZeroDeadline);
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Probe configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A minor offset has no defined wire version.
    #[error("unknown tls minor version {minor} (expected 0..=3)")]
    UnknownMinor {
        /// Rejected offset.
        minor: u8,
    },
    /// The minimum offset exceeds the maximum.
    #[error("tls minor version range is inverted: min {min} > max {max}")]
    InvertedRange {
        /// Configured minimum.
        min: u8,
        /// Configured maximum.
        max: u8,
    },
    /// The range holds only versions the TLS stack does not implement.
    #[error("tls minor version range {min}..={max} enables no supported version (TLS 1.2 or 1.3)")]
    NoSupportedVersion {
        /// Configured minimum.
        min: u8,
        /// Configured maximum.
        max: u8,
    },
    /// The bind address is empty.
    #[error("bind address is empty")]
    EmptyBind,
    /// The read deadline is zero.
    #[error("read deadline must be greater than zero")]
    ZeroDeadline,
    /// The TLS stack rejected the settings.
    #[error("tls configuration rejected: {0}")]
    Tls(String),
}

// ============================================================================
// SECTION: Tests
// ============================================================================
