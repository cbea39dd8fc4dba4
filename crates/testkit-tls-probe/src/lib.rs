// crates/testkit-tls-probe/src/lib.rs
// ============================================================================
// Module: TLS Testkit Handshake Probe Library
// Description: One-shot TLS endpoint for driver handshake tests.
// Purpose: Verify a client completes a handshake and sends the protocol preamble.
// Dependencies: rustls, rustls-pki-types
// ============================================================================

//! ## Overview
//! The probe serves a single certificate to a single client, restricted to a
//! configured protocol version range, and checks the first plaintext bytes
//! the client sends against a fixed protocol signature.
//! Invariants:
//! - Exactly one connection is served.
//! - The same certificate is presented regardless of the requested name.
//! - The handshake and preamble read share one deadline.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod events;
pub mod resolver;
pub mod server;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::ConfigError;
pub use config::DEFAULT_BIND;
pub use config::DEFAULT_READ_DEADLINE;
pub use config::PREAMBLE_LEN;
pub use config::PROTOCOL_SIGNATURE;
pub use config::ProbeConfig;
pub use config::TlsVersionRange;
pub use events::NoopObserver;
pub use events::ProbeEvent;
pub use events::ProbeObserver;
pub use events::ProbeStage;
pub use resolver::IdentityError;
pub use resolver::SingleCertResolver;
pub use server::AcceptedConnection;
pub use server::EstablishedSession;
pub use server::Preamble;
pub use server::ProbeError;
pub use server::ProbeServer;
pub use server::ReadDeadline;
