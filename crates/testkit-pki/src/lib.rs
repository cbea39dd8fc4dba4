// crates/testkit-pki/src/lib.rs
// ============================================================================
// Module: TLS Testkit PKI Library
// Description: Certificate chain fixtures for TLS client test suites.
// Purpose: Generate roots, server leaves, and client identities as PEM files.
// Dependencies: p256, pem, rand, rcgen, time
// ============================================================================

//! ## Overview
//! The factory signs P-256 certificates, the encoder writes them as PEM, and
//! the chain orchestrator produces the fixed fixture set a TLS driver test
//! harness installs: trusted, custom, and untrusted roots with valid and
//! expired server leaves for one hostname.
//! Invariants:
//! - Every certificate is freshly keyed and serialled on every run.
//! - Untrusted roots never land in a trust-install directory.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod chains;
pub mod encoder;
pub mod factory;
pub mod layout;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use chains::ChainError;
pub use chains::ChainPlan;
pub use chains::FIXTURE_CHAINS;
pub use chains::FIXTURE_HOSTNAME;
pub use chains::FixtureKind;
pub use chains::FixtureManifest;
pub use chains::LeafWindow;
pub use chains::ValidityAnchors;
pub use chains::WrittenFixture;
pub use chains::generate_fixture_set;
pub use encoder::EncodeError;
pub use encoder::write_certificate;
pub use encoder::write_encrypted_private_key;
pub use encoder::write_private_key;
pub use factory::FactoryError;
pub use factory::IssuedCertificate;
pub use factory::RootAuthority;
pub use factory::Validity;
pub use factory::generate_client;
pub use factory::generate_root;
pub use factory::generate_server;
pub use layout::FixtureLayout;
pub use layout::LayoutError;
pub use layout::RootPlacement;
pub use layout::client_key_password;
