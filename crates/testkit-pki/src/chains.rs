// crates/testkit-pki/src/chains.rs
// ============================================================================
// Module: Chain Orchestrator
// Description: Fixed plan of trust chains written as one fixture set.
// Purpose: Regenerate every root, leaf, and client identity in one pass.
// Dependencies: time, thiserror
// ============================================================================

//! ## Overview
//! [`generate_fixture_set`] walks [`FIXTURE_CHAINS`] and writes, for each
//! root, its key, its certificate at the path its [`RootPlacement`] dictates,
//! and one server leaf per requested validity window, all bound to
//! [`FIXTURE_HOSTNAME`]. Two self-signed client identities are added for
//! mutual TLS scenarios; each key is written twice, once in the clear and once
//! encrypted under the identity's password.
//!
//! ## Invariants
//! - Chains share no keys; every root and leaf is freshly keyed.
//! - Only roots placed as trusted or custom reach the driver install paths.
//! - Existing files are overwritten, so a re-run regenerates the whole set.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use thiserror::Error;
use time::Duration;
use time::OffsetDateTime;

use crate::encoder::EncodeError;
use crate::encoder::write_certificate;
use crate::encoder::write_encrypted_private_key;
use crate::encoder::write_private_key;
use crate::factory::FactoryError;
use crate::factory::RootAuthority;
use crate::factory::Validity;
use crate::factory::generate_client;
use crate::factory::generate_root;
use crate::layout::FixtureLayout;
use crate::layout::RootPlacement;
use crate::layout::client_key_password;
use crate::layout::leaf_stem;

// ============================================================================
// SECTION: Plan
// ============================================================================

/// Hostname every server leaf is bound to.
pub const FIXTURE_HOSTNAME: &str = "thehost";

/// Number of client identities in the fixture set.
pub const CLIENT_IDENTITY_COUNT: u8 = 2;

/// Validity window requested for a server leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafWindow {
    /// One hour ago until twenty years from now.
    Valid,
    /// Twenty years ago until one hour ago.
    Expired,
}

/// One trust chain of the fixture set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainPlan {
    /// Root name; also the file stem of its key and certificate.
    pub root_name: &'static str,
    /// Where the root certificate is published.
    pub placement: RootPlacement,
    /// Server leaves to issue under the root.
    pub leaves: &'static [LeafWindow],
}

/// Trust chains of the fixture set, generated in order.
pub const FIXTURE_CHAINS: &[ChainPlan] = &[
    ChainPlan {
        root_name: "trustedRoot",
        placement: RootPlacement::Trusted,
        leaves: &[LeafWindow::Valid, LeafWindow::Expired],
    },
    ChainPlan {
        root_name: "customRoot",
        placement: RootPlacement::Custom,
        leaves: &[LeafWindow::Valid, LeafWindow::Expired],
    },
    ChainPlan {
        root_name: "customRoot2",
        placement: RootPlacement::Custom,
        leaves: &[LeafWindow::Valid],
    },
    ChainPlan {
        root_name: "untrustedRoot",
        placement: RootPlacement::Untrusted,
        leaves: &[LeafWindow::Valid, LeafWindow::Expired],
    },
];

// ============================================================================
// SECTION: Time Anchors
// ============================================================================

/// Twenty years, counted as 365-day years.
const TWENTY_YEARS: Duration = Duration::days(365 * 20);

/// Timestamps every validity window is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidityAnchors {
    /// Reference instant.
    pub now: OffsetDateTime,
    /// `now + 20 years`.
    pub twenty_years_ahead: OffsetDateTime,
    /// `now - 20 years`.
    pub twenty_years_ago: OffsetDateTime,
    /// `now - 1 hour`.
    pub an_hour_ago: OffsetDateTime,
}

impl ValidityAnchors {
    /// Derives the anchors from `now`.
    #[must_use]
    pub fn at(now: OffsetDateTime) -> Self {
        Self {
            now,
            twenty_years_ahead: now + TWENTY_YEARS,
            twenty_years_ago: now - TWENTY_YEARS,
            an_hour_ago: now - Duration::hours(1),
        }
    }

    /// Derives the anchors from the current UTC time.
    #[must_use]
    pub fn now() -> Self {
        Self::at(OffsetDateTime::now_utc())
    }

    /// Window of roots and valid leaves.
    #[must_use]
    pub const fn valid(&self) -> Validity {
        Validity::new(self.an_hour_ago, self.twenty_years_ahead)
    }

    /// Window of expired leaves.
    #[must_use]
    pub const fn expired(&self) -> Validity {
        Validity::new(self.twenty_years_ago, self.an_hour_ago)
    }

    /// Window for a requested leaf kind.
    #[must_use]
    pub const fn window(&self, leaf: LeafWindow) -> Validity {
        match leaf {
            LeafWindow::Valid => self.valid(),
            LeafWindow::Expired => self.expired(),
        }
    }
}

// ============================================================================
// SECTION: Manifest
// ============================================================================

/// Kind of a written fixture file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureKind {
    /// Root private key.
    RootKey,
    /// Root certificate with its placement.
    RootCertificate(RootPlacement),
    /// Server leaf private key.
    ServerKey,
    /// Server leaf certificate.
    ServerCertificate,
    /// Client identity private key.
    ClientKey,
    /// Client identity private key encrypted under its password.
    EncryptedClientKey,
    /// Client identity certificate.
    ClientCertificate,
    /// Client certificate copy trusted by the server.
    TrustedClientCertificate,
}

/// One written fixture file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFixture {
    /// What the file holds.
    pub kind: FixtureKind,
    /// Where it was written.
    pub path: PathBuf,
}

/// Every file written by one orchestrator run, in write order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixtureManifest {
    /// Written files.
    pub files: Vec<WrittenFixture>,
}

impl FixtureManifest {
    /// Records a written file.
    fn record(&mut self, kind: FixtureKind, path: PathBuf) {
        self.files.push(WrittenFixture {
            kind,
            path,
        });
    }

    /// Returns the paths of files of the given kind.
    pub fn paths_of(&self, kind: FixtureKind) -> impl Iterator<Item = &PathBuf> {
        self.files.iter().filter(move |file| file.kind == kind).map(|file| &file.path)
    }
}

// ============================================================================
// SECTION: Orchestration
// ============================================================================

/// Generates and writes the complete fixture set.
///
/// # Errors
///
/// Returns [`ChainError`] on the first key, signing, or write failure; files
/// written before the failure are left in place.
pub fn generate_fixture_set(
    layout: &FixtureLayout,
    anchors: &ValidityAnchors,
) -> Result<FixtureManifest, ChainError> {
    let mut manifest = FixtureManifest::default();
    for plan in FIXTURE_CHAINS {
        generate_chain(layout, anchors, plan, &mut manifest)?;
    }
    for index in 1..=CLIENT_IDENTITY_COUNT {
        generate_client_identity(layout, anchors, index, &mut manifest)?;
    }
    Ok(manifest)
}

/// Generates one root and its server leaves.
fn generate_chain(
    layout: &FixtureLayout,
    anchors: &ValidityAnchors,
    plan: &ChainPlan,
    manifest: &mut FixtureManifest,
) -> Result<(), ChainError> {
    let root = generate_root(anchors.valid(), plan.root_name)?;
    write_root(layout, plan, &root, manifest)?;

    for leaf in plan.leaves {
        let expired = *leaf == LeafWindow::Expired;
        let common_name = leaf_stem(plan.root_name, FIXTURE_HOSTNAME, expired);
        let issued = root.issue_server(anchors.window(*leaf), &common_name, FIXTURE_HOSTNAME)?;

        let key_path = layout.server_key(plan.root_name, FIXTURE_HOSTNAME, expired);
        write_private_key(&key_path, issued.key())?;
        manifest.record(FixtureKind::ServerKey, key_path);

        let cert_path = layout.server_certificate(plan.root_name, FIXTURE_HOSTNAME, expired);
        write_certificate(&cert_path, issued.der())?;
        manifest.record(FixtureKind::ServerCertificate, cert_path);
    }
    Ok(())
}

/// Writes a root's key and certificate.
fn write_root(
    layout: &FixtureLayout,
    plan: &ChainPlan,
    root: &RootAuthority,
    manifest: &mut FixtureManifest,
) -> Result<(), ChainError> {
    let key_path = layout.root_key(plan.root_name);
    write_private_key(&key_path, root.key())?;
    manifest.record(FixtureKind::RootKey, key_path);

    let cert_path = layout.root_certificate(plan.root_name, plan.placement);
    write_certificate(&cert_path, root.der())?;
    manifest.record(FixtureKind::RootCertificate(plan.placement), cert_path);
    Ok(())
}

/// Generates the `index`-th client identity and its server-side trusted copy.
fn generate_client_identity(
    layout: &FixtureLayout,
    anchors: &ValidityAnchors,
    index: u8,
    manifest: &mut FixtureManifest,
) -> Result<(), ChainError> {
    let client = generate_client(anchors.valid(), &format!("client{index}"))?;

    let key_path = layout.client_key(index);
    write_private_key(&key_path, client.key())?;
    manifest.record(FixtureKind::ClientKey, key_path);

    let encrypted_path = layout.client_key_with_password(index);
    write_encrypted_private_key(&encrypted_path, client.key(), &client_key_password(index))?;
    manifest.record(FixtureKind::EncryptedClientKey, encrypted_path);

    for (kind, path) in [
        (FixtureKind::ClientCertificate, layout.client_certificate(index)),
        (FixtureKind::TrustedClientCertificate, layout.client_certificate_on_server(index)),
    ] {
        write_certificate(&path, client.der())?;
        manifest.record(kind, path);
    }
    Ok(())
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Fixture set generation errors.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Key generation or signing failed.
    #[error(transparent)]
    Factory(#[from] FactoryError),
    /// A fixture file could not be written.
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

// ============================================================================
// SECTION: Tests
// ============================================================================
