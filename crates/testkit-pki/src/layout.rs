// crates/testkit-pki/src/layout.rs
// ============================================================================
// Module: Fixture Layout
// Description: On-disk path conventions for generated fixtures.
// Purpose: Keep driver trust-install paths apart from server fixture paths.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! All fixture paths hang off `<base>/certs`. Roots meant to be installed as
//! default trust anchors live under `driver/trusted`, roots exercised through
//! explicit custom-CA configuration under `driver/custom`, and server leaves
//! under `server`. Roots that must never be trusted are kept beside their key,
//! outside every install directory.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use thiserror::Error;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Where a root certificate is published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootPlacement {
    /// Installed among the driver's default trust anchors.
    Trusted,
    /// Installed for explicit custom-CA configuration only.
    Custom,
    /// Never installed; kept next to its key.
    Untrusted,
}

impl RootPlacement {
    /// Returns a stable label for the placement.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trusted => "trusted",
            Self::Custom => "custom",
            Self::Untrusted => "untrusted",
        }
    }
}

/// Path conventions rooted at `<base>/certs`.
///
/// # Invariants
/// - Paths are derived only; nothing is created unless [`FixtureLayout::prepare`]
///   is called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureLayout {
    /// The `certs` directory under the caller-supplied base.
    certs: PathBuf,
}

impl FixtureLayout {
    /// Creates the layout for `base`.
    #[must_use]
    pub fn new(base: &Path) -> Self {
        Self {
            certs: base.join("certs"),
        }
    }

    /// Returns the `certs` directory.
    #[must_use]
    pub fn certs_dir(&self) -> &Path {
        &self.certs
    }

    /// Directory of trust anchors installed by default on driver images.
    #[must_use]
    pub fn trusted_dir(&self) -> PathBuf {
        self.certs.join("driver").join("trusted")
    }

    /// Directory of roots configured explicitly as custom CAs.
    #[must_use]
    pub fn custom_dir(&self) -> PathBuf {
        self.certs.join("driver").join("custom")
    }

    /// Directory of server leaf keys and certificates.
    #[must_use]
    pub fn server_dir(&self) -> PathBuf {
        self.certs.join("server")
    }

    /// Directory of client certificates the server side trusts.
    #[must_use]
    pub fn server_trusted_clients_dir(&self) -> PathBuf {
        self.server_dir().join("bolt").join("trusted")
    }

    /// Every directory the fixture set writes into.
    #[must_use]
    pub fn directories(&self) -> Vec<PathBuf> {
        vec![
            self.certs.clone(),
            self.trusted_dir(),
            self.custom_dir(),
            self.server_dir(),
            self.server_trusted_clients_dir(),
        ]
    }

    /// Creates every fixture directory.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError`] when a directory cannot be created.
    pub fn prepare(&self) -> Result<(), LayoutError> {
        for dir in self.directories() {
            fs::create_dir_all(&dir).map_err(|source| LayoutError {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Private key path of a root.
    #[must_use]
    pub fn root_key(&self, root_name: &str) -> PathBuf {
        self.certs.join(format!("{root_name}.key"))
    }

    /// Certificate path of a root for the given placement.
    #[must_use]
    pub fn root_certificate(&self, root_name: &str, placement: RootPlacement) -> PathBuf {
        let file = format!("{root_name}.crt");
        match placement {
            RootPlacement::Trusted => self.trusted_dir().join(file),
            RootPlacement::Custom => self.custom_dir().join(file),
            RootPlacement::Untrusted => self.certs.join(file),
        }
    }

    /// Private key path of a server leaf.
    #[must_use]
    pub fn server_key(&self, chain_name: &str, hostname: &str, expired: bool) -> PathBuf {
        self.server_dir().join(format!("{}.key", leaf_stem(chain_name, hostname, expired)))
    }

    /// Certificate path of a server leaf.
    #[must_use]
    pub fn server_certificate(&self, chain_name: &str, hostname: &str, expired: bool) -> PathBuf {
        self.server_dir().join(format!("{}.pem", leaf_stem(chain_name, hostname, expired)))
    }

    /// Private key path of the `index`-th client identity.
    #[must_use]
    pub fn client_key(&self, index: u8) -> PathBuf {
        self.certs.join("driver").join(format!("privatekey{index}.pem"))
    }

    /// Password-protected private key path of the `index`-th client identity.
    #[must_use]
    pub fn client_key_with_password(&self, index: u8) -> PathBuf {
        self.certs
            .join("driver")
            .join(format!("privatekey{index}_with_{}.pem", client_key_password(index)))
    }

    /// Certificate path of the `index`-th client identity.
    #[must_use]
    pub fn client_certificate(&self, index: u8) -> PathBuf {
        self.certs.join("driver").join(format!("certificate{index}.pem"))
    }

    /// Server-side trusted copy of the `index`-th client certificate.
    #[must_use]
    pub fn client_certificate_on_server(&self, index: u8) -> PathBuf {
        self.server_trusted_clients_dir().join(format!("client{index}.pem"))
    }
}

/// Password protecting the `index`-th client identity's encrypted key.
#[must_use]
pub fn client_key_password(index: u8) -> String {
    format!("thepassword{index}")
}

/// File stem and common name of a server leaf: `<chain>_<host>[_expired]`.
#[must_use]
pub fn leaf_stem(chain_name: &str, hostname: &str, expired: bool) -> String {
    if expired {
        format!("{chain_name}_{hostname}_expired")
    } else {
        format!("{chain_name}_{hostname}")
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Fixture directory creation error.
#[derive(Debug, Error)]
#[error("failed to create {}: {source}", .path.display())]
pub struct LayoutError {
    /// Directory that could not be created.
    pub path: PathBuf,
    /// Underlying I/O error.
    #[source]
    pub source: std::io::Error,
}

// ============================================================================
// SECTION: Tests
// ============================================================================
