// crates/testkit-tls-probe/src/resolver.rs
// ============================================================================
// Module: Single Certificate Resolver
// Description: Loads one certificate/key pair and serves it for every hello.
// Purpose: Present the same identity regardless of the requested server name.
// Dependencies: rustls, rustls-pki-types, thiserror
// ============================================================================

//! ## Overview
//! [`SingleCertResolver`] owns the certificate chain and signing key loaded
//! at startup and hands out the same [`CertifiedKey`] for every client
//! hello, ignoring SNI. [`load_client_roots`] builds the trust store used
//! when client certificates are required.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use rustls::RootCertStore;
use rustls::crypto::CryptoProvider;
use rustls::server::ClientHello;
use rustls::server::ResolvesServerCert;
use rustls::sign::CertifiedKey;
use rustls_pki_types::CertificateDer;
use rustls_pki_types::PrivateKeyDer;
use rustls_pki_types::pem::PemObject;
use thiserror::Error;

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Certificate resolver that always returns the one loaded identity.
#[derive(Debug)]
pub struct SingleCertResolver {
    /// Chain and signing key served for every connection.
    certified: Arc<CertifiedKey>,
}

impl SingleCertResolver {
    /// Loads the chain at `cert_path` and the key at `key_path`.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] when either file is unreadable or malformed,
    /// or when the key does not match the leaf certificate.
    pub fn load(
        cert_path: &Path,
        key_path: &Path,
        provider: &CryptoProvider,
    ) -> Result<Self, IdentityError> {
        let chain = load_certificates(cert_path)?;
        let key = PrivateKeyDer::from_pem_file(key_path).map_err(|err| IdentityError::Pem {
            path: key_path.to_path_buf(),
            reason: err.to_string(),
        })?;
        let certified = CertifiedKey::from_der(chain, key, provider).map_err(|err| {
            IdentityError::Mismatch {
                cert: cert_path.to_path_buf(),
                key: key_path.to_path_buf(),
                reason: err.to_string(),
            }
        })?;
        Ok(Self {
            certified: Arc::new(certified),
        })
    }

    /// Returns the served chain and key.
    #[must_use]
    pub fn certified_key(&self) -> Arc<CertifiedKey> {
        Arc::clone(&self.certified)
    }
}

impl ResolvesServerCert for SingleCertResolver {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        Some(self.certified_key())
    }
}

// ============================================================================
// SECTION: Loaders
// ============================================================================

/// Reads every certificate in a PEM file, in file order.
///
/// # Errors
///
/// Returns [`IdentityError`] when the file is unreadable, malformed, or holds
/// no certificate.
pub fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, IdentityError> {
    let pem_error = |err: rustls_pki_types::pem::Error| IdentityError::Pem {
        path: path.to_path_buf(),
        reason: err.to_string(),
    };
    let certs = CertificateDer::pem_file_iter(path)
        .map_err(pem_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(pem_error)?;
    if certs.is_empty() {
        return Err(IdentityError::Empty {
            path: path.to_path_buf(),
        });
    }
    Ok(certs)
}

/// Builds a trust store from every certificate in a PEM file.
///
/// # Errors
///
/// Returns [`IdentityError`] when the file cannot be loaded or a certificate
/// is not a usable trust anchor.
pub fn load_client_roots(path: &Path) -> Result<RootCertStore, IdentityError> {
    let mut roots = RootCertStore::empty();
    for cert in load_certificates(path)? {
        roots.add(cert).map_err(|err| IdentityError::Anchor {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
    }
    Ok(roots)
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Certificate and key loading errors.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// A PEM file could not be read or decoded.
    #[error("failed to load {}: {reason}", .path.display())]
    Pem {
        /// Offending file.
        path: PathBuf,
        /// Decoder diagnostic.
        reason: String,
    },
    /// A certificate file holds no certificate.
    #[error("no certificate found in {}", .path.display())]
    Empty {
        /// Offending file.
        path: PathBuf,
    },
    /// The private key does not sign for the leaf certificate.
    #[error("key {} does not match certificate {}: {reason}", .key.display(), .cert.display())]
    Mismatch {
        /// Certificate file.
        cert: PathBuf,
        /// Key file.
        key: PathBuf,
        /// TLS stack diagnostic.
        reason: String,
    },
    /// A certificate could not be used as a trust anchor.
    #[error("unusable trust anchor in {}: {reason}", .path.display())]
    Anchor {
        /// Offending file.
        path: PathBuf,
        /// TLS stack diagnostic.
        reason: String,
    },
}

// ============================================================================
// SECTION: Tests
// ============================================================================
