// crates/testkit-pki/src/factory.rs
// ============================================================================
// Module: Key and Certificate Factory
// Description: P-256 key generation, serial numbers, and X.509 signing.
// Purpose: Produce root, server, and client certificates for TLS fixtures.
// Dependencies: rcgen, rand, time, thiserror
// ============================================================================

//! ## Overview
//! The factory creates fresh ECDSA P-256 key pairs and signs certificate
//! templates with them. Roots are self-signed certificate authorities; server
//! leaves are signed by a root's template and key and carry exactly one DNS
//! subject alternative name. Client identities are self-signed end entities
//! used for mutual TLS fixtures.
//!
//! ## Invariants
//! - Every certificate gets a fresh key and a fresh 128-bit random serial.
//! - Validity windows are taken as given; an inverted or past window is how
//!   expired fixtures are produced.
//! - Random-source and signing failures surface as [`FactoryError`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use rand::RngCore;
use rand::rngs::OsRng;
use rcgen::BasicConstraints;
use rcgen::CertificateParams;
use rcgen::DistinguishedName;
use rcgen::DnType;
use rcgen::ExtendedKeyUsagePurpose;
use rcgen::IsCa;
use rcgen::Issuer;
use rcgen::KeyPair;
use rcgen::KeyUsagePurpose;
use rcgen::PKCS_ECDSA_P256_SHA256;
use rcgen::SanType;
use rcgen::SerialNumber;
use rcgen::string::Ia5String;
use thiserror::Error;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Validity window of a certificate.
///
/// # Invariants
/// - No ordering between `not_before` and `not_after` is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validity {
    /// Start of the validity window.
    pub not_before: OffsetDateTime,
    /// End of the validity window.
    pub not_after: OffsetDateTime,
}

impl Validity {
    /// Creates a validity window from its two bounds.
    #[must_use]
    pub const fn new(not_before: OffsetDateTime, not_after: OffsetDateTime) -> Self {
        Self {
            not_before,
            not_after,
        }
    }

    /// Returns true when `instant` falls inside the window (bounds inclusive).
    #[must_use]
    pub fn contains(&self, instant: OffsetDateTime) -> bool {
        self.not_before <= instant && instant <= self.not_after
    }
}

/// A self-signed certificate authority.
///
/// # Invariants
/// - `der` is the self-signed encoding of `template` under `key`.
pub struct RootAuthority {
    /// Template the root was signed from; reused as the issuer for leaves.
    template: CertificateParams,
    /// Root signing key.
    key: KeyPair,
    /// DER-encoded self-signed certificate.
    der: Vec<u8>,
}

impl RootAuthority {
    /// Returns the certificate template used as issuer description.
    #[must_use]
    pub const fn template(&self) -> &CertificateParams {
        &self.template
    }

    /// Returns the root private key.
    #[must_use]
    pub const fn key(&self) -> &KeyPair {
        &self.key
    }

    /// Returns the DER-encoded root certificate.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Issues a server certificate chained to this root.
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError`] when key generation or signing fails.
    pub fn issue_server(
        &self,
        validity: Validity,
        common_name: &str,
        dns_name: &str,
    ) -> Result<IssuedCertificate, FactoryError> {
        generate_server(&self.template, &self.key, validity, common_name, dns_name)
    }
}

/// A signed end-entity certificate and its private key.
pub struct IssuedCertificate {
    /// Leaf private key.
    key: KeyPair,
    /// DER-encoded signed certificate.
    der: Vec<u8>,
}

impl IssuedCertificate {
    /// Returns the leaf private key.
    #[must_use]
    pub const fn key(&self) -> &KeyPair {
        &self.key
    }

    /// Returns the DER-encoded certificate.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }
}

// ============================================================================
// SECTION: Keys and Serials
// ============================================================================

/// Generates a fresh ECDSA P-256 key pair.
///
/// # Errors
///
/// Returns [`FactoryError::KeyGeneration`] when the crypto provider fails.
pub fn new_key_pair() -> Result<KeyPair, FactoryError> {
    KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256)
        .map_err(|err| FactoryError::KeyGeneration(err.to_string()))
}

/// Draws a uniformly random serial number in `[0, 2^128)`.
///
/// # Errors
///
/// Returns [`FactoryError::Random`] when the OS random source fails.
pub fn new_serial_number() -> Result<u128, FactoryError> {
    let mut bytes = [0_u8; 16];
    OsRng.try_fill_bytes(&mut bytes).map_err(|err| FactoryError::Random(err.to_string()))?;
    Ok(u128::from_be_bytes(bytes))
}

// ============================================================================
// SECTION: Templates
// ============================================================================

/// Builds the template of a certificate-signing root.
///
/// # Errors
///
/// Returns [`FactoryError::Random`] when no serial number can be drawn.
pub fn root_template(
    validity: Validity,
    common_name: &str,
) -> Result<CertificateParams, FactoryError> {
    let mut params = base_template(validity, common_name)?;
    params.key_usages = vec![KeyUsagePurpose::KeyCertSign];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    Ok(params)
}

/// Builds the template of a server leaf bound to a single DNS name.
///
/// # Errors
///
/// Returns [`FactoryError`] when no serial can be drawn or `dns_name` is not
/// a valid IA5 string.
pub fn server_template(
    validity: Validity,
    common_name: &str,
    dns_name: &str,
) -> Result<CertificateParams, FactoryError> {
    let mut params = base_template(validity, common_name)?;
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature, KeyUsagePurpose::KeyEncipherment];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
    params.is_ca = IsCa::ExplicitNoCa;
    let san = Ia5String::try_from(dns_name.to_string()).map_err(|err| {
        FactoryError::InvalidDnsName {
            name: dns_name.to_string(),
            reason: err.to_string(),
        }
    })?;
    params.subject_alt_names = vec![SanType::DnsName(san)];
    Ok(params)
}

/// Builds the template of a client identity used for mutual TLS.
///
/// # Errors
///
/// Returns [`FactoryError::Random`] when no serial number can be drawn.
pub fn client_template(
    validity: Validity,
    common_name: &str,
) -> Result<CertificateParams, FactoryError> {
    let mut params = base_template(validity, common_name)?;
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature, KeyUsagePurpose::KeyEncipherment];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
    params.is_ca = IsCa::ExplicitNoCa;
    Ok(params)
}

/// Fields shared by every template.
fn base_template(
    validity: Validity,
    common_name: &str,
) -> Result<CertificateParams, FactoryError> {
    let mut params = CertificateParams::default();
    params.serial_number = Some(serial_number(new_serial_number()?));
    params.not_before = validity.not_before;
    params.not_after = validity.not_after;
    params.distinguished_name = distinguished_name(common_name);
    Ok(params)
}

/// Encodes a 128-bit value as an X.509 serial number.
fn serial_number(value: u128) -> SerialNumber {
    SerialNumber::from_slice(&value.to_be_bytes())
}

/// Builds a subject holding only a common name.
fn distinguished_name(common_name: &str) -> DistinguishedName {
    let mut name = DistinguishedName::new();
    name.push(DnType::CommonName, common_name);
    name
}

// ============================================================================
// SECTION: Signing
// ============================================================================

/// Generates a self-signed root certificate authority.
///
/// # Errors
///
/// Returns [`FactoryError`] when key generation, serial selection, or signing
/// fails.
pub fn generate_root(
    validity: Validity,
    common_name: &str,
) -> Result<RootAuthority, FactoryError> {
    let key = new_key_pair()?;
    let template = root_template(validity, common_name)?;
    let cert = template.self_signed(&key).map_err(|err| FactoryError::Signing(err.to_string()))?;
    Ok(RootAuthority {
        der: cert.der().to_vec(),
        template,
        key,
    })
}

/// Generates a server leaf signed by the given issuer.
///
/// # Errors
///
/// Returns [`FactoryError`] when key generation, template construction, or
/// signing fails.
pub fn generate_server(
    issuer_template: &CertificateParams,
    issuer_key: &KeyPair,
    validity: Validity,
    common_name: &str,
    dns_name: &str,
) -> Result<IssuedCertificate, FactoryError> {
    let key = new_key_pair()?;
    let params = server_template(validity, common_name, dns_name)?;
    let issuer = Issuer::from_params(issuer_template, issuer_key);
    let cert =
        params.signed_by(&key, &issuer).map_err(|err| FactoryError::Signing(err.to_string()))?;
    Ok(IssuedCertificate {
        der: cert.der().to_vec(),
        key,
    })
}

/// Generates a self-signed client identity.
///
/// # Errors
///
/// Returns [`FactoryError`] when key generation, serial selection, or signing
/// fails.
pub fn generate_client(
    validity: Validity,
    common_name: &str,
) -> Result<IssuedCertificate, FactoryError> {
    let key = new_key_pair()?;
    let params = client_template(validity, common_name)?;
    let cert = params.self_signed(&key).map_err(|err| FactoryError::Signing(err.to_string()))?;
    Ok(IssuedCertificate {
        der: cert.der().to_vec(),
        key,
    })
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Key and certificate factory errors.
#[derive(Debug, Error)]
pub enum FactoryError {
    /// The secure random source failed.
    #[error("random source failure: {0}")]
    Random(String),
    /// Key pair generation failed.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),
    /// A subject alternative name could not be encoded.
    #[error("invalid dns name {name}: {reason}")]
    InvalidDnsName {
        /// Rejected DNS name.
        name: String,
        /// Encoder diagnostic.
        reason: String,
    },
    /// Certificate signing failed.
    #[error("certificate signing failed: {0}")]
    Signing(String),
}

// ============================================================================
// SECTION: Tests
// ============================================================================
