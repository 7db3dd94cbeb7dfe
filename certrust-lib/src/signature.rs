//! Signature capability used by the trust engine.
//!
//! The engine never does signature math itself. A [`SignatureVerifier`] is
//! handed to the validator at construction time; the default
//! [`X509SignatureVerifier`] delegates to `x509-parser`'s `verify` feature.

use crate::oid;
use crate::verify::RevocationList;
use crate::Certificate;
use x509_parser::error::X509Error;
use x509_parser::prelude::*;
use x509_parser::revocation_list::CertificateRevocationList;

/// Why a signature did not verify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureFailure {
    /// The key does not match the signature (wrong key, or a key type that
    /// cannot have produced this signature algorithm).
    Mismatch,
    /// Any other failure: unsupported algorithm, undecodable key, ...
    Other(String),
}

impl std::fmt::Display for SignatureFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignatureFailure::Mismatch => write!(f, "signature does not match key"),
            SignatureFailure::Other(reason) => write!(f, "{}", reason),
        }
    }
}

/// Verifies certificate and CRL signatures against a DER-encoded
/// SubjectPublicKeyInfo.
pub trait SignatureVerifier: Send + Sync {
    fn verify_certificate(
        &self,
        cert: &Certificate,
        issuer_key: &[u8],
    ) -> Result<(), SignatureFailure>;

    fn verify_crl(&self, crl: &RevocationList, issuer_key: &[u8]) -> Result<(), SignatureFailure>;
}

/// Default verifier backed by `x509-parser` (ring underneath).
#[derive(Debug, Clone, Copy, Default)]
pub struct X509SignatureVerifier;

impl SignatureVerifier for X509SignatureVerifier {
    fn verify_certificate(
        &self,
        cert: &Certificate,
        issuer_key: &[u8],
    ) -> Result<(), SignatureFailure> {
        let (_, x509) = X509Certificate::from_der(cert.der())
            .map_err(|e| SignatureFailure::Other(format!("certificate: {}", e)))?;
        let spki = parse_key(issuer_key)?;

        if !key_fits_algorithm(
            &x509.signature_algorithm.algorithm.to_id_string(),
            &spki.algorithm.algorithm.to_id_string(),
        ) {
            return Err(SignatureFailure::Mismatch);
        }

        x509.verify_signature(Some(&spki)).map_err(map_x509_error)
    }

    fn verify_crl(&self, crl: &RevocationList, issuer_key: &[u8]) -> Result<(), SignatureFailure> {
        let (_, parsed) = CertificateRevocationList::from_der(crl.der())
            .map_err(|e| SignatureFailure::Other(format!("CRL: {}", e)))?;
        let spki = parse_key(issuer_key)?;

        if !key_fits_algorithm(
            &parsed.signature_algorithm.algorithm.to_id_string(),
            &spki.algorithm.algorithm.to_id_string(),
        ) {
            return Err(SignatureFailure::Mismatch);
        }

        parsed.verify_signature(&spki).map_err(map_x509_error)
    }
}

fn parse_key(der: &[u8]) -> Result<SubjectPublicKeyInfo<'_>, SignatureFailure> {
    SubjectPublicKeyInfo::from_der(der)
        .map(|(_, spki)| spki)
        .map_err(|e| SignatureFailure::Other(format!("public key: {}", e)))
}

fn map_x509_error(e: X509Error) -> SignatureFailure {
    match e {
        X509Error::SignatureVerificationError => SignatureFailure::Mismatch,
        other => SignatureFailure::Other(other.to_string()),
    }
}

/// Whether a key of type `key_oid` can have produced a signature of
/// algorithm `sig_oid`. Unknown families are left to the backend.
fn key_fits_algorithm(sig_oid: &str, key_oid: &str) -> bool {
    if sig_oid.starts_with(oid::PKCS1_ARC) {
        key_oid == oid::RSA_ENCRYPTION || key_oid == oid::RSASSA_PSS
    } else if sig_oid.starts_with(oid::ECDSA_SIG_ARC) {
        key_oid == oid::EC_PUBLIC_KEY
    } else if sig_oid == oid::ED25519 || sig_oid == oid::ED448 {
        key_oid == sig_oid
    } else {
        true
    }
}
