//! certrust-lib: Certification path building and CRL revocation checking.
//!
//! Given a leaf certificate and a pool of candidate certificates, decides
//! whether a certification path to a self-signed trust anchor exists and
//! whether any certificate on that path has been revoked by a CRL published
//! at one of its distribution points (HTTP, HTTPS, FTP or LDAP).

mod certificate;
mod fingerprint;
mod oid;
mod signature;
mod usage;
mod util;
pub mod verify;

pub use certificate::{parse_pem_chain, Certificate, DistinguishedName, KeyUsage};
pub use fingerprint::compute_fingerprint;
pub use signature::{SignatureFailure, SignatureVerifier, X509SignatureVerifier};
pub use usage::{has_critical_extension, is_non_repudiation_certificate, is_signature_certificate};
pub use verify::{
    crl_distribution_points, CertificationPath, CrlFetcher, CrlSource, DistributionPoint,
    Partition, PathBuilder, PathEntry, Revocation, RevocationChecker, RevocationList,
    RevocationStatus, Scheme, TrustAnchorSource, TrustChainValidator, TrustClassifier,
    VerificationResult, VerifiedPath, VerifyOptions,
};

/// Errors returned by certrust-lib.
#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    #[error("Invalid PEM format: {0}")]
    PemError(String),

    #[error("Invalid DER format: {0}")]
    DerError(String),

    #[error("Failed to parse certificate '{subject}': {reason}")]
    ParseError { subject: String, reason: String },

    #[error("Unusable CRL from '{url}': {reason}")]
    CrlError { url: String, reason: String },

    #[error("Failed to fetch CRL from '{url}': {reason}")]
    FetchError { url: String, reason: String },

    #[error("Fetching '{url}' timed out after {timeout_secs}s")]
    FetchTimeout { url: String, timeout_secs: u64 },

    #[error("No certification path for '{subject}': issuer '{issuer}' not found")]
    PathBuildError { subject: String, issuer: String },

    #[error("Certificate '{subject}' is self-signed")]
    SelfSignedLeaf { subject: String },

    #[error("Certificate '{subject}' (serial {serial}) is revoked by CRL at '{url}' (reason: {reason})")]
    RevokedError {
        subject: String,
        serial: String,
        url: String,
        reason: String,
    },

    #[error("Cannot download CRL from distribution point '{0}': unsupported scheme")]
    UnsupportedScheme(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Signature check failed for '{subject}': {reason}")]
    SignatureError { subject: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrustError {
    /// Whether the revocation checker may skip past this error and try the
    /// next distribution point.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TrustError::CrlError { .. }
                | TrustError::FetchError { .. }
                | TrustError::FetchTimeout { .. }
        )
    }
}
