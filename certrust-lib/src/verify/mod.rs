//! Trust chain validation.
//!
//! [`TrustChainValidator`] ties the pieces together: it classifies the
//! candidate pool, builds a certification path from the leaf to a
//! self-signed anchor, then checks every non-anchor certificate of that path
//! against the CRLs published at its distribution points.
//!
//! ```text
//! Start -> Classified -> PathBuilt -> RevocationChecked -> Verified
//!                   \            \                    \
//!                    `------------`--------------------`-> Rejected
//! ```

mod chain;
mod classify;
mod crl;
mod fetch;
mod points;
mod revocation;
mod trust_store;
mod tsl;

use crate::signature::{SignatureVerifier, X509SignatureVerifier};
use crate::{Certificate, TrustError};
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use chain::{CertificationPath, PathBuilder};
pub use classify::{Partition, TrustClassifier};
pub use crl::{parse_pem_crl, RevocationList};
pub use fetch::{CrlFetcher, CrlSource};
pub use points::{crl_distribution_points, DistributionPoint, Scheme};
pub use revocation::{Revocation, RevocationChecker, RevocationStatus};
pub use trust_store::{find_system_ca_bundle, TrustAnchorSource};

pub(crate) use chain::MAX_CHAIN_DEPTH;
use fetch::{DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_MAX_CRL_SIZE};

/// Default number of concurrent CRL fetches.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Options controlling verification behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyOptions {
    /// Check the CRLs of every non-anchor certificate on the path.
    pub check_revocation: bool,
    /// Deadline for each CRL or TSL download, in seconds.
    pub fetch_timeout_secs: u64,
    /// Largest CRL accepted, in bytes.
    pub max_crl_size: usize,
    /// Worker threads used for CRL fetches.
    pub max_workers: usize,
    /// Longest path explored, leaf and anchor included.
    pub max_path_depth: usize,
    /// Only trust CRLs issued and signed by the certificate's issuer.
    pub verify_crl_signatures: bool,
    /// Where [`TrustChainValidator::verify_with_anchor_source`] gets anchors.
    pub anchor_source: Option<TrustAnchorSource>,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            check_revocation: true,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            max_crl_size: DEFAULT_MAX_CRL_SIZE,
            max_workers: DEFAULT_MAX_WORKERS,
            max_path_depth: MAX_CHAIN_DEPTH,
            verify_crl_signatures: false,
            anchor_source: None,
        }
    }
}

impl VerifyOptions {
    /// Read options from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, TrustError> {
        Ok(serde_json::from_str(json)?)
    }

    fn validate(&self) -> Result<(), TrustError> {
        let invalid = |msg: &str| Err(TrustError::ConfigurationError(msg.to_string()));
        if self.fetch_timeout_secs == 0 {
            return invalid("fetch_timeout_secs must be at least 1");
        }
        if self.max_crl_size == 0 {
            return invalid("max_crl_size must be at least 1");
        }
        if self.max_workers == 0 {
            return invalid("max_workers must be at least 1");
        }
        if self.max_path_depth < 2 {
            return invalid("max_path_depth must allow at least a leaf and an anchor");
        }
        Ok(())
    }
}

/// One certificate of a verified path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathEntry {
    /// Position in the path (0 = leaf).
    pub depth: usize,
    /// Subject distinguished name.
    pub subject: String,
    /// Issuer distinguished name.
    pub issuer: String,
    /// Short human-readable name derived from CN, O, or OU.
    pub short_name: String,
    /// Serial number as colon-separated hex.
    pub serial: String,
    /// SHA-256 fingerprint.
    pub fingerprint: String,
    pub revocation: RevocationStatus,
}

/// A successfully verified certification path.
#[derive(Debug, Clone, Serialize)]
pub struct VerifiedPath {
    #[serde(skip)]
    path: CertificationPath,
    /// Subject of the trust anchor the path ends at.
    pub anchor: String,
    /// Leaf first, anchor last.
    pub entries: Vec<PathEntry>,
}

impl VerifiedPath {
    pub fn path(&self) -> &CertificationPath {
        &self.path
    }

    /// The trust anchor selected for the path.
    pub fn anchor_certificate(&self) -> &Certificate {
        self.path.anchor()
    }

    pub fn leaf(&self) -> &Certificate {
        self.path.leaf()
    }
}

impl std::fmt::Display for VerifiedPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Format: [short_name], [serial], OK
        if let Some(leaf) = self.entries.first() {
            write!(f, "{}, {}, ", leaf.short_name, leaf.serial)?;
        }
        write!(f, "OK")
    }
}

/// Outcome of [`TrustChainValidator::verify`].
pub type VerificationResult = Result<VerifiedPath, TrustError>;

/// Validates leaf certificates against a candidate pool.
///
/// The validator holds no per-call state and can be shared across threads.
#[derive(Clone)]
pub struct TrustChainValidator {
    options: VerifyOptions,
    verifier: Arc<dyn SignatureVerifier>,
    crl_source: Arc<dyn CrlSource>,
    pool: Arc<ThreadPool>,
}

impl std::fmt::Debug for TrustChainValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustChainValidator")
            .field("options", &self.options)
            .finish()
    }
}

impl TrustChainValidator {
    /// Create a validator with the default signature verifier and a network
    /// CRL fetcher.
    pub fn new(options: VerifyOptions) -> Result<Self, TrustError> {
        options.validate()?;
        let fetcher = CrlFetcher::with_max_size(options.fetch_timeout_secs, options.max_crl_size)?;
        let pool = revocation::worker_pool(options.max_workers)?;
        Ok(TrustChainValidator {
            options,
            verifier: Arc::new(X509SignatureVerifier),
            crl_source: Arc::new(fetcher),
            pool,
        })
    }

    /// Replace the signature verifier.
    pub fn with_verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Replace the CRL source.
    pub fn with_crl_source(mut self, source: Arc<dyn CrlSource>) -> Self {
        self.crl_source = source;
        self
    }

    pub fn options(&self) -> &VerifyOptions {
        &self.options
    }

    /// A revocation checker sharing this validator's pool and capabilities.
    pub fn revocation_checker(&self) -> RevocationChecker {
        RevocationChecker::with_pool(
            Arc::clone(&self.crl_source),
            Arc::clone(&self.verifier),
            Arc::clone(&self.pool),
        )
        .verify_crl_signatures(self.options.verify_crl_signatures)
    }

    /// Verify `leaf` against the candidates in `pool`.
    ///
    /// Self-signed members of `pool` are the trust anchors; everything else
    /// may serve as an intermediate.
    pub fn verify(&self, leaf: &Certificate, pool: &[Certificate]) -> VerificationResult {
        tracing::debug!(
            "verifying '{}' against {} candidate(s)",
            leaf.subject(),
            pool.len()
        );

        let classifier = TrustClassifier::new(self.verifier.as_ref());
        if classifier.is_self_signed(leaf)? {
            tracing::debug!("rejected: '{}' is self-signed", leaf.subject());
            return Err(TrustError::SelfSignedLeaf {
                subject: leaf.subject().to_oneline(),
            });
        }

        let partition = classifier.partition(pool)?;
        tracing::debug!("classified");

        let path = PathBuilder::new(self.verifier.as_ref())
            .with_max_depth(self.options.max_path_depth)
            .build(leaf, &partition.anchors, &partition.intermediates)?;
        tracing::debug!("path built, {} certificate(s)", path.len());

        let statuses = if self.options.check_revocation {
            let statuses = self.check_path(&path)?;
            tracing::debug!("revocation checked");
            statuses
        } else {
            vec![RevocationStatus::NotChecked; path.len()]
        };

        let entries = path
            .iter()
            .zip(statuses)
            .enumerate()
            .map(|(depth, (cert, revocation))| PathEntry {
                depth,
                subject: cert.subject().to_oneline(),
                issuer: cert.issuer().to_oneline(),
                short_name: cert.short_name(),
                serial: cert.serial_hex(),
                fingerprint: cert.fingerprint(),
                revocation,
            })
            .collect();

        tracing::debug!("verified '{}'", leaf.subject());
        Ok(VerifiedPath {
            anchor: path.anchor().subject().to_oneline(),
            path,
            entries,
        })
    }

    /// Like [`verify`](Self::verify), with the certificates of the configured
    /// [`TrustAnchorSource`] added to the pool.
    pub fn verify_with_anchor_source(
        &self,
        leaf: &Certificate,
        pool: &[Certificate],
    ) -> VerificationResult {
        let source = self.options.anchor_source.as_ref().ok_or_else(|| {
            TrustError::ConfigurationError("no trust anchor source configured".into())
        })?;
        let anchors = source.load(self.options.fetch_timeout_secs, self.options.max_crl_size)?;

        let mut candidates = Vec::with_capacity(pool.len() + anchors.len());
        candidates.extend_from_slice(pool);
        candidates.extend(anchors);
        self.verify(leaf, &candidates)
    }

    /// Revocation status of every certificate on the path, anchor last and
    /// always `NotChecked`. The first revoked certificate in path order
    /// rejects the whole path.
    fn check_path(&self, path: &CertificationPath) -> Result<Vec<RevocationStatus>, TrustError> {
        let checker = self.revocation_checker();
        let certs: Vec<&Certificate> = path.iter().collect();
        let links: Vec<(&Certificate, &Certificate)> =
            certs.iter().copied().zip(certs.iter().copied().skip(1)).collect();

        let results: Vec<Result<RevocationStatus, TrustError>> = self.pool.install(|| {
            links
                .par_iter()
                .map(|(cert, issuer)| checker.check_certificate_with_issuer(cert, Some(*issuer)))
                .collect()
        });

        let mut statuses = Vec::with_capacity(certs.len());
        for ((cert, _), result) in links.iter().zip(results) {
            let status = result?;
            if let RevocationStatus::Revoked(revocation) = &status {
                tracing::debug!("rejected: '{}' is revoked", cert.subject());
                return Err(TrustError::RevokedError {
                    subject: cert.subject().to_oneline(),
                    serial: cert.serial_hex(),
                    url: revocation.distribution_point.url().to_string(),
                    reason: revocation.reason.clone(),
                });
            }
            statuses.push(status);
        }
        statuses.push(RevocationStatus::NotChecked);
        Ok(statuses)
    }
}
