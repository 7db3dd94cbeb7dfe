//! Revocation checking against the CRLs a certificate points to.
//!
//! Each distribution point is fetched on the checker's worker pool. The
//! outcome of the lowest-index point that decides anything wins, so results
//! do not depend on which download finishes first. Points that cannot be
//! fetched or decoded are logged and skipped.

use super::crl::RevocationList;
use super::fetch::CrlSource;
use super::points::{crl_distribution_points, DistributionPoint};
use crate::signature::{SignatureFailure, SignatureVerifier};
use crate::{Certificate, TrustError};
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::Serialize;
use std::sync::Arc;

/// Where and why a certificate was found revoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Revocation {
    /// The distribution point whose CRL lists the certificate.
    pub distribution_point: DistributionPoint,
    /// RFC 5280 reason name (`keyCompromise`, ...).
    pub reason: String,
}

/// Outcome of a revocation check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationStatus {
    /// No reachable CRL lists the certificate.
    NotRevoked,
    Revoked(Revocation),
    /// The certificate was not looked at (trust anchors, or checking is off).
    NotChecked,
}

impl RevocationStatus {
    pub fn is_revoked(&self) -> bool {
        matches!(self, RevocationStatus::Revoked(_))
    }
}

impl std::fmt::Display for RevocationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RevocationStatus::NotRevoked => write!(f, "not revoked"),
            RevocationStatus::Revoked(r) => {
                write!(f, "revoked ({}) by {}", r.reason, r.distribution_point)
            }
            RevocationStatus::NotChecked => write!(f, "not checked"),
        }
    }
}

/// Checks certificates against the CRLs published at their distribution
/// points.
#[derive(Clone)]
pub struct RevocationChecker {
    source: Arc<dyn CrlSource>,
    verifier: Arc<dyn SignatureVerifier>,
    verify_crl_signatures: bool,
    pool: Arc<ThreadPool>,
}

impl std::fmt::Debug for RevocationChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevocationChecker")
            .field("verify_crl_signatures", &self.verify_crl_signatures)
            .field("workers", &self.pool.current_num_threads())
            .finish()
    }
}

impl RevocationChecker {
    /// Create a checker with its own pool of `max_workers` threads.
    pub fn new(
        source: Arc<dyn CrlSource>,
        verifier: Arc<dyn SignatureVerifier>,
        max_workers: usize,
    ) -> Result<Self, TrustError> {
        Ok(Self::with_pool(source, verifier, worker_pool(max_workers)?))
    }

    pub(crate) fn with_pool(
        source: Arc<dyn CrlSource>,
        verifier: Arc<dyn SignatureVerifier>,
        pool: Arc<ThreadPool>,
    ) -> Self {
        RevocationChecker {
            source,
            verifier,
            verify_crl_signatures: false,
            pool,
        }
    }

    /// Require each CRL to be issued and signed by the certificate's issuer.
    /// CRLs failing that are skipped like unreachable ones.
    pub fn verify_crl_signatures(mut self, enabled: bool) -> Self {
        self.verify_crl_signatures = enabled;
        self
    }

    /// Check `cert` without knowing its issuer. CRL signatures are not
    /// checked on this path.
    pub fn check_certificate(&self, cert: &Certificate) -> Result<RevocationStatus, TrustError> {
        self.check_certificate_with_issuer(cert, None)
    }

    /// Check `cert`, using `issuer` to authenticate the CRLs when signature
    /// checking is enabled.
    pub fn check_certificate_with_issuer(
        &self,
        cert: &Certificate,
        issuer: Option<&Certificate>,
    ) -> Result<RevocationStatus, TrustError> {
        let points = crl_distribution_points(cert)?;
        if points.is_empty() {
            tracing::debug!("'{}' has no CRL distribution points", cert.subject());
            return Ok(RevocationStatus::NotRevoked);
        }

        let decided = self.pool.install(|| {
            points
                .par_iter()
                .find_map_first(|point| self.check_point(cert, issuer, point))
        });

        match decided {
            Some(Ok(revocation)) => {
                tracing::warn!(
                    "'{}' (serial {}) revoked by '{}': {}",
                    cert.subject(),
                    cert.serial_hex(),
                    revocation.distribution_point,
                    revocation.reason
                );
                Ok(RevocationStatus::Revoked(revocation))
            }
            Some(Err(e)) => Err(e),
            None => {
                tracing::debug!(
                    "'{}' not listed by any of {} CRL(s)",
                    cert.subject(),
                    points.len()
                );
                Ok(RevocationStatus::NotRevoked)
            }
        }
    }

    /// `None` means "keep looking": not listed here, or the point was
    /// unusable and skipped.
    fn check_point(
        &self,
        cert: &Certificate,
        issuer: Option<&Certificate>,
        point: &DistributionPoint,
    ) -> Option<Result<Revocation, TrustError>> {
        match self.lookup(cert, issuer, point) {
            Ok(Some(reason)) => Some(Ok(Revocation {
                distribution_point: point.clone(),
                reason: reason.to_string(),
            })),
            Ok(None) => {
                tracing::trace!("'{}' not listed by '{}'", cert.subject(), point);
                None
            }
            Err(e) if e.is_recoverable() => {
                tracing::warn!("skipping CRL distribution point '{}': {}", point, e);
                None
            }
            Err(e) => Some(Err(e)),
        }
    }

    fn lookup(
        &self,
        cert: &Certificate,
        issuer: Option<&Certificate>,
        point: &DistributionPoint,
    ) -> Result<Option<&'static str>, TrustError> {
        point.scheme()?;
        tracing::debug!("downloading CRL from '{}'", point);
        let crl = self.source.fetch(point)?;

        if self.verify_crl_signatures {
            match issuer {
                Some(issuer) => self.authenticate(&crl, issuer, point)?,
                None => tracing::debug!(
                    "no issuer known for '{}', CRL from '{}' taken as is",
                    cert.subject(),
                    point
                ),
            }
        }

        if crl.issuer() != cert.issuer() {
            tracing::debug!(
                "CRL from '{}' is issued by '{}', not by '{}'",
                point,
                crl.issuer(),
                cert.issuer()
            );
        }
        Ok(crl.lists(cert))
    }

    fn authenticate(
        &self,
        crl: &RevocationList,
        issuer: &Certificate,
        point: &DistributionPoint,
    ) -> Result<(), TrustError> {
        let unusable = |reason: String| TrustError::CrlError {
            url: point.url().to_string(),
            reason,
        };

        if crl.issuer() != issuer.subject() {
            return Err(unusable(format!(
                "CRL issued by '{}', expected '{}'",
                crl.issuer(),
                issuer.subject()
            )));
        }
        match self.verifier.verify_crl(crl, issuer.public_key()) {
            Ok(()) => Ok(()),
            Err(SignatureFailure::Mismatch) => Err(unusable(format!(
                "CRL signature does not verify with the key of '{}'",
                issuer.subject()
            ))),
            Err(SignatureFailure::Other(reason)) => Err(unusable(reason)),
        }
    }
}

/// Thread pool used for concurrent CRL fetches.
pub(crate) fn worker_pool(max_workers: usize) -> Result<Arc<ThreadPool>, TrustError> {
    if max_workers == 0 {
        return Err(TrustError::ConfigurationError(
            "max_workers must be at least 1".into(),
        ));
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(max_workers)
        .thread_name(|i| format!("certrust-crl-{}", i))
        .build()
        .map(Arc::new)
        .map_err(|e| TrustError::ConfigurationError(format!("failed to start worker pool: {}", e)))
}
