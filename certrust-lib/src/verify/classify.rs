//! Self-signed detection and candidate pool partitioning.

use crate::signature::{SignatureFailure, SignatureVerifier};
use crate::{Certificate, TrustError};
use std::collections::HashSet;

/// A candidate pool split into anchor candidates (self-signed) and
/// intermediate candidates (everything else).
#[derive(Debug, Clone, Default)]
pub struct Partition {
    pub anchors: Vec<Certificate>,
    pub intermediates: Vec<Certificate>,
}

/// Classifies certificates as self-signed or not.
#[derive(Clone, Copy)]
pub struct TrustClassifier<'a> {
    verifier: &'a dyn SignatureVerifier,
}

impl<'a> TrustClassifier<'a> {
    pub fn new(verifier: &'a dyn SignatureVerifier) -> Self {
        TrustClassifier { verifier }
    }

    /// Whether the certificate's own public key verifies its signature.
    ///
    /// A key mismatch means "not self-signed"; any other signature failure
    /// is an error, never a silent `false`.
    pub fn is_self_signed(&self, cert: &Certificate) -> Result<bool, TrustError> {
        match self.verifier.verify_certificate(cert, cert.public_key()) {
            Ok(()) => Ok(true),
            Err(SignatureFailure::Mismatch) => Ok(false),
            Err(SignatureFailure::Other(reason)) => Err(TrustError::SignatureError {
                subject: cert.subject().to_oneline(),
                reason,
            }),
        }
    }

    /// Split the pool in one pass. Repeated certificates are kept once.
    pub fn partition(&self, pool: &[Certificate]) -> Result<Partition, TrustError> {
        let mut seen: HashSet<&[u8]> = HashSet::with_capacity(pool.len());
        let mut partition = Partition::default();

        for cert in pool {
            if !seen.insert(cert.der()) {
                continue;
            }
            if self.is_self_signed(cert)? {
                tracing::trace!("'{}' is an anchor candidate", cert.subject());
                partition.anchors.push(cert.clone());
            } else {
                tracing::trace!("'{}' is an intermediate candidate", cert.subject());
                partition.intermediates.push(cert.clone());
            }
        }

        tracing::debug!(
            anchors = partition.anchors.len(),
            intermediates = partition.intermediates.len(),
            "candidate pool partitioned"
        );
        Ok(partition)
    }
}
