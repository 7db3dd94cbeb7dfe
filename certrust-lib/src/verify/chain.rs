//! Certification path building via DFS path finding.
//!
//! Given a leaf certificate, a set of anchors and a pool of intermediates,
//! finds a path that terminates at an anchor using depth-first search with
//! backtracking. Validity dates are not looked at here.

use super::classify::TrustClassifier;
use crate::signature::{SignatureFailure, SignatureVerifier};
use crate::{Certificate, TrustError};

/// Maximum path length (leaf and anchor included) explored by the builder.
pub(crate) const MAX_CHAIN_DEPTH: usize = 32;

/// An ordered leaf → … → anchor sequence in which every certificate was
/// issued and signed by the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificationPath {
    leaf: Certificate,
    intermediates: Vec<Certificate>,
    anchor: Certificate,
}

impl CertificationPath {
    pub fn leaf(&self) -> &Certificate {
        &self.leaf
    }

    /// Certificates strictly between the leaf and the anchor.
    pub fn intermediates(&self) -> &[Certificate] {
        &self.intermediates
    }

    /// The self-signed trust anchor terminating the path.
    pub fn anchor(&self) -> &Certificate {
        &self.anchor
    }

    /// Number of certificates, leaf and anchor included.
    pub fn len(&self) -> usize {
        self.intermediates.len() + 2
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Iterate leaf first.
    pub fn iter(&self) -> impl Iterator<Item = &Certificate> + '_ {
        std::iter::once(&self.leaf)
            .chain(self.intermediates.iter())
            .chain(std::iter::once(&self.anchor))
    }
}

/// Builds certification paths with backtracking.
#[derive(Clone, Copy)]
pub struct PathBuilder<'a> {
    verifier: &'a dyn SignatureVerifier,
    max_depth: usize,
}

struct Stall {
    depth: usize,
    subject: String,
    issuer: String,
}

struct Search<'c> {
    anchors: &'c [Certificate],
    intermediates: &'c [Certificate],
    used: Vec<bool>,
    chain: Vec<&'c Certificate>,
    stall: Option<Stall>,
}

impl Search<'_> {
    fn record_stall(&mut self, current: &Certificate) {
        let depth = self.chain.len();
        if self.stall.as_ref().is_some_and(|s| s.depth >= depth) {
            return;
        }
        self.stall = Some(Stall {
            depth,
            subject: current.subject().to_oneline(),
            issuer: current.issuer().to_oneline(),
        });
    }

    fn set_used(&mut self, idx: usize, used: bool) {
        if let Some(slot) = self.used.get_mut(idx) {
            *slot = used;
        }
    }
}

impl<'a> PathBuilder<'a> {
    pub fn new(verifier: &'a dyn SignatureVerifier) -> Self {
        PathBuilder {
            verifier,
            max_depth: MAX_CHAIN_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Build a path from `leaf` to one of `anchors`.
    ///
    /// A self-signed leaf is refused outright: a certificate must not vouch
    /// for itself. When several candidates match at a step, all of them are
    /// tried before giving up.
    pub fn build(
        &self,
        leaf: &Certificate,
        anchors: &[Certificate],
        intermediates: &[Certificate],
    ) -> Result<CertificationPath, TrustError> {
        if TrustClassifier::new(self.verifier).is_self_signed(leaf)? {
            return Err(TrustError::SelfSignedLeaf {
                subject: leaf.subject().to_oneline(),
            });
        }

        let mut search = Search {
            anchors,
            intermediates,
            used: intermediates.iter().map(|c| c == leaf).collect(),
            chain: Vec::new(),
            stall: None,
        };

        match self.extend(&mut search, leaf)? {
            Some(anchor) => {
                let path = CertificationPath {
                    leaf: leaf.clone(),
                    intermediates: search.chain.into_iter().cloned().collect(),
                    anchor: anchor.clone(),
                };
                tracing::info!(
                    "certification path of length {} built for '{}' up to '{}'",
                    path.len(),
                    leaf.subject(),
                    anchor.subject()
                );
                Ok(path)
            }
            None => {
                let (subject, issuer) = match search.stall {
                    Some(stall) => (stall.subject, stall.issuer),
                    None => (leaf.subject().to_oneline(), leaf.issuer().to_oneline()),
                };
                tracing::warn!("no certification path: stalled at '{}'", subject);
                Err(TrustError::PathBuildError { subject, issuer })
            }
        }
    }

    /// DFS step. Returns the anchor that terminates the path, if one was found.
    fn extend<'c>(
        &self,
        search: &mut Search<'c>,
        current: &'c Certificate,
    ) -> Result<Option<&'c Certificate>, TrustError> {
        let issuer = current.issuer();

        let anchors = search.anchors;
        for anchor in anchors {
            if anchor.subject() == issuer && self.issued_by(current, anchor)? {
                return Ok(Some(anchor));
            }
        }

        // leaf + chain + one more intermediate + the anchor
        if search.chain.len() + 3 > self.max_depth {
            tracing::debug!("depth limit {} reached at '{}'", self.max_depth, current.subject());
            search.record_stall(current);
            return Ok(None);
        }

        let intermediates = search.intermediates;
        for (idx, candidate) in intermediates.iter().enumerate() {
            if search.used.get(idx).copied().unwrap_or(true) {
                continue;
            }
            if candidate.subject() != issuer || !self.issued_by(current, candidate)? {
                continue;
            }

            search.set_used(idx, true);
            search.chain.push(candidate);

            if let Some(anchor) = self.extend(search, candidate)? {
                return Ok(Some(anchor));
            }

            tracing::trace!("backtracking from '{}'", candidate.subject());
            search.chain.pop();
            search.set_used(idx, false);
        }

        search.record_stall(current);
        Ok(None)
    }

    fn issued_by(&self, cert: &Certificate, issuer: &Certificate) -> Result<bool, TrustError> {
        match self.verifier.verify_certificate(cert, issuer.public_key()) {
            Ok(()) => Ok(true),
            Err(SignatureFailure::Mismatch) => Ok(false),
            Err(SignatureFailure::Other(reason)) => Err(TrustError::SignatureError {
                subject: cert.subject().to_oneline(),
                reason,
            }),
        }
    }
}
