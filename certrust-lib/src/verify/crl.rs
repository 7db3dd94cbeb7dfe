//! Decoded Certificate Revocation Lists.
//!
//! A [`RevocationList`] answers one question: is this serial revoked, and if
//! so, why. It keeps the DER encoding so that its signature can be checked
//! against the issuer's key when the caller asks for it.

use crate::certificate::{pem_blocks, DistinguishedName};
use crate::util;
use crate::{Certificate, TrustError};
use std::collections::HashMap;
use x509_parser::prelude::*;
use x509_parser::revocation_list::CertificateRevocationList;

/// A decoded CRL.
#[derive(Debug, Clone)]
pub struct RevocationList {
    der: Vec<u8>,
    issuer: DistinguishedName,
    this_update: i64,
    next_update: Option<i64>,
    /// Serial (leading zeros stripped) → RFC 5280 reason name.
    revoked: HashMap<Vec<u8>, &'static str>,
}

impl RevocationList {
    /// Parse a CRL from PEM (`X509 CRL`) or DER, auto-detected.
    pub fn parse(input: &[u8]) -> Result<Self, TrustError> {
        if util::is_pem(input) {
            let der = parse_pem_crl(input)?
                .into_iter()
                .next()
                .ok_or_else(|| TrustError::PemError("no CRLs found in PEM input".into()))?;
            Self::from_der(&der)
        } else {
            Self::from_der(input)
        }
    }

    /// Parse a DER-encoded CRL.
    pub fn from_der(input: &[u8]) -> Result<Self, TrustError> {
        let (remaining, crl) = CertificateRevocationList::from_der(input)
            .map_err(|e| TrustError::DerError(format!("CRL: {}", e)))?;
        let crl_len = input.len() - remaining.len();

        let revoked = crl
            .iter_revoked_certificates()
            .map(|entry| {
                let reason = entry
                    .reason_code()
                    .map(|rc| format_crl_reason(&rc.1))
                    .unwrap_or("unspecified");
                (util::strip_leading_zeros(entry.raw_serial()).to_vec(), reason)
            })
            .collect();

        Ok(RevocationList {
            der: input.get(..crl_len).unwrap_or(input).to_vec(),
            issuer: DistinguishedName::from_x509(crl.issuer()),
            this_update: crl.last_update().timestamp(),
            next_update: crl.next_update().map(|t| t.timestamp()),
            revoked,
        })
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn issuer(&self) -> &DistinguishedName {
        &self.issuer
    }

    /// `thisUpdate`, Unix seconds.
    pub fn this_update(&self) -> i64 {
        self.this_update
    }

    /// `nextUpdate`, Unix seconds, when present.
    pub fn next_update(&self) -> Option<i64> {
        self.next_update
    }

    /// Number of revoked entries.
    pub fn len(&self) -> usize {
        self.revoked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revoked.is_empty()
    }

    /// Whether the serial (raw DER INTEGER body) is listed.
    pub fn is_revoked(&self, serial: &[u8]) -> bool {
        self.revoked
            .contains_key(util::strip_leading_zeros(serial))
    }

    /// Revocation reason for a listed serial.
    pub fn revocation_reason(&self, serial: &[u8]) -> Option<&'static str> {
        self.revoked
            .get(util::strip_leading_zeros(serial))
            .copied()
    }

    /// Reason for which `cert` is listed, if it is. Serials are only
    /// unique per issuer, so a CRL from another issuer never lists `cert`.
    pub fn lists(&self, cert: &Certificate) -> Option<&'static str> {
        if &self.issuer != cert.issuer() {
            return None;
        }
        self.revocation_reason(cert.serial())
    }
}

/// Parse a PEM-encoded CRL file into DER-encoded CRL data.
pub fn parse_pem_crl(input: &[u8]) -> Result<Vec<Vec<u8>>, TrustError> {
    pem_blocks(input, &["X509 CRL"])
}

/// Format a CRL revocation reason code as an RFC 5280-style string.
///
/// Matches on the underlying numeric value of the `ReasonCode` newtype
/// (which wraps a `u8`), per RFC 5280 Section 5.3.1.
pub(crate) fn format_crl_reason(rc: &x509_parser::x509::ReasonCode) -> &'static str {
    match rc.0 {
        0 => "unspecified",
        1 => "keyCompromise",
        2 => "cACompromise",
        3 => "affiliationChanged",
        4 => "superseded",
        5 => "cessationOfOperation",
        6 => "certificateHold",
        // 7 is unused per RFC 5280
        8 => "removeFromCRL",
        9 => "privilegeWithdrawn",
        10 => "aACompromise",
        _ => "unspecified",
    }
}
