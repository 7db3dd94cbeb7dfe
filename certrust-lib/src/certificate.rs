//! Owned, decoded certificate capability.
//!
//! [`Certificate`] is what the trust engine works with. It is built once from
//! DER (or PEM) through `x509-parser` and keeps the raw bytes so that the
//! signature capability and the extension decoders can re-read them later.

use crate::fingerprint::compute_fingerprint;
use crate::oid;
use crate::util;
use crate::TrustError;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};
use x509_parser::prelude::*;

/// A distinguished name: the raw DER encoding used for matching plus its
/// ordered attributes for display.
#[derive(Debug, Clone, Serialize)]
pub struct DistinguishedName {
    #[serde(skip)]
    raw: Vec<u8>,
    /// Ordered list of (attribute_type, value) pairs.
    /// Attribute types use short names where known (e.g., "CN", "O", "C").
    pub components: Vec<(String, String)>,
}

impl DistinguishedName {
    pub(crate) fn from_x509(name: &X509Name) -> Self {
        let mut components = Vec::new();
        for rdn in name.iter() {
            for attr in rdn.iter() {
                let key = attribute_short_name(&attr.attr_type().to_id_string());
                let value = attr.as_str().unwrap_or("<binary>").to_string();
                components.push((key, value));
            }
        }
        DistinguishedName {
            raw: name.as_raw().to_vec(),
            components,
        }
    }

    /// Raw DER encoding of the name, the form used for issuer/subject matching.
    pub fn as_raw(&self) -> &[u8] {
        &self.raw
    }

    /// First value of the given attribute short name ("CN", "O", ...).
    pub fn attribute(&self, short_name: &str) -> Option<&str> {
        self.components
            .iter()
            .find(|(k, _)| k == short_name)
            .map(|(_, v)| v.as_str())
    }

    /// Format as a comma-separated one-line string matching OpenSSL's default format.
    /// Example: "C = US, O = Org, CN = example.com"
    ///
    /// Values containing commas, equals signs, or backslashes are escaped
    /// to prevent ambiguous output.
    pub fn to_oneline(&self) -> String {
        let mut result = String::new();
        for (i, (k, v)) in self.components.iter().enumerate() {
            if i > 0 {
                result.push_str(", ");
            }
            result.push_str(k);
            result.push_str(" = ");
            for ch in v.chars() {
                match ch {
                    '\\' => result.push_str("\\\\"),
                    ',' => result.push_str("\\,"),
                    '=' => result.push_str("\\="),
                    _ => result.push(ch),
                }
            }
        }
        result
    }
}

impl PartialEq for DistinguishedName {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for DistinguishedName {}

impl std::fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_oneline())
    }
}

fn attribute_short_name(oid_str: &str) -> String {
    let short = match oid_str {
        oid::COMMON_NAME => "CN",
        oid::ORGANIZATION => "O",
        oid::ORGANIZATIONAL_UNIT => "OU",
        "2.5.4.6" => "C",
        "2.5.4.7" => "L",
        "2.5.4.8" => "ST",
        "2.5.4.5" => "serialNumber",
        "2.5.4.42" => "GN",
        "2.5.4.4" => "SN",
        "1.2.840.113549.1.9.1" => "emailAddress",
        "0.9.2342.19200300.100.1.25" => "DC",
        other => other,
    };
    short.to_string()
}

/// Key usage bits (RFC 5280 Section 4.2.1.3), bit 0 = digitalSignature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeyUsage(u16);

impl KeyUsage {
    pub const DIGITAL_SIGNATURE: u16 = 1 << 0;
    pub const NON_REPUDIATION: u16 = 1 << 1;
    pub const KEY_ENCIPHERMENT: u16 = 1 << 2;
    pub const DATA_ENCIPHERMENT: u16 = 1 << 3;
    pub const KEY_AGREEMENT: u16 = 1 << 4;
    pub const KEY_CERT_SIGN: u16 = 1 << 5;
    pub const CRL_SIGN: u16 = 1 << 6;
    pub const ENCIPHER_ONLY: u16 = 1 << 7;
    pub const DECIPHER_ONLY: u16 = 1 << 8;

    const NAMES: [(u16, &'static str); 9] = [
        (Self::DIGITAL_SIGNATURE, "digitalSignature"),
        (Self::NON_REPUDIATION, "nonRepudiation"),
        (Self::KEY_ENCIPHERMENT, "keyEncipherment"),
        (Self::DATA_ENCIPHERMENT, "dataEncipherment"),
        (Self::KEY_AGREEMENT, "keyAgreement"),
        (Self::KEY_CERT_SIGN, "keyCertSign"),
        (Self::CRL_SIGN, "cRLSign"),
        (Self::ENCIPHER_ONLY, "encipherOnly"),
        (Self::DECIPHER_ONLY, "decipherOnly"),
    ];

    pub fn from_bits(bits: u16) -> Self {
        KeyUsage(bits)
    }

    pub fn bits(&self) -> u16 {
        self.0
    }

    /// Whether every bit in `mask` is set.
    pub fn contains(&self, mask: u16) -> bool {
        self.0 & mask == mask
    }

    /// Names of the bits that are set, in RFC 5280 order.
    pub fn names(&self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(bit, _)| self.0 & bit != 0)
            .map(|(_, name)| *name)
            .collect()
    }
}

/// A decoded X.509 certificate.
///
/// Equality and hashing use the DER encoding, so two values are equal only
/// when they are the very same certificate.
#[derive(Debug, Clone)]
pub struct Certificate {
    der: Vec<u8>,
    subject: DistinguishedName,
    issuer: DistinguishedName,
    serial: Vec<u8>,
    not_before: i64,
    not_after: i64,
    public_key: Vec<u8>,
    key_usage: Option<KeyUsage>,
    critical_extensions: BTreeSet<String>,
    extensions: BTreeMap<String, Vec<u8>>,
}

impl Certificate {
    /// Parse a certificate from PEM or DER (auto-detected).
    pub fn parse(input: &[u8]) -> Result<Self, TrustError> {
        if input.is_empty() {
            return Err(TrustError::DerError("empty input".into()));
        }
        if util::is_pem(input) {
            Self::from_pem(input)
        } else {
            Self::from_der(input)
        }
    }

    /// Parse the first certificate of a PEM document.
    pub fn from_pem(input: &[u8]) -> Result<Self, TrustError> {
        let (_, pem) = x509_parser::pem::parse_x509_pem(input)
            .map_err(|e| TrustError::PemError(format!("{}", e)))?;

        if pem.label != "CERTIFICATE"
            && pem.label != "TRUSTED CERTIFICATE"
            && pem.label != "X509 CERTIFICATE"
        {
            return Err(TrustError::PemError(format!(
                "expected CERTIFICATE, got {}",
                pem.label
            )));
        }

        Self::from_der(&pem.contents)
    }

    /// Parse a DER-encoded certificate. Trailing bytes are ignored.
    pub fn from_der(input: &[u8]) -> Result<Self, TrustError> {
        let (remaining, x509) =
            X509Certificate::from_der(input).map_err(|e| TrustError::DerError(format!("{}", e)))?;

        let cert_len = input.len() - remaining.len();
        let der = input.get(..cert_len).unwrap_or(input).to_vec();

        let subject = DistinguishedName::from_x509(x509.subject());
        let issuer = DistinguishedName::from_x509(x509.issuer());

        let key_usage = x509
            .key_usage()
            .map_err(|e| TrustError::ParseError {
                subject: subject.to_oneline(),
                reason: format!("key usage: {}", e),
            })?
            .map(|ext| KeyUsage::from_bits(ext.value.flags));

        let mut critical_extensions = BTreeSet::new();
        let mut extensions = BTreeMap::new();
        for ext in x509.extensions() {
            let id = ext.oid.to_id_string();
            if ext.critical {
                critical_extensions.insert(id.clone());
            }
            extensions.entry(id).or_insert_with(|| ext.value.to_vec());
        }

        let validity = x509.validity();

        Ok(Certificate {
            subject,
            issuer,
            serial: x509.raw_serial().to_vec(),
            not_before: validity.not_before.timestamp(),
            not_after: validity.not_after.timestamp(),
            public_key: x509.public_key().raw.to_vec(),
            key_usage,
            critical_extensions,
            extensions,
            der,
        })
    }

    /// Raw DER encoding.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn subject(&self) -> &DistinguishedName {
        &self.subject
    }

    pub fn issuer(&self) -> &DistinguishedName {
        &self.issuer
    }

    /// Serial number as the raw DER INTEGER body.
    pub fn serial(&self) -> &[u8] {
        &self.serial
    }

    /// Serial number as colon-separated hex, leading zero bytes stripped.
    pub fn serial_hex(&self) -> String {
        util::hex_colon_upper(util::strip_leading_zeros(&self.serial))
    }

    /// Start of the validity window, Unix seconds.
    pub fn not_before(&self) -> i64 {
        self.not_before
    }

    /// End of the validity window, Unix seconds.
    pub fn not_after(&self) -> i64 {
        self.not_after
    }

    /// DER-encoded SubjectPublicKeyInfo.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Key usage bits, `None` when the extension is absent.
    pub fn key_usage(&self) -> Option<KeyUsage> {
        self.key_usage
    }

    /// Dotted OIDs of the extensions marked critical.
    pub fn critical_extensions(&self) -> &BTreeSet<String> {
        &self.critical_extensions
    }

    /// Raw `extnValue` contents of the extension with the given dotted OID.
    pub fn extension_value(&self, oid: &str) -> Option<&[u8]> {
        self.extensions.get(oid).map(Vec::as_slice)
    }

    /// Short human-readable identifier: CN, then O, then OU, else "Unknown".
    pub fn short_name(&self) -> String {
        ["CN", "O", "OU"]
            .iter()
            .find_map(|k| self.subject.attribute(k))
            .unwrap_or("Unknown")
            .to_string()
    }

    /// SHA-256 fingerprint of the DER encoding.
    pub fn fingerprint(&self) -> String {
        compute_fingerprint(&self.der)
    }

    /// Re-decode the stored bytes with `x509-parser`.
    pub(crate) fn x509(&self) -> Result<X509Certificate<'_>, TrustError> {
        X509Certificate::from_der(&self.der)
            .map(|(_, x509)| x509)
            .map_err(|e| TrustError::ParseError {
                subject: self.subject.to_oneline(),
                reason: e.to_string(),
            })
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for Certificate {}

impl Hash for Certificate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.der.hash(state);
    }
}

impl std::fmt::Display for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (serial {})", self.subject, self.serial_hex())
    }
}

/// Parse a PEM-encoded file containing one or more certificates.
pub fn parse_pem_chain(input: &[u8]) -> Result<Vec<Certificate>, TrustError> {
    pem_blocks(input, &["CERTIFICATE", "TRUSTED CERTIFICATE"])?
        .iter()
        .map(|der| Certificate::from_der(der))
        .collect()
}

/// Collect the contents of every PEM block carrying one of `labels`.
///
/// Once at least one block has been read, trailing garbage ends the scan
/// instead of failing it.
pub(crate) fn pem_blocks(input: &[u8], labels: &[&str]) -> Result<Vec<Vec<u8>>, TrustError> {
    let mut blocks = Vec::new();

    for pem_result in Pem::iter_from_buffer(input) {
        match pem_result {
            Ok(pem) => {
                if labels.contains(&pem.label.as_str()) {
                    blocks.push(pem.contents);
                }
            }
            Err(e) => {
                if !blocks.is_empty() {
                    break;
                }
                return Err(TrustError::PemError(format!("failed to parse PEM: {}", e)));
            }
        }
    }

    if blocks.is_empty() {
        return Err(TrustError::PemError(format!(
            "no {} found in PEM input",
            labels.join(" / ")
        )));
    }

    Ok(blocks)
}
