//! OID string constants used by certrust-lib.
//!
//! Only the identifiers the trust engine actually looks at live here: the
//! DN attributes used for short names, the extensions consulted during
//! path building and revocation checking, and the key/signature algorithm
//! families needed to tell a key mismatch from a real crypto failure.

// ── X.509 Distinguished Name attributes (RFC 4519 / X.520) ──────────────

pub const COMMON_NAME: &str = "2.5.4.3";
pub const ORGANIZATION: &str = "2.5.4.10";
pub const ORGANIZATIONAL_UNIT: &str = "2.5.4.11";

// ── X.509v3 extensions (RFC 5280 Section 4.2) ───────────────────────────

pub const EXT_CRL_DISTRIBUTION_POINTS: &str = "2.5.29.31";

// ── Public key types ─────────────────────────────────────────────────────

pub const RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";
pub const RSASSA_PSS: &str = "1.2.840.113549.1.1.10";
pub const EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";
pub const ED25519: &str = "1.3.101.112";
pub const ED448: &str = "1.3.101.113";

// ── Signature algorithm arcs ─────────────────────────────────────────────

/// PKCS#1 arc: sha*WithRSAEncryption and RSASSA-PSS live under it.
pub const PKCS1_ARC: &str = "1.2.840.113549.1.1.";
/// ANSI X9.62 ECDSA signature arc (ecdsa-with-SHA*).
pub const ECDSA_SIG_ARC: &str = "1.2.840.10045.4.";
