//! Key usage queries used when picking a certificate for signing.

use crate::{Certificate, KeyUsage};

/// Whether the certificate can be used as a signing certificate: its key
/// usage has both digitalSignature and keyEncipherment set.
pub fn is_signature_certificate(cert: &Certificate) -> bool {
    let signing = cert
        .key_usage()
        .is_some_and(|ku| ku.contains(KeyUsage::DIGITAL_SIGNATURE | KeyUsage::KEY_ENCIPHERMENT));
    tracing::trace!(subject = %cert.subject(), signing, "checked signing key usage");
    signing
}

/// Whether the certificate has the nonRepudiation key usage bit.
pub fn is_non_repudiation_certificate(cert: &Certificate) -> bool {
    cert.key_usage()
        .is_some_and(|ku| ku.contains(KeyUsage::NON_REPUDIATION))
}

/// Whether the extension with the given dotted OID is present and critical.
pub fn has_critical_extension(cert: &Certificate, oid: &str) -> bool {
    tracing::debug!("looking for critical extension OID '{}'", oid);
    cert.critical_extensions().contains(oid)
}
