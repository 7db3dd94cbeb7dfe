#![no_main]

use certrust_lib::{
    crl_distribution_points, is_non_repudiation_certificate, is_signature_certificate,
    Certificate, TrustClassifier, X509SignatureVerifier,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Parsing and everything downstream of it must never panic.
    if let Ok(cert) = Certificate::parse(data) {
        let _ = cert.subject().to_oneline();
        let _ = cert.short_name();
        let _ = cert.serial_hex();
        let _ = cert.fingerprint();
        let _ = is_signature_certificate(&cert);
        let _ = is_non_repudiation_certificate(&cert);

        if let Ok(points) = crl_distribution_points(&cert) {
            for point in points {
                let _ = point.scheme();
            }
        }

        let _ = TrustClassifier::new(&X509SignatureVerifier).is_self_signed(&cert);
    }
});
