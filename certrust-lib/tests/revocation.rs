#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Revocation checking with an in-memory CRL source.

mod common;

use certrust_lib::*;
use common::*;
use rcgen::RevocationReason;
use std::sync::Arc;

const CRL_A: &str = "http://crl.test/a.crl";
const CRL_B: &str = "http://crl.test/b.crl";

fn checker(source: Arc<StaticCrls>) -> RevocationChecker {
    init_tracing();
    RevocationChecker::new(source, Arc::new(X509SignatureVerifier), 2).unwrap()
}

#[test]
fn no_points_is_not_revoked_without_fetching() {
    let root = root("Root CA");
    let leaf = leaf("Leaf", &root, 10, &[]);
    let source = Arc::new(StaticCrls::new());

    let status = checker(source.clone()).check_certificate(&leaf).unwrap();
    assert_eq!(status, RevocationStatus::NotRevoked);
    assert_eq!(source.fetches(), 0);
}

#[test]
fn unlisted_serial_is_not_revoked() {
    let root = root("Root CA");
    let leaf = leaf("Leaf", &root, 10, &[CRL_A]);
    let source = Arc::new(
        StaticCrls::new().with(CRL_A, Published::Crl(crl(&root, &[(11, RevocationReason::KeyCompromise)]))),
    );

    let status = checker(source).check_certificate(&leaf).unwrap();
    assert_eq!(status, RevocationStatus::NotRevoked);
}

#[test]
fn listed_serial_is_revoked_with_reason() {
    let root = root("Root CA");
    let leaf = leaf("Leaf", &root, 10, &[CRL_A]);
    let source = Arc::new(
        StaticCrls::new().with(CRL_A, Published::Crl(crl(&root, &[(10, RevocationReason::KeyCompromise)]))),
    );

    let status = checker(source).check_certificate(&leaf).unwrap();
    assert_eq!(
        status,
        RevocationStatus::Revoked(Revocation {
            distribution_point: DistributionPoint::new(CRL_A),
            reason: "keyCompromise".into(),
        })
    );
    assert!(status.is_revoked());
}

#[test]
fn unreachable_point_is_skipped() {
    let root = root("Root CA");
    let leaf = leaf("Leaf", &root, 10, &[CRL_A, CRL_B]);
    let source = Arc::new(
        StaticCrls::new()
            .with(CRL_A, Published::Unreachable)
            .with(CRL_B, Published::Crl(crl(&root, &[(10, RevocationReason::Superseded)]))),
    );

    match checker(source).check_certificate(&leaf).unwrap() {
        RevocationStatus::Revoked(r) => {
            assert_eq!(r.distribution_point.url(), CRL_B);
            assert_eq!(r.reason, "superseded");
        }
        other => panic!("unexpected status: {other}"),
    }
}

#[test]
fn all_points_failing_is_not_revoked() {
    let root = root("Root CA");
    let leaf = leaf("Leaf", &root, 10, &[CRL_A, CRL_B]);
    let source = Arc::new(
        StaticCrls::new()
            .with(CRL_A, Published::Garbage)
            .with(CRL_B, Published::Timeout),
    );

    let status = checker(source.clone()).check_certificate(&leaf).unwrap();
    assert_eq!(status, RevocationStatus::NotRevoked);
    assert_eq!(source.fetches(), 2);
}

#[test]
fn lowest_index_point_decides() {
    let root = root("Root CA");
    let leaf = leaf("Leaf", &root, 10, &[CRL_A, CRL_B]);
    let source = Arc::new(
        StaticCrls::new()
            .with(CRL_A, Published::Crl(crl(&root, &[(10, RevocationReason::KeyCompromise)])))
            .with(CRL_B, Published::Crl(crl(&root, &[(10, RevocationReason::AffiliationChanged)]))),
    );
    let checker = checker(source);

    for _ in 0..8 {
        match checker.check_certificate(&leaf).unwrap() {
            RevocationStatus::Revoked(r) => {
                assert_eq!(r.distribution_point.url(), CRL_A);
                assert_eq!(r.reason, "keyCompromise");
            }
            other => panic!("unexpected status: {other}"),
        }
    }
}

#[test]
fn colliding_serial_on_foreign_crl_is_not_revoked() {
    let root = root("Root CA");
    let other = common::root("Other CA");
    let leaf = leaf("Leaf", &root, 10, &[CRL_A]);
    let source = Arc::new(
        StaticCrls::new().with(CRL_A, Published::Crl(crl(&other, &[(10, RevocationReason::KeyCompromise)]))),
    );

    let status = checker(source.clone()).check_certificate(&leaf).unwrap();
    assert_eq!(status, RevocationStatus::NotRevoked);
    assert_eq!(source.fetches(), 1);

    let foreign = RevocationList::parse(&crl(&other, &[(10, RevocationReason::KeyCompromise)])).unwrap();
    assert!(foreign.is_revoked(&[10]));
    assert_eq!(foreign.lists(&leaf), None);
}

#[test]
fn unsupported_scheme_is_fatal() {
    let root = root("Root CA");
    let leaf = leaf("Leaf", &root, 10, &["file:///var/crl/root.crl", CRL_A]);
    let source = Arc::new(StaticCrls::new().with(CRL_A, Published::Crl(crl(&root, &[]))));

    let err = checker(source).check_certificate(&leaf).unwrap_err();
    assert!(matches!(err, TrustError::UnsupportedScheme(url) if url == "file:///var/crl/root.crl"));
    assert!(!TrustError::UnsupportedScheme(String::new()).is_recoverable());
}

#[test]
fn forged_crl_is_skipped_when_signatures_are_checked() {
    let root = root("Root CA");
    let forger = common::root("Root CA");
    let leaf = leaf("Leaf", &root, 10, &[CRL_A]);
    let forged = crl(&forger, &[(10, RevocationReason::KeyCompromise)]);
    let source = Arc::new(StaticCrls::new().with(CRL_A, Published::Crl(forged)));

    let trusting = checker(source.clone());
    assert!(trusting
        .check_certificate_with_issuer(&leaf, Some(&root.parsed))
        .unwrap()
        .is_revoked());

    let strict = checker(source).verify_crl_signatures(true);
    assert_eq!(
        strict
            .check_certificate_with_issuer(&leaf, Some(&root.parsed))
            .unwrap(),
        RevocationStatus::NotRevoked
    );
}

#[test]
fn crl_from_another_issuer_is_skipped_when_signatures_are_checked() {
    let root = root("Root CA");
    let other = common::root("Other CA");
    let leaf = leaf("Leaf", &root, 10, &[CRL_A, CRL_B]);
    let source = Arc::new(
        StaticCrls::new()
            .with(CRL_A, Published::Crl(crl(&other, &[(10, RevocationReason::KeyCompromise)])))
            .with(CRL_B, Published::Crl(crl(&root, &[(10, RevocationReason::CessationOfOperation)]))),
    );

    let status = checker(source)
        .verify_crl_signatures(true)
        .check_certificate_with_issuer(&leaf, Some(&root.parsed))
        .unwrap();
    match status {
        RevocationStatus::Revoked(r) => {
            assert_eq!(r.distribution_point.url(), CRL_B);
            assert_eq!(r.reason, "cessationOfOperation");
        }
        other => panic!("unexpected status: {other}"),
    }
}

#[test]
fn zero_workers_is_a_configuration_error() {
    let err = RevocationChecker::new(
        Arc::new(StaticCrls::new()),
        Arc::new(X509SignatureVerifier),
        0,
    )
    .unwrap_err();
    assert!(matches!(err, TrustError::ConfigurationError(_)));
}
