//! CRL distribution point extraction.

use crate::oid;
use crate::{Certificate, TrustError};
use serde::Serialize;
use std::collections::HashSet;
use x509_parser::extensions::{DistributionPointName, GeneralName, ParsedExtension};
use x509_parser::oid_registry::OID_X509_EXT_CRL_DISTRIBUTION_POINTS;

/// Retrieval protocol of a distribution point, decided by URL prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Scheme {
    Http,
    Https,
    Ftp,
    Ldap,
}

impl Scheme {
    /// Match the URL prefix exactly (`http://`, `https://`, `ftp://`,
    /// `ldap://`). Anything else is unsupported.
    pub fn of(url: &str) -> Result<Scheme, TrustError> {
        if url.starts_with("http://") {
            Ok(Scheme::Http)
        } else if url.starts_with("https://") {
            Ok(Scheme::Https)
        } else if url.starts_with("ftp://") {
            Ok(Scheme::Ftp)
        } else if url.starts_with("ldap://") {
            Ok(Scheme::Ldap)
        } else {
            Err(TrustError::UnsupportedScheme(url.to_string()))
        }
    }
}

/// A URL taken from a certificate's CRL distribution points extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DistributionPoint(String);

impl DistributionPoint {
    pub fn new(url: impl Into<String>) -> Self {
        DistributionPoint(url.into())
    }

    pub fn url(&self) -> &str {
        &self.0
    }

    pub fn scheme(&self) -> Result<Scheme, TrustError> {
        Scheme::of(&self.0)
    }
}

impl std::fmt::Display for DistributionPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extract every URI from the `fullName` form of the certificate's CRL
/// distribution points, in extension order, without duplicates.
///
/// A certificate without the extension has no distribution points; that is
/// not an error. Undecodable extension contents are a `ParseError`.
pub fn crl_distribution_points(cert: &Certificate) -> Result<Vec<DistributionPoint>, TrustError> {
    if cert
        .extension_value(oid::EXT_CRL_DISTRIBUTION_POINTS)
        .is_none()
    {
        return Ok(Vec::new());
    }

    let parse_error = |reason: String| TrustError::ParseError {
        subject: cert.subject().to_oneline(),
        reason,
    };

    let x509 = cert.x509()?;
    let ext = x509
        .get_extension_unique(&OID_X509_EXT_CRL_DISTRIBUTION_POINTS)
        .map_err(|e| parse_error(format!("CRL distribution points: {}", e)))?;
    let Some(ext) = ext else {
        return Ok(Vec::new());
    };

    let points = match ext.parsed_extension() {
        ParsedExtension::CRLDistributionPoints(points) => points,
        ParsedExtension::ParseError { error } => {
            return Err(parse_error(format!("CRL distribution points: {}", error)));
        }
        _ => {
            return Err(parse_error(
                "CRL distribution points: unexpected extension contents".into(),
            ));
        }
    };

    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    for point in points.points.iter() {
        let Some(DistributionPointName::FullName(names)) = &point.distribution_point else {
            continue;
        };
        for name in names {
            if let GeneralName::URI(uri) = name {
                if seen.insert(*uri) {
                    urls.push(DistributionPoint::new(*uri));
                }
            }
        }
    }

    tracing::trace!(
        "{} CRL distribution point(s) in '{}'",
        urls.len(),
        cert.subject()
    );
    Ok(urls)
}
