//! Trust anchor sources.
//!
//! [`TrustAnchorSource`] says where anchor candidates come from: the
//! platform's OpenSSL roots, a PEM bundle, or a Trust Service List. Loading
//! yields plain certificates; whether they really are self-signed is decided
//! later by the classifier, like for any other pool member.

use super::tsl;
use crate::certificate::pem_blocks;
use crate::{Certificate, TrustError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Well-known CA bundle file paths, in order of preference.
pub(crate) const KNOWN_CA_BUNDLE_PATHS: &[&str] = &[
    "/etc/ssl/certs/ca-certificates.crt", // Debian/Ubuntu
    "/etc/pki/tls/certs/ca-bundle.crt",   // RHEL/CentOS/Fedora
    "/etc/ssl/ca-bundle.pem",             // openSUSE
    "/etc/ssl/cert.pem",                  // macOS, Alpine
];

/// Well-known CA certificate directory paths.
pub(crate) const KNOWN_CA_DIR_PATHS: &[&str] = &["/etc/ssl/certs"];

/// Where trust anchors are loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrustAnchorSource {
    /// The platform roots, found the way OpenSSL finds them.
    System,
    /// A PEM bundle on disk.
    PemFile { path: PathBuf },
    /// A Trust Service List, by `http(s)://` URL or local path.
    Tsl { location: String },
}

impl TrustAnchorSource {
    /// Load every certificate the source provides.
    pub fn load(&self, timeout_secs: u64, max_size: usize) -> Result<Vec<Certificate>, TrustError> {
        let anchors = match self {
            TrustAnchorSource::System => system_anchors()?,
            TrustAnchorSource::PemFile { path } => pem_file_anchors(path)?,
            TrustAnchorSource::Tsl { location } => tsl::load(location, timeout_secs, max_size)?,
        };
        tracing::info!("{} trust anchor candidate(s) loaded from {}", anchors.len(), self);
        Ok(anchors)
    }
}

impl std::fmt::Display for TrustAnchorSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrustAnchorSource::System => write!(f, "system trust store"),
            TrustAnchorSource::PemFile { path } => write!(f, "PEM file '{}'", path.display()),
            TrustAnchorSource::Tsl { location } => write!(f, "trust service list '{}'", location),
        }
    }
}

/// Check if a file looks like a PEM certificate file.
///
/// Matches `.pem`, `.crt`, `.cer` extensions and OpenSSL hash-linked files
/// (`XXXXXXXX.N` where the extension is a single digit).
fn is_pem_cert_file(path: &Path) -> bool {
    let ext = match path.extension().and_then(|e| e.to_str()) {
        Some(e) => e,
        None => return false,
    };
    matches!(ext, "pem" | "crt" | "cer")
        || (ext.len() == 1 && ext.bytes().next().is_some_and(|b| b.is_ascii_digit()))
}

/// Load the platform roots.
///
/// Search order:
/// 1. `SSL_CERT_FILE`, the `openssl-probe` bundle, [`KNOWN_CA_BUNDLE_PATHS`]
/// 2. `SSL_CERT_DIR`, the `openssl-probe` directory, [`KNOWN_CA_DIR_PATHS`]
fn system_anchors() -> Result<Vec<Certificate>, TrustError> {
    if let Some(bundle) = find_system_ca_bundle() {
        match std::fs::read(&bundle) {
            Ok(data) => {
                let anchors = pem_bundle(&data);
                if !anchors.is_empty() {
                    tracing::debug!("system roots read from '{}'", bundle.display());
                    return Ok(anchors);
                }
            }
            Err(e) => tracing::debug!("cannot read '{}': {}", bundle.display(), e),
        }
    }

    let probe = openssl_probe::probe();
    let dir_candidates = std::env::var("SSL_CERT_DIR")
        .ok()
        .map(PathBuf::from)
        .into_iter()
        .chain(probe.cert_dir)
        .chain(KNOWN_CA_DIR_PATHS.iter().map(PathBuf::from));

    for dir in dir_candidates {
        match pem_directory(&dir) {
            Ok(anchors) if !anchors.is_empty() => {
                tracing::debug!("system roots read from '{}'", dir.display());
                return Ok(anchors);
            }
            Ok(_) => {}
            Err(e) => tracing::trace!("skipping '{}': {}", dir.display(), e),
        }
    }

    Err(TrustError::ConfigurationError(
        "no system trust store found".into(),
    ))
}

fn pem_file_anchors(path: &Path) -> Result<Vec<Certificate>, TrustError> {
    let data = std::fs::read(path).map_err(|e| {
        TrustError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })?;
    let anchors = pem_bundle(&data);
    if anchors.is_empty() {
        return Err(TrustError::ConfigurationError(format!(
            "no certificates in '{}'",
            path.display()
        )));
    }
    Ok(anchors)
}

/// All decodable certificates of a PEM bundle. Some bundles carry
/// non-certificate or broken entries; those are dropped.
fn pem_bundle(data: &[u8]) -> Vec<Certificate> {
    let blocks = match pem_blocks(data, &["CERTIFICATE", "TRUSTED CERTIFICATE"]) {
        Ok(blocks) => blocks,
        Err(e) => {
            tracing::debug!("not a PEM bundle: {}", e);
            return Vec::new();
        }
    };
    blocks
        .iter()
        .filter_map(|der| match Certificate::from_der(der) {
            Ok(cert) => Some(cert),
            Err(e) => {
                tracing::debug!("skipping bundle entry: {}", e);
                None
            }
        })
        .collect()
}

/// Load certificates from a directory of PEM files (like OpenSSL's -CApath).
fn pem_directory(dir: &Path) -> Result<Vec<Certificate>, TrustError> {
    let mut anchors = Vec::new();
    let entries = std::fs::read_dir(dir).map_err(|e| {
        TrustError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", dir.display(), e),
        ))
    })?;
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && is_pem_cert_file(&path) {
            if let Ok(data) = std::fs::read(&path) {
                anchors.extend(pem_bundle(&data));
            }
        }
    }
    Ok(anchors)
}

/// Find the system CA bundle path (same location OpenSSL uses).
pub fn find_system_ca_bundle() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("SSL_CERT_FILE") {
        let p = PathBuf::from(&path);
        if p.exists() {
            return Some(p);
        }
    }

    let probe = openssl_probe::probe();
    if let Some(file) = probe.cert_file {
        if file.exists() {
            return Some(file);
        }
    }

    KNOWN_CA_BUNDLE_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}
