//! Trust Service List loading.
//!
//! A TSL is an XML document listing certification services, each carrying
//! its certificate as base64 text inside an `X509Certificate` element. Only
//! those elements are looked at; the rest of the schema is ignored.

use super::fetch::{http_client, http_get};
use crate::{Certificate, TrustError};
use base64::Engine;
use std::time::Duration;

const CERTIFICATE_ELEMENT: &str = "X509Certificate";

/// Read the TSL at `location` and return the certificates it lists.
///
/// `location` is an `http://` or `https://` URL, or a local path with an
/// optional `file://` prefix.
pub(crate) fn load(
    location: &str,
    timeout_secs: u64,
    max_size: usize,
) -> Result<Vec<Certificate>, TrustError> {
    tracing::trace!("acquiring trust anchors from TSL '{}'", location);
    let data = read_location(location, timeout_secs, max_size)?;
    let xml = std::str::from_utf8(&data).map_err(|e| {
        TrustError::ConfigurationError(format!("TSL '{}' is not UTF-8: {}", location, e))
    })?;
    parse_tsl(xml).map_err(|reason| {
        TrustError::ConfigurationError(format!("malformed TSL '{}': {}", location, reason))
    })
}

fn read_location(location: &str, timeout_secs: u64, max_size: usize) -> Result<Vec<u8>, TrustError> {
    if location.starts_with("http://") || location.starts_with("https://") {
        let timeout = Duration::from_secs(timeout_secs);
        let client = http_client(timeout)?;
        return http_get(&client, location, timeout, max_size);
    }

    let path = location.strip_prefix("file://").unwrap_or(location);
    std::fs::read(path).map_err(|e| {
        TrustError::Io(std::io::Error::new(e.kind(), format!("{}: {}", path, e)))
    })
}

/// Extract every `X509Certificate` element, whatever its namespace.
/// Entries that do not decode to a certificate are dropped with a warning.
pub(crate) fn parse_tsl(xml: &str) -> Result<Vec<Certificate>, String> {
    let doc = roxmltree::Document::parse(xml).map_err(|e| e.to_string())?;

    let nodes: Vec<_> = doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == CERTIFICATE_ELEMENT)
        .collect();
    tracing::trace!("{} {} element(s) found", nodes.len(), CERTIFICATE_ELEMENT);

    let mut certs = Vec::with_capacity(nodes.len());
    for node in nodes {
        match decode_certificate(&element_text(node)) {
            Ok(cert) => certs.push(cert),
            Err(reason) => {
                tracing::warn!("discarding unparseable TSL certificate entry: {}", reason)
            }
        }
    }
    Ok(certs)
}

/// Concatenated text children of `node` with all whitespace removed.
fn element_text(node: roxmltree::Node) -> String {
    node.children()
        .filter(|c| c.is_text())
        .filter_map(|c| c.text())
        .flat_map(|t| t.chars())
        .filter(|c| !c.is_ascii_whitespace())
        .collect()
}

fn decode_certificate(text: &str) -> Result<Certificate, String> {
    let der = base64::engine::general_purpose::STANDARD
        .decode(text)
        .map_err(|e| format!("base64: {}", e))?;
    Certificate::from_der(&der).map_err(|e| e.to_string())
}
