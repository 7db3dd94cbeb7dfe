//! CRL retrieval from distribution points.
//!
//! [`CrlFetcher`] dispatches on the URL prefix:
//!
//! - `http://`, `https://`: blocking `reqwest` GET
//! - `ftp://`: passive-mode binary RETR through `suppaftp`
//! - `ldap://`: base-scope read of `certificateRevocationList;binary` through `ldap3`
//!
//! Every request carries the configured deadline and the body is capped at
//! `max_crl_size`. The fetcher never retries; skipping a failed point is the
//! revocation checker's business.

use super::crl::RevocationList;
use super::points::{DistributionPoint, Scheme};
use crate::TrustError;
use ldap3::{LdapConn, LdapConnSettings, Scope, SearchEntry};
use reqwest::blocking::Client;
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream};
use url::Url;

/// Default maximum CRL size (10 MB).
pub(crate) const DEFAULT_MAX_CRL_SIZE: usize = 10 * 1024 * 1024;

/// Default per-fetch deadline in seconds.
pub(crate) const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

/// Directory attribute holding a DER-encoded CRL.
const LDAP_CRL_ATTRIBUTE: &str = "certificateRevocationList;binary";
const LDAP_DEFAULT_PORT: u16 = 389;
const FTP_DEFAULT_PORT: u16 = 21;

/// Anything that can produce the revocation list published at a
/// distribution point.
pub trait CrlSource: Send + Sync {
    fn fetch(&self, point: &DistributionPoint) -> Result<RevocationList, TrustError>;
}

/// Network CRL fetcher for HTTP(S), FTP and LDAP distribution points.
#[derive(Debug, Clone)]
pub struct CrlFetcher {
    client: Client,
    timeout: Duration,
    max_size: usize,
}

impl CrlFetcher {
    /// Create a fetcher with the given per-request timeout.
    pub fn new(timeout_secs: u64) -> Result<Self, TrustError> {
        Self::with_max_size(timeout_secs, DEFAULT_MAX_CRL_SIZE)
    }

    /// Create a fetcher with a custom response size cap.
    pub fn with_max_size(timeout_secs: u64, max_size: usize) -> Result<Self, TrustError> {
        let timeout = Duration::from_secs(timeout_secs);
        let client = http_client(timeout)?;
        Ok(CrlFetcher {
            client,
            timeout,
            max_size,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Download the raw bytes published at `point`.
    pub fn fetch_bytes(&self, point: &DistributionPoint) -> Result<Vec<u8>, TrustError> {
        match point.scheme()? {
            Scheme::Http | Scheme::Https => {
                http_get(&self.client, point.url(), self.timeout, self.max_size)
            }
            Scheme::Ftp => self.ftp_get(point.url()),
            Scheme::Ldap => self.ldap_get(point.url()),
        }
    }

    fn ftp_get(&self, url: &str) -> Result<Vec<u8>, TrustError> {
        let fetch_error = |reason: String| TrustError::FetchError {
            url: url.to_string(),
            reason,
        };

        let parsed = Url::parse(url).map_err(|e| fetch_error(format!("invalid URL: {}", e)))?;
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| fetch_error("missing host".into()))?;
        let port = parsed.port().unwrap_or(FTP_DEFAULT_PORT);
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|e| fetch_error(format!("cannot resolve {}: {}", host, e)))?
            .next()
            .ok_or_else(|| fetch_error(format!("no address for {}", host)))?;

        let timeout = self.timeout;
        let mut ftp = FtpStream::connect_timeout(addr, self.timeout)
            .map_err(|e| self.ftp_error(url, e))?
            .passive_stream_builder(move |addr| {
                let stream = TcpStream::connect_timeout(&addr, timeout)
                    .map_err(FtpError::ConnectionError)?;
                stream
                    .set_read_timeout(Some(timeout))
                    .map_err(FtpError::ConnectionError)?;
                Ok(stream)
            });
        ftp.get_ref()
            .set_read_timeout(Some(self.timeout))
            .map_err(|e| fetch_error(e.to_string()))?;

        let (user, password) = match parsed.username() {
            "" => ("anonymous".to_string(), "anonymous".to_string()),
            user => (
                decode(user),
                parsed.password().map(decode).unwrap_or_default(),
            ),
        };
        ftp.login(&user, &password)
            .map_err(|e| self.ftp_error(url, e))?;
        ftp.transfer_type(FileType::Binary)
            .map_err(|e| self.ftp_error(url, e))?;

        let path = decode(parsed.path());
        let max_size = self.max_size;
        let data = ftp
            .retr(&path, |stream| {
                let mut data = Vec::new();
                stream
                    .take(max_size as u64 + 1)
                    .read_to_end(&mut data)
                    .map_err(FtpError::ConnectionError)?;
                if data.len() > max_size {
                    // dropping the data stream here aborts the transfer
                    return Err(FtpError::ConnectionError(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("CRL exceeds the {} byte limit", max_size),
                    )));
                }
                Ok(data)
            })
            .map_err(|e| self.ftp_error(url, e))?;
        if let Err(e) = ftp.quit() {
            tracing::debug!("FTP QUIT on '{}' failed: {}", url, e);
        }
        Ok(data)
    }

    fn ftp_error(&self, url: &str, e: FtpError) -> TrustError {
        if let FtpError::ConnectionError(io) = &e {
            if is_timeout(io) {
                return TrustError::FetchTimeout {
                    url: url.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                };
            }
        }
        TrustError::FetchError {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }

    fn ldap_get(&self, url: &str) -> Result<Vec<u8>, TrustError> {
        let fetch_error = |reason: String| TrustError::FetchError {
            url: url.to_string(),
            reason,
        };

        let (server, base) = split_ldap_url(url).map_err(fetch_error)?;
        let settings = LdapConnSettings::new().set_conn_timeout(self.timeout);
        let mut ldap = LdapConn::with_settings(settings, &server)
            .map_err(|e| fetch_error(format!("cannot connect to {}: {}", server, e)))?;

        let search = ldap
            .with_timeout(self.timeout)
            .search(&base, Scope::Base, "(objectClass=*)", vec![LDAP_CRL_ATTRIBUTE])
            .and_then(|result| result.success());
        if let Err(e) = ldap.unbind() {
            tracing::debug!("LDAP unbind from '{}' failed: {}", server, e);
        }
        let (entries, _) = search.map_err(|e| fetch_error(e.to_string()))?;

        let value = entries
            .into_iter()
            .map(SearchEntry::construct)
            .find_map(crl_attribute)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| fetch_error(format!("no '{}' value", LDAP_CRL_ATTRIBUTE)))?;

        if value.len() > self.max_size {
            return Err(fetch_error(format!(
                "CRL of {} bytes exceeds the {} byte limit",
                value.len(),
                self.max_size
            )));
        }
        Ok(value)
    }
}

impl CrlSource for CrlFetcher {
    fn fetch(&self, point: &DistributionPoint) -> Result<RevocationList, TrustError> {
        let bytes = self.fetch_bytes(point)?;
        tracing::trace!("{} bytes downloaded from '{}'", bytes.len(), point);
        RevocationList::parse(&bytes).map_err(|e| TrustError::CrlError {
            url: point.url().to_string(),
            reason: e.to_string(),
        })
    }
}

/// Blocking HTTP client with a total request deadline.
pub(crate) fn http_client(timeout: Duration) -> Result<Client, TrustError> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
        .map_err(|e| TrustError::ConfigurationError(format!("failed to create HTTP client: {}", e)))
}

/// GET `url`, failing on non-2xx statuses and on bodies above `max_size`.
pub(crate) fn http_get(
    client: &Client,
    url: &str,
    timeout: Duration,
    max_size: usize,
) -> Result<Vec<u8>, TrustError> {
    let request_error = |e: reqwest::Error| {
        if e.is_timeout() {
            TrustError::FetchTimeout {
                url: url.to_string(),
                timeout_secs: timeout.as_secs(),
            }
        } else {
            TrustError::FetchError {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().map_err(request_error)?;

    if !response.status().is_success() {
        return Err(TrustError::FetchError {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let too_large = |size: u64| TrustError::FetchError {
        url: url.to_string(),
        reason: format!("response of {} bytes exceeds the {} byte limit", size, max_size),
    };

    if let Some(length) = response.content_length() {
        if length > max_size as u64 {
            return Err(too_large(length));
        }
    }

    let mut body = Vec::new();
    response
        .take(max_size as u64 + 1)
        .read_to_end(&mut body)
        .map_err(|e| {
            if is_timeout(&e) {
                TrustError::FetchTimeout {
                    url: url.to_string(),
                    timeout_secs: timeout.as_secs(),
                }
            } else {
                TrustError::FetchError {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

    if body.len() > max_size {
        return Err(too_large(body.len() as u64));
    }
    Ok(body)
}

fn is_timeout(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
    ) || e.to_string().contains("timed out")
}

fn decode(s: &str) -> String {
    percent_encoding::percent_decode_str(s)
        .decode_utf8_lossy()
        .into_owned()
}

/// Split `ldap://host[:port]/dn` into the server URL and the base DN.
fn split_ldap_url(url: &str) -> Result<(String, String), String> {
    let parsed = Url::parse(url).map_err(|e| format!("invalid URL: {}", e))?;
    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or("missing host")?;
    let port = parsed.port().unwrap_or(LDAP_DEFAULT_PORT);
    let base = decode(parsed.path().trim_start_matches('/'));
    Ok((format!("ldap://{}:{}", host, port), base))
}

/// Pull the CRL value out of a search entry. Attribute names are compared
/// case-insensitively, with or without the `;binary` option.
fn crl_attribute(entry: SearchEntry) -> Option<Vec<u8>> {
    let wanted = |name: &str| {
        name.eq_ignore_ascii_case(LDAP_CRL_ATTRIBUTE)
            || name.eq_ignore_ascii_case("certificateRevocationList")
    };

    let binary = entry
        .bin_attrs
        .into_iter()
        .find(|(name, _)| wanted(name))
        .and_then(|(_, values)| values.into_iter().next());
    binary.or_else(|| {
        entry
            .attrs
            .into_iter()
            .find(|(name, _)| wanted(name))
            .and_then(|(_, values)| values.into_iter().next())
            .map(String::into_bytes)
    })
}
