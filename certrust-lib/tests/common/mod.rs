#![allow(
    dead_code,
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Shared fixtures: an rcgen-backed PKI, an in-memory CRL source and tiny
//! HTTP, FTP and LDAP responders bound to localhost.

use certrust_lib::{Certificate, CrlSource, DistributionPoint, RevocationList, TrustError};
use rcgen::{
    BasicConstraints, CertificateParams, CertificateRevocationListParams, CrlDistributionPoint,
    CustomExtension, DnType, IsCa, KeyIdMethod, KeyPair, KeyUsagePurpose, RevocationReason,
    RevokedCertParams, SerialNumber,
};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Route library logs to the test harness. `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------
// PKI
// ---------------------------------------------------------------------------

/// A CA able to issue certificates and CRLs.
pub struct Authority {
    pub cert: rcgen::Certificate,
    pub key: KeyPair,
    pub parsed: Certificate,
}

fn name(cn: &str) -> rcgen::DistinguishedName {
    let mut dn = rcgen::DistinguishedName::new();
    dn.push(DnType::OrganizationName, "Certrust Test");
    dn.push(DnType::CommonName, cn);
    dn
}

fn ca_params(cn: &str, serial: u64, crl_urls: &[&str]) -> CertificateParams {
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    params.distinguished_name = name(cn);
    params.serial_number = Some(SerialNumber::from(serial));
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    params.crl_distribution_points = distribution_points(crl_urls);
    params
}

fn distribution_points(urls: &[&str]) -> Vec<CrlDistributionPoint> {
    if urls.is_empty() {
        return Vec::new();
    }
    vec![CrlDistributionPoint {
        uris: urls.iter().map(|u| u.to_string()).collect(),
    }]
}

fn parse(cert: &rcgen::Certificate) -> Certificate {
    Certificate::from_der(cert.der()).unwrap()
}

/// A self-signed root.
pub fn root(cn: &str) -> Authority {
    let key = KeyPair::generate().unwrap();
    let cert = ca_params(cn, 1, &[]).self_signed(&key).unwrap();
    let parsed = parse(&cert);
    Authority { cert, key, parsed }
}

/// A CA certificate for `cn` issued by `issuer`.
pub fn intermediate(cn: &str, issuer: &Authority, serial: u64, crl_urls: &[&str]) -> Authority {
    let key = KeyPair::generate().unwrap();
    intermediate_with_key(cn, issuer, serial, crl_urls, key)
}

/// Like [`intermediate`], reusing an existing key (cross-certification).
pub fn intermediate_with_key(
    cn: &str,
    issuer: &Authority,
    serial: u64,
    crl_urls: &[&str],
    key: KeyPair,
) -> Authority {
    let cert = ca_params(cn, serial, crl_urls)
        .signed_by(&key, &issuer.cert, &issuer.key)
        .unwrap();
    let parsed = parse(&cert);
    Authority { cert, key, parsed }
}

/// Parameters of an end-entity certificate, ready for tweaking.
pub fn leaf_params(cn: &str, serial: u64, crl_urls: &[&str]) -> CertificateParams {
    let mut params = CertificateParams::new(vec![format!("{}.test", cn.to_lowercase())]).unwrap();
    params.distinguished_name = name(cn);
    params.serial_number = Some(SerialNumber::from(serial));
    params.is_ca = IsCa::ExplicitNoCa;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.crl_distribution_points = distribution_points(crl_urls);
    params
}

/// Sign `params` with `issuer`.
pub fn issue(params: CertificateParams, issuer: &Authority) -> Certificate {
    let key = KeyPair::generate().unwrap();
    let cert = params.signed_by(&key, &issuer.cert, &issuer.key).unwrap();
    parse(&cert)
}

/// An end-entity certificate issued by `issuer`.
pub fn leaf(cn: &str, issuer: &Authority, serial: u64, crl_urls: &[&str]) -> Certificate {
    issue(leaf_params(cn, serial, crl_urls), issuer)
}

/// An extension with arbitrary contents.
pub fn raw_extension(oid: &[u64], content: Vec<u8>) -> CustomExtension {
    CustomExtension::from_oid_content(oid, content)
}

/// A DER CRL issued by `issuer` revoking the given serials.
pub fn crl(issuer: &Authority, revoked: &[(u64, RevocationReason)]) -> Vec<u8> {
    crl_params(revoked)
        .signed_by(&issuer.cert, &issuer.key)
        .unwrap()
        .der()
        .to_vec()
}

/// The same CRL, PEM-armored.
pub fn crl_pem(issuer: &Authority, revoked: &[(u64, RevocationReason)]) -> String {
    crl_params(revoked)
        .signed_by(&issuer.cert, &issuer.key)
        .unwrap()
        .pem()
        .unwrap()
}

fn crl_params(revoked: &[(u64, RevocationReason)]) -> CertificateRevocationListParams {
    CertificateRevocationListParams {
        this_update: rcgen::date_time_ymd(2024, 1, 1),
        next_update: rcgen::date_time_ymd(2034, 1, 1),
        crl_number: SerialNumber::from(1u64),
        issuing_distribution_point: None,
        revoked_certs: revoked
            .iter()
            .map(|(serial, reason)| RevokedCertParams {
                serial_number: SerialNumber::from(*serial),
                revocation_time: rcgen::date_time_ymd(2024, 1, 1),
                reason_code: Some(*reason),
                invalidity_date: None,
            })
            .collect(),
        key_identifier_method: KeyIdMethod::Sha256,
    }
}

// ---------------------------------------------------------------------------
// In-memory CRL source
// ---------------------------------------------------------------------------

/// What a distribution point serves.
#[derive(Clone)]
pub enum Published {
    Crl(Vec<u8>),
    Garbage,
    Timeout,
    Unreachable,
}

/// A [`CrlSource`] answering from a fixed table. Unknown URLs are
/// unreachable.
#[derive(Default)]
pub struct StaticCrls {
    published: HashMap<String, Published>,
    fetches: AtomicUsize,
}

impl StaticCrls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, published: Published) -> Self {
        self.published.insert(url.to_string(), published);
        self
    }

    /// Number of fetches made so far.
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl CrlSource for StaticCrls {
    fn fetch(&self, point: &DistributionPoint) -> Result<RevocationList, TrustError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let url = point.url().to_string();
        let decode = |bytes: &[u8]| {
            RevocationList::parse(bytes).map_err(|e| TrustError::CrlError {
                url: url.clone(),
                reason: e.to_string(),
            })
        };
        match self.published.get(point.url()) {
            Some(Published::Crl(der)) => decode(der),
            Some(Published::Garbage) => decode(b"this is not a CRL"),
            Some(Published::Timeout) => Err(TrustError::FetchTimeout {
                url,
                timeout_secs: 1,
            }),
            Some(Published::Unreachable) | None => Err(TrustError::FetchError {
                url,
                reason: "connection refused".into(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Local HTTP responder
// ---------------------------------------------------------------------------

fn read_request(stream: &mut TcpStream) {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                request.extend_from_slice(&buf[..n]);
                if request.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
        }
    }
}

/// Serve `body` with `status` (e.g. "200 OK") to every request. Returns the
/// base URL, `http://127.0.0.1:<port>`.
pub fn serve(status: &'static str, body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            read_request(&mut stream);
            let head = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/pkix-crl\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                body.len()
            );
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.write_all(&body);
        }
    });
    format!("http://{}", addr)
}

/// Accept connections and never answer.
pub fn serve_stalled() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { continue };
            thread::spawn(move || {
                thread::sleep(Duration::from_secs(5));
                drop(stream);
            });
        }
    });
    format!("http://{}", addr)
}

/// A localhost port nothing listens on.
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

// ---------------------------------------------------------------------------
// Local FTP responder
// ---------------------------------------------------------------------------

/// What the FTP data channel does after RETR.
#[derive(Clone)]
pub enum FtpData {
    /// Send the file and close.
    File(Vec<u8>),
    /// Accept the data connection and hold it open without sending.
    Stall,
}

/// A passive-mode FTP server on localhost answering a single file for any
/// path.
pub struct FtpServer {
    pub base: String,
    commands: Arc<Mutex<Vec<String>>>,
}

impl FtpServer {
    /// Control commands received so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

pub fn serve_ftp(data: FtpData) -> FtpServer {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let commands = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&commands);
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { continue };
            ftp_session(stream, &data, &log);
        }
    });
    FtpServer {
        base: format!("ftp://{}", addr),
        commands,
    }
}

fn ftp_session(mut control: TcpStream, data: &FtpData, log: &Mutex<Vec<String>>) {
    let mut reader = BufReader::new(control.try_clone().unwrap());
    let mut passive: Option<TcpListener> = None;
    let _ = control.write_all(b"220 certrust test FTP\r\n");
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let line = line.trim_end().to_string();
        log.lock().unwrap().push(line.clone());
        let verb = line.split(' ').next().unwrap_or("").to_ascii_uppercase();
        let reply = match verb.as_str() {
            "USER" => "331 password please".to_string(),
            "PASS" => "230 logged in".to_string(),
            "TYPE" => "200 type set".to_string(),
            "PASV" => {
                let listener = TcpListener::bind("127.0.0.1:0").unwrap();
                let port = listener.local_addr().unwrap().port();
                passive = Some(listener);
                format!(
                    "227 Entering Passive Mode (127,0,0,1,{},{})",
                    port >> 8,
                    port & 0xff
                )
            }
            "RETR" => {
                let _ = control.write_all(b"150 opening data connection\r\n");
                let Some(listener) = passive.take() else {
                    return;
                };
                let Ok((mut channel, _)) = listener.accept() else {
                    return;
                };
                match data {
                    FtpData::File(bytes) => {
                        let _ = channel.write_all(bytes);
                        drop(channel);
                        "226 transfer complete".to_string()
                    }
                    FtpData::Stall => {
                        thread::sleep(Duration::from_secs(5));
                        return;
                    }
                }
            }
            "QUIT" => {
                let _ = control.write_all(b"221 bye\r\n");
                return;
            }
            _ => "502 not implemented".to_string(),
        };
        if control.write_all(format!("{}\r\n", reply).as_bytes()).is_err() {
            return;
        }
    }
}

// ---------------------------------------------------------------------------
// Local LDAP responder
// ---------------------------------------------------------------------------

fn ber(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else if len <= 0xff {
        out.extend_from_slice(&[0x81, len as u8]);
    } else {
        out.extend_from_slice(&[0x82, (len >> 8) as u8, len as u8]);
    }
    out.extend_from_slice(content);
    out
}

/// Read one BER element from `stream`: returns its contents.
fn read_ber(stream: &mut TcpStream) -> Option<Vec<u8>> {
    let mut head = [0u8; 2];
    stream.read_exact(&mut head).ok()?;
    let len = if head[1] < 0x80 {
        head[1] as usize
    } else {
        let mut bytes = vec![0u8; (head[1] & 0x7f) as usize];
        stream.read_exact(&mut bytes).ok()?;
        bytes.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize)
    };
    let mut content = vec![0u8; len];
    stream.read_exact(&mut content).ok()?;
    Some(content)
}

/// Answer every LDAP search with one entry whose `attribute` holds `value`.
/// Returns `ldap://127.0.0.1:<port>`.
pub fn serve_ldap(attribute: &'static str, value: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            while let Some(message) = read_ber(&mut stream) {
                // messageID is the leading INTEGER, echoed back verbatim
                let id_len = 2 + message[1] as usize;
                let id = &message[..id_len];
                // 0x63 is SearchRequest; anything else (unbind) ends the session
                if message.get(id_len) != Some(&0x63) {
                    break;
                }

                let values = ber(0x31, &ber(0x04, &value));
                let attr = ber(0x30, &[ber(0x04, attribute.as_bytes()), values].concat());
                let entry_body = [ber(0x04, b"cn=Root CA,o=Certrust Test"), ber(0x30, &attr)].concat();
                let entry = ber(0x30, &[id, &ber(0x64, &entry_body)[..]].concat());
                let done_body = [ber(0x0a, &[0]), ber(0x04, b""), ber(0x04, b"")].concat();
                let done = ber(0x30, &[id, &ber(0x65, &done_body)[..]].concat());

                if stream.write_all(&entry).is_err() || stream.write_all(&done).is_err() {
                    break;
                }
            }
        }
    });
    format!("ldap://{}", addr)
}
