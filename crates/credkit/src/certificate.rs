use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use ssh_key::public::KeyData;
use ssh_key::{HashAlg, PrivateKey, PublicKey};

use crate::error::Error;

/// `valid_before` value OpenSSH uses for certificates that never expire.
pub const VALID_FOREVER: u64 = u64::MAX;

/// Largest timestamp `ssh_key` will decode.
const MAX_DECODABLE_TIME: u64 = i64::MAX as u64;

const PROOF_NAMESPACE: &str = "credkit-key-proof";
const PROOF_MESSAGE: &[u8] = b"credkit: private key corresponds to certificate";

/// An OpenSSH certificate, kept byte-for-byte as the authority encoded it.
///
/// Fields are read from a decoded copy, except `valid_before`, which is read
/// straight from the wire so that `ssh-keygen -V forever` certificates
/// (`u64::MAX`) survive. Saving or installing the certificate always uses the
/// original bytes and signature.
#[derive(Debug, Clone)]
pub struct Certificate {
    algorithm: String,
    blob: Vec<u8>,
    comment: String,
    valid_before: u64,
    decoded: ssh_key::Certificate,
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.blob == other.blob
    }
}

impl Eq for Certificate {}

impl Certificate {
    /// Parse `<algorithm> <base64> [comment]` text.
    pub fn from_openssh(text: &str) -> Result<Self, Error> {
        let mut fields = text.trim().splitn(3, char::is_whitespace);
        let algorithm = fields.next().unwrap_or_default();
        let encoded = fields
            .next()
            .ok_or_else(|| malformed("missing certificate data"))?;
        let comment = fields.next().unwrap_or_default().trim();

        let blob = BASE64.decode(encoded).map_err(malformed)?;
        let mut cert = Self::from_bytes(blob)?;
        if cert.algorithm != algorithm {
            return Err(malformed(format!(
                "certificate type '{}' does not match encoded type '{}'",
                algorithm, cert.algorithm
            )));
        }
        cert.comment = comment.to_string();
        Ok(cert)
    }

    /// Parse the binary wire encoding.
    pub fn from_bytes(blob: Vec<u8>) -> Result<Self, Error> {
        let layout = Layout::scan(&blob)?;

        let decoded = if layout.valid_before_value > MAX_DECODABLE_TIME {
            let mut clamped = blob.clone();
            clamped[layout.valid_before..layout.valid_before + 8]
                .copy_from_slice(&MAX_DECODABLE_TIME.to_be_bytes());
            ssh_key::Certificate::from_bytes(&clamped)
        } else {
            ssh_key::Certificate::from_bytes(&blob)
        }
        .map_err(malformed)?;

        Ok(Self {
            algorithm: layout.algorithm,
            blob,
            comment: String::new(),
            valid_before: layout.valid_before_value,
            decoded,
        })
    }

    /// Authorized-keys style text carrying the original encoding.
    pub fn to_openssh(&self) -> String {
        let encoded = BASE64.encode(&self.blob);
        if self.comment.is_empty() {
            format!("{} {}", self.algorithm, encoded)
        } else {
            format!("{} {} {}", self.algorithm, encoded, self.comment)
        }
    }

    pub fn to_bytes(&self) -> &[u8] {
        &self.blob
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn key_id(&self) -> &str {
        self.decoded.key_id()
    }

    /// The certified key.
    pub fn public_key(&self) -> &KeyData {
        self.decoded.public_key()
    }

    pub fn serial(&self) -> u64 {
        self.decoded.serial()
    }

    pub fn valid_principals(&self) -> &[String] {
        self.decoded.valid_principals()
    }

    pub fn valid_after(&self) -> u64 {
        self.decoded.valid_after()
    }

    /// Validity end in seconds since the epoch; [`VALID_FOREVER`] when the
    /// certificate never expires.
    pub fn valid_before(&self) -> u64 {
        self.valid_before
    }
}

fn malformed(e: impl std::fmt::Display) -> Error {
    Error::MalformedCertificate(e.to_string())
}

/// Where `valid_before` sits in an encoded certificate. The fields after it
/// are left to `ssh_key`.
pub(crate) struct Layout {
    pub(crate) algorithm: String,
    pub(crate) valid_before: usize,
    pub(crate) valid_before_value: u64,
}

impl Layout {
    pub(crate) fn scan(blob: &[u8]) -> Result<Self, Error> {
        let mut r = WireReader { buf: blob, pos: 0 };
        let algorithm = std::str::from_utf8(r.string()?)
            .map_err(|_| malformed("certificate type is not UTF-8"))?
            .to_string();
        let key_fields = key_field_count(&algorithm)
            .ok_or_else(|| malformed(format!("unsupported certificate type '{}'", algorithm)))?;

        r.string()?; // nonce
        for _ in 0..key_fields {
            r.string()?;
        }
        r.take(8)?; // serial
        r.take(4)?; // type
        r.string()?; // key id
        r.string()?; // principals
        r.take(8)?; // valid after
        let valid_before = r.pos;
        let valid_before_value = r.u64()?;

        Ok(Self {
            algorithm,
            valid_before,
            valid_before_value,
        })
    }
}

/// Number of length-prefixed public key fields for each certificate type.
fn key_field_count(algorithm: &str) -> Option<usize> {
    let n = match algorithm {
        "ssh-ed25519-cert-v01@openssh.com" => 1,
        "ssh-rsa-cert-v01@openssh.com"
        | "ecdsa-sha2-nistp256-cert-v01@openssh.com"
        | "ecdsa-sha2-nistp384-cert-v01@openssh.com"
        | "ecdsa-sha2-nistp521-cert-v01@openssh.com"
        | "sk-ssh-ed25519-cert-v01@openssh.com" => 2,
        "sk-ecdsa-sha2-nistp256-cert-v01@openssh.com" => 3,
        "ssh-dss-cert-v01@openssh.com" => 4,
        _ => return None,
    };
    Some(n)
}

struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], Error> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| malformed("truncated certificate"))?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32, Error> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, Error> {
        let b = self.take(8)?;
        let mut out = [0u8; 8];
        out.copy_from_slice(b);
        Ok(u64::from_be_bytes(out))
    }

    fn string(&mut self) -> Result<&'a [u8], Error> {
        let len = self.u32()? as usize;
        self.take(len)
    }
}

/// Parse the authority's certificate text and check that it certifies
/// `original`, the key the signing request was built from.
pub fn parse_certificate(raw: &str, original: &PublicKey) -> Result<Certificate, Error> {
    let cert = Certificate::from_openssh(raw)?;

    if cert.public_key() != original.key_data() {
        return Err(Error::KeyMismatch(format!(
            "certificate '{}' does not certify the submitted key",
            cert.key_id()
        )));
    }
    Ok(cert)
}

/// True when the certificate has no validity end.
pub fn is_infinite(cert: &Certificate) -> bool {
    cert.valid_before() == VALID_FOREVER
}

/// Validity end as a timestamp, `None` for certificates that never expire
/// or whose end lies beyond the representable range.
pub fn valid_before_time(cert: &Certificate) -> Option<DateTime<Utc>> {
    if is_infinite(cert) {
        return None;
    }
    let secs = i64::try_from(cert.valid_before()).ok()?;
    DateTime::from_timestamp(secs, 0)
}

/// Human-readable expiry label used as the agent comment.
pub fn expiry_comment(cert: &Certificate) -> String {
    match valid_before_time(cert) {
        Some(t) => format!(
            "{} [Expires {}]",
            cert.key_id(),
            t.format("%Y-%m-%d %H:%M:%S %z %Z")
        ),
        None => format!("{} [No expiry]", cert.key_id()),
    }
}

/// Prove that `private_key` can produce signatures the certificate's
/// embedded key accepts.
pub fn check_key_matches(cert: &Certificate, private_key: &PrivateKey) -> Result<(), Error> {
    if private_key.public_key().key_data() != cert.public_key() {
        return Err(Error::KeyMismatch(format!(
            "private key does not correspond to certificate '{}'",
            cert.key_id()
        )));
    }

    let sig = private_key
        .sign(PROOF_NAMESPACE, HashAlg::Sha512, PROOF_MESSAGE)
        .map_err(|e| Error::InvalidKey(e.to_string()))?;
    PublicKey::from(cert.public_key().clone())
        .verify(PROOF_NAMESPACE, PROOF_MESSAGE, &sig)
        .map_err(|e| Error::KeyMismatch(e.to_string()))
}

/// A validated certificate together with the private key it certifies.
#[derive(Debug, Clone)]
pub struct CredentialPair {
    certificate: Certificate,
    private_key: PrivateKey,
}

impl CredentialPair {
    pub fn new(certificate: Certificate, private_key: PrivateKey) -> Result<Self, Error> {
        check_key_matches(&certificate, &private_key)?;
        Ok(Self {
            certificate,
            private_key,
        })
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    pub fn public_key(&self) -> &PublicKey {
        self.private_key.public_key()
    }
}
