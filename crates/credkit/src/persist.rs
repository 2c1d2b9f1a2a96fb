//! Writing issued credentials to disk.
//!
//! Files live under a prefix directory and are named after the
//! certificate's key identifier:
//!
//! - `id_<key_id>.pub` — public key (authorized_keys line)
//! - `id_<key_id>-cert.pub` — certificate
//! - `id_<key_id>` — OpenSSH private key, owner-only
//!
//! An empty prefix turns every save into a no-op.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use ssh_key::{PrivateKey, PublicKey};
use uuid::Uuid;

use crate::certificate::{check_key_matches, Certificate};
use crate::error::Error;
use crate::keys::private_key_to_openssh;

const PUBLIC_MODE: u32 = 0o644;
const PRIVATE_MODE: u32 = 0o600;

/// Destination for credential files.
pub trait FileStore {
    /// Replace `path` with `data`. Either the full contents land or the
    /// existing file is left as it was.
    fn write_atomic(&self, path: &Path, data: &[u8], mode: u32) -> std::io::Result<()>;
}

/// Local filesystem store: write a temporary sibling, sync, rename.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileStore;

impl FileStore for LocalFileStore {
    fn write_atomic(&self, path: &Path, data: &[u8], mode: u32) -> std::io::Result<()> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

        let mut options = OpenOptions::new();
        options.create_new(true).write(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;

        let result = options.open(&temp_path).and_then(|mut file| {
            file.write_all(data)?;
            file.sync_all()?;
            std::fs::rename(&temp_path, path)
        });
        if result.is_err() {
            let _ = std::fs::remove_file(&temp_path);
        }
        result
    }
}

/// Saves certificates and keys through a [`FileStore`].
#[derive(Debug, Clone, Default)]
pub struct CredentialWriter<S = LocalFileStore> {
    store: S,
}

impl<S: FileStore> CredentialWriter<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Write the public key and certificate files.
    ///
    /// `public_key` defaults to the key embedded in the certificate.
    pub fn save_public(
        &self,
        prefix: &Path,
        cert: Option<&Certificate>,
        public_key: Option<&PublicKey>,
    ) -> Result<(), Error> {
        if prefix.as_os_str().is_empty() {
            return Ok(());
        }
        let cert = cert.ok_or(Error::KeyRequired)?;
        let base = file_base(prefix, cert)?;

        let public_key = match public_key {
            Some(k) => k.clone(),
            None => PublicKey::from(cert.public_key().clone()),
        };
        let pub_text = public_key
            .to_openssh()
            .map_err(|e| Error::InvalidKey(e.to_string()))?;
        let cert_text = cert.to_openssh();

        let pub_path = with_suffix(&base, ".pub");
        let cert_path = with_suffix(&base, "-cert.pub");
        self.store
            .write_atomic(&pub_path, line(pub_text).as_bytes(), PUBLIC_MODE)?;
        self.store
            .write_atomic(&cert_path, line(cert_text).as_bytes(), PUBLIC_MODE)?;
        tracing::info!(
            public_key = %pub_path.display(),
            certificate = %cert_path.display(),
            "Saved public credential files"
        );
        Ok(())
    }

    /// Write the private key file.
    pub fn save_private(
        &self,
        prefix: &Path,
        cert: Option<&Certificate>,
        private_key: Option<&PrivateKey>,
    ) -> Result<(), Error> {
        if prefix.as_os_str().is_empty() {
            return Ok(());
        }
        let cert = cert.ok_or(Error::KeyRequired)?;
        let private_key = private_key.ok_or_else(|| {
            Error::InvalidKey(format!("no private key supplied for '{}'", cert.key_id()))
        })?;
        let base = file_base(prefix, cert)?;
        check_key_matches(cert, private_key)?;

        let pem = private_key_to_openssh(private_key)?;
        self.store.write_atomic(&base, pem.as_bytes(), PRIVATE_MODE)?;
        tracing::info!(private_key = %base.display(), "Saved private key file");
        Ok(())
    }
}

/// Save the public key and certificate under `prefix` on the local
/// filesystem.
pub fn save_public_files(
    prefix: impl AsRef<Path>,
    cert: Option<&Certificate>,
    public_key: Option<&PublicKey>,
) -> Result<(), Error> {
    CredentialWriter::new(LocalFileStore).save_public(prefix.as_ref(), cert, public_key)
}

/// Save the private key under `prefix` on the local filesystem.
pub fn save_private_files(
    prefix: impl AsRef<Path>,
    cert: Option<&Certificate>,
    private_key: Option<&PrivateKey>,
) -> Result<(), Error> {
    CredentialWriter::new(LocalFileStore).save_private(prefix.as_ref(), cert, private_key)
}

/// `<prefix>/id_<key_id>`, refusing identifiers that would leave `prefix`.
fn file_base(prefix: &Path, cert: &Certificate) -> Result<PathBuf, Error> {
    let key_id = cert.key_id();
    if key_id.contains('/') || key_id.contains('\\') || key_id.contains("..") {
        return Err(Error::InvalidInput(format!(
            "key identifier '{}' is not usable as a file name",
            key_id
        )));
    }
    Ok(prefix.join(format!("id_{}", key_id)))
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut s = base.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

fn line(mut text: String) -> String {
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text
}
