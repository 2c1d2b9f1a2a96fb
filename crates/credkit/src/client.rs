//! The full issuance chain: build the request, send it, validate the
//! certificate. Installation and persistence only ever see a certificate
//! that came out of here.

use std::path::Path;

use ssh_key::{PrivateKey, PublicKey};

use crate::agent::Agent;
use crate::certificate::{parse_certificate, Certificate, CredentialPair};
use crate::config::ClientConfig;
use crate::error::Error;
use crate::installer::install_certificate;
use crate::persist::{save_private_files, save_public_files};
use crate::request::build_sign_request_for_key;
use crate::transport;

/// Ask the authority to certify `public_key`.
pub async fn sign(
    public_key: &PublicKey,
    token: &str,
    config: &ClientConfig,
) -> Result<Certificate, Error> {
    config.validate()?;
    let request = build_sign_request_for_key(
        public_key,
        config.principal.as_deref(),
        config.validity.as_deref(),
    )?;
    let raw = transport::send(&request, token, &config.ca, config.skip_tls_verify).await?;
    let cert = parse_certificate(&raw, public_key)?;
    tracing::info!(
        key_id = %cert.key_id(),
        serial = cert.serial(),
        valid_before = cert.valid_before(),
        "Received certificate"
    );
    Ok(cert)
}

/// Certify the public half of `private_key` and pair the result with it.
pub async fn issue(
    private_key: PrivateKey,
    token: &str,
    config: &ClientConfig,
) -> Result<CredentialPair, Error> {
    let cert = sign(private_key.public_key(), token, config).await?;
    CredentialPair::new(cert, private_key)
}

/// Outcome of handing an issued credential to its consumers. The two steps
/// are independent: one may fail after the other succeeded.
#[derive(Debug)]
pub struct Delivery {
    /// `None` when no agent was supplied.
    pub installed: Option<Result<(), Error>>,
    pub saved: Result<(), Error>,
}

impl Delivery {
    pub fn is_complete(&self) -> bool {
        self.installed.as_ref().map_or(true, Result::is_ok) && self.saved.is_ok()
    }
}

/// Install `pair` into `agent` (if any) and save it under `prefix` (if
/// non-empty).
pub fn deliver(pair: &CredentialPair, agent: Option<&dyn Agent>, prefix: &Path) -> Delivery {
    let installed =
        agent.map(|a| install_certificate(a, pair.certificate(), pair.private_key()));
    let saved = save_public_files(prefix, Some(pair.certificate()), Some(pair.public_key()))
        .and_then(|()| save_private_files(prefix, Some(pair.certificate()), Some(pair.private_key())));
    if let Err(e) = &saved {
        tracing::warn!(error = %e, "Saving credential files failed");
    }
    Delivery { installed, saved }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Agent, Keyring};
    use crate::certificate::VALID_FOREVER;
    use crate::keys::{generate_private_key, load_private_key, KeyType};
    use crate::testutil::Authority;
    use crate::transport::tests::serve;
    use crate::types::request::{ResponseEnvelope, SigningRequest};

    use axum::routing::post;
    use axum::{Json, Router};

    /// An authority that certifies whatever key it is sent.
    async fn signing_authority(ca: Authority) -> String {
        let app = Router::new().route(
            "/sign",
            post(move |Json(req): Json<SigningRequest>| {
                let ca = ca.clone();
                async move {
                    let key = PublicKey::from_openssh(req.key().trim()).unwrap();
                    let cert = ca.sign(&key, "test_key_12345", VALID_FOREVER);
                    Json(ResponseEnvelope::ok(cert.to_openssh()))
                }
            }),
        );
        serve(app).await
    }

    /// An authority that always signs the same, unrelated key.
    async fn confused_authority() -> String {
        let ca = Authority::new();
        let other = generate_private_key(KeyType::Ed25519).unwrap();
        let cert = ca.sign(other.public_key(), "someone_else", VALID_FOREVER);
        let text = cert.to_openssh();
        let app = Router::new().route(
            "/sign",
            post(move || {
                let text = text.clone();
                async move { Json(ResponseEnvelope::ok(text)) }
            }),
        );
        serve(app).await
    }

    fn config(url: &str) -> ClientConfig {
        let mut config = ClientConfig::new(url);
        config.validity = Some("24h".to_string());
        config
    }

    #[tokio::test]
    async fn test_sign_good() {
        let url = signing_authority(Authority::new()).await;
        let key = generate_private_key(KeyType::Ed25519).unwrap();
        let cert = sign(key.public_key(), "token", &config(&url)).await.unwrap();
        assert_eq!(cert.public_key(), key.public_key().key_data());
        assert_eq!(cert.key_id(), "test_key_12345");
    }

    #[tokio::test]
    async fn test_sign_bad_token() {
        let app = Router::new().route(
            "/sign",
            post(|| async { Json(ResponseEnvelope::error("bad token")) }),
        );
        let url = serve(app).await;
        let key = generate_private_key(KeyType::Ed25519).unwrap();
        let err = sign(key.public_key(), "token", &config(&url))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AuthorityRejected(ref m) if m == "bad token"));
    }

    #[tokio::test]
    async fn test_sign_rejects_certificate_for_other_key() {
        let url = confused_authority().await;
        let key = generate_private_key(KeyType::Ed25519).unwrap();
        let err = sign(key.public_key(), "token", &config(&url))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::KeyMismatch(_)));
    }

    #[tokio::test]
    async fn test_sign_invalid_validity_sends_nothing() {
        let key = generate_private_key(KeyType::Ed25519).unwrap();
        let mut config = config("http://127.0.0.1:1");
        config.validity = Some("whenever".to_string());
        let err = sign(key.public_key(), "token", &config).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_issue_install_and_persist() {
        let url = signing_authority(Authority::new()).await;
        let key = generate_private_key(KeyType::Ed25519).unwrap();
        let pair = issue(key, "token", &config(&url)).await.unwrap();

        let agent = Keyring::new();
        let dir = tempfile::tempdir().unwrap();
        let delivery = deliver(&pair, Some(&agent), dir.path());
        assert!(delivery.is_complete());

        let listed = agent.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].comment, "test_key_12345 [No expiry]");
        assert!(dir.path().join("id_test_key_12345.pub").exists());
        assert!(dir.path().join("id_test_key_12345-cert.pub").exists());
        assert!(dir.path().join("id_test_key_12345").exists());
    }

    #[tokio::test]
    async fn test_issue_ssh_keygen_forever_certificate() {
        let app = Router::new().route(
            "/sign",
            post(|| async {
                Json(ResponseEnvelope::ok(include_str!(
                    "../testdata/forever_user-cert.pub"
                )))
            }),
        );
        let url = serve(app).await;
        let key = load_private_key(include_str!("../testdata/forever_user")).unwrap();
        let pair = issue(key, "token", &config(&url)).await.unwrap();
        assert_eq!(pair.certificate().valid_before(), VALID_FOREVER);

        let agent = Keyring::new();
        let dir = tempfile::tempdir().unwrap();
        assert!(deliver(&pair, Some(&agent), dir.path()).is_complete());
        assert_eq!(agent.list().unwrap()[0].comment, "forever_user [No expiry]");
    }

    #[tokio::test]
    async fn test_partial_delivery_reported() {
        let url = signing_authority(Authority::new()).await;
        let key = generate_private_key(KeyType::Ed25519).unwrap();
        let pair = issue(key, "token", &config(&url)).await.unwrap();

        let agent = Keyring::new();
        let dir = tempfile::tempdir().unwrap();
        let delivery = deliver(&pair, Some(&agent), &dir.path().join("missing"));

        assert!(!delivery.is_complete());
        assert!(matches!(delivery.installed, Some(Ok(()))));
        assert_eq!(
            delivery.saved.unwrap_err().io_kind(),
            Some(std::io::ErrorKind::NotFound)
        );
        // The agent entry stays; nothing is rolled back.
        assert_eq!(agent.list().unwrap().len(), 1);
    }

    #[test]
    fn test_deliver_without_consumers() {
        let (cert, key) = crate::testutil::mint_certificate("alice", VALID_FOREVER);
        let pair = CredentialPair::new(cert, key).unwrap();
        let delivery = deliver(&pair, None, Path::new(""));
        assert!(delivery.installed.is_none());
        assert!(delivery.is_complete());
    }

    #[tokio::test]
    async fn test_rejected_issue_leaves_no_side_effects() {
        let app = Router::new().route(
            "/sign",
            post(|| async { Json(ResponseEnvelope::error("bad token")) }),
        );
        let url = serve(app).await;
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(&url);
        config.prefix = Some(dir.path().to_path_buf());

        let key = generate_private_key(KeyType::Ed25519).unwrap();
        assert!(issue(key, "token", &config).await.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
