//! Fixtures shared by the unit tests: a throwaway signing authority.

use rand::rngs::OsRng;
use ssh_key::certificate::{Builder, CertType};
use ssh_key::{PrivateKey, PublicKey, Signature, SigningKey};

use crate::certificate::{Certificate, Layout};
use crate::keys::{generate_private_key, KeyType};

#[derive(Clone)]
pub struct Authority {
    key: PrivateKey,
}

impl Authority {
    pub fn new() -> Self {
        Self {
            key: generate_private_key(KeyType::Ed25519).unwrap(),
        }
    }

    /// Certify `subject`. `valid_before` may be [`crate::certificate::VALID_FOREVER`].
    pub fn sign(&self, subject: &PublicKey, key_id: &str, valid_before: u64) -> Certificate {
        let buildable = valid_before.min(i64::MAX as u64);
        let mut builder =
            Builder::new_with_random_nonce(&mut OsRng, subject.key_data().clone(), 0, buildable)
                .unwrap();
        builder
            .key_id(key_id)
            .unwrap()
            .cert_type(CertType::User)
            .unwrap()
            .valid_principal("user")
            .unwrap();
        let built = builder.sign(&self.key).unwrap();
        let mut blob = built.to_bytes().unwrap();

        if valid_before != buildable {
            // The builder caps timestamps; write the real end and re-sign,
            // matching what ssh-keygen emits for `-V forever`.
            let sig = built.signature();
            let signature_len = 4 + 4 + sig.algorithm().as_str().len() + 4 + sig.as_bytes().len();
            blob.truncate(blob.len() - signature_len);

            let at = Layout::scan(&blob).unwrap().valid_before;
            blob[at..at + 8].copy_from_slice(&valid_before.to_be_bytes());

            let sig = sign_with(&self.key, &blob);
            let mut encoded = Vec::new();
            put_string(&mut encoded, sig.algorithm().as_str().as_bytes());
            put_string(&mut encoded, sig.as_bytes());
            put_string(&mut blob, &encoded);
        }
        Certificate::from_bytes(blob).unwrap()
    }
}

fn sign_with<S: SigningKey>(key: &S, message: &[u8]) -> Signature {
    key.try_sign(message).unwrap()
}

fn put_string(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
}

/// A fresh user key and a certificate for it.
pub fn mint_certificate(key_id: &str, valid_before: u64) -> (Certificate, PrivateKey) {
    let user = generate_private_key(KeyType::Ed25519).unwrap();
    let cert = Authority::new().sign(user.public_key(), key_id, valid_before);
    (cert, user)
}
