//! Credential agent abstraction.
//!
//! The installer only needs list/add/remove; anything that can hold a
//! certificate with its private key (an ssh-agent connection, an OS keychain,
//! the in-memory [`Keyring`]) can sit behind [`Agent`].

use std::sync::Mutex;
use std::time::{Duration, Instant};

use ssh_key::PrivateKey;

use crate::certificate::Certificate;
use crate::error::Error;

/// An identity handed to the agent.
#[derive(Debug, Clone)]
pub struct AddedIdentity {
    pub private_key: PrivateKey,
    pub certificate: Certificate,
    pub comment: String,
    /// Drop the identity after this long. `None` keeps it until removed.
    pub lifetime: Option<Duration>,
}

/// The agent's view of one installed identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedIdentity {
    pub certificate: Certificate,
    pub comment: String,
}

pub trait Agent: Send + Sync {
    /// Live identities, in insertion order.
    fn list(&self) -> Result<Vec<ListedIdentity>, Error>;

    /// Add an identity. Adding a certificate the agent already holds
    /// replaces that entry.
    fn add(&self, identity: AddedIdentity) -> Result<(), Error>;

    /// Remove the identity holding `certificate`.
    fn remove(&self, certificate: &Certificate) -> Result<(), Error>;
}

struct KeyringEntry {
    identity: AddedIdentity,
    expires_at: Option<Instant>,
}

impl KeyringEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |t| t > now)
    }
}

/// In-process agent. Entries with a lifetime disappear once it elapses.
#[derive(Default)]
pub struct Keyring {
    entries: Mutex<Vec<KeyringEntry>>,
}

impl Keyring {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<KeyringEntry>>, Error> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| Error::Agent("keyring lock poisoned".to_string()))?;
        let now = Instant::now();
        entries.retain(|e| e.is_live(now));
        Ok(entries)
    }
}

impl Agent for Keyring {
    fn list(&self) -> Result<Vec<ListedIdentity>, Error> {
        Ok(self
            .lock()?
            .iter()
            .map(|e| ListedIdentity {
                certificate: e.identity.certificate.clone(),
                comment: e.identity.comment.clone(),
            })
            .collect())
    }

    fn add(&self, identity: AddedIdentity) -> Result<(), Error> {
        let expires_at = match identity.lifetime {
            Some(d) => Some(
                Instant::now()
                    .checked_add(d)
                    .ok_or_else(|| Error::Agent("identity lifetime out of range".to_string()))?,
            ),
            None => None,
        };
        let entry = KeyringEntry {
            identity,
            expires_at,
        };

        let mut entries = self.lock()?;
        match entries
            .iter_mut()
            .find(|e| e.identity.certificate == entry.identity.certificate)
        {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
        Ok(())
    }

    fn remove(&self, certificate: &Certificate) -> Result<(), Error> {
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|e| &e.identity.certificate != certificate);
        if entries.len() == before {
            return Err(Error::Agent(format!(
                "identity '{}' not found",
                certificate.key_id()
            )));
        }
        Ok(())
    }
}
