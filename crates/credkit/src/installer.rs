use std::time::Duration;

use chrono::Utc;
use ssh_key::PrivateKey;

use crate::agent::{AddedIdentity, Agent};
use crate::certificate::{
    check_key_matches, expiry_comment, is_infinite, valid_before_time, Certificate,
};
use crate::error::Error;

/// Load a certificate and its private key into `agent`.
///
/// The agent ends up with exactly one live entry for the key identifier,
/// with a lifetime matching the certificate's remaining validity. The new
/// entry is added before older entries for the same identifier are removed,
/// so a failed add leaves the previous credential in place.
pub fn install_certificate(
    agent: &dyn Agent,
    cert: &Certificate,
    private_key: &PrivateKey,
) -> Result<(), Error> {
    if cert.key_id().is_empty() {
        return Err(Error::KeyRequired);
    }
    check_key_matches(cert, private_key)?;

    let lifetime = remaining_lifetime(cert)?;
    let comment = expiry_comment(cert);

    let superseded: Vec<Certificate> = agent
        .list()?
        .into_iter()
        .map(|l| l.certificate)
        .filter(|c| c.key_id() == cert.key_id() && c != cert)
        .collect();

    agent.add(AddedIdentity {
        private_key: private_key.clone(),
        certificate: cert.clone(),
        comment: comment.clone(),
        lifetime,
    })?;

    for old in &superseded {
        tracing::debug!(
            key_id = %cert.key_id(),
            serial = old.serial(),
            "Removing superseded agent entry"
        );
        agent.remove(old)?;
    }
    tracing::info!(key_id = %cert.key_id(), %comment, "Installed certificate in agent");
    Ok(())
}

/// Remove expired and superseded entries for `key_id`, keeping the one whose
/// validity runs longest. Returns the number of entries removed.
pub fn clean_stale(agent: &dyn Agent, key_id: &str) -> Result<usize, Error> {
    let now = Utc::now().timestamp().max(0) as u64;
    let mut candidates: Vec<Certificate> = agent
        .list()?
        .into_iter()
        .map(|l| l.certificate)
        .filter(|c| c.key_id() == key_id)
        .collect();

    // Latest validity end first; the survivor is the head if still valid.
    candidates.sort_by_key(|c| std::cmp::Reverse(c.valid_before()));
    let keep = candidates
        .first()
        .filter(|c| c.valid_before() > now)
        .cloned();

    let mut removed = 0;
    for cert in &candidates {
        if Some(cert) == keep.as_ref() {
            continue;
        }
        agent.remove(cert)?;
        removed += 1;
    }
    if removed > 0 {
        tracing::warn!(%key_id, removed, "Removed stale agent entries");
    }
    Ok(removed)
}

fn remaining_lifetime(cert: &Certificate) -> Result<Option<Duration>, Error> {
    if is_infinite(cert) {
        return Ok(None);
    }
    let Some(end) = valid_before_time(cert) else {
        return Ok(None);
    };
    let remaining = end - Utc::now();
    match remaining.to_std() {
        Ok(d) if !d.is_zero() => Ok(Some(d)),
        _ => Err(Error::CertificateExpired(end.to_rfc3339())),
    }
}
