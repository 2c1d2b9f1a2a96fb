use chrono::{Duration, Utc};
use ssh_key::PublicKey;

use crate::error::Error;
use crate::types::request::SigningRequest;

/// Build a signing request from an authorized_keys-format public key.
///
/// The key text is carried verbatim. `validity` is a duration such as `24h`
/// or `1h30m`; when absent the authority applies its own default.
pub fn build_sign_request(
    public_key: &str,
    principal: Option<&str>,
    validity: Option<&str>,
) -> Result<SigningRequest, Error> {
    if public_key.trim().is_empty() {
        return Err(Error::InvalidInput("public key is empty".to_string()));
    }
    PublicKey::from_openssh(public_key.trim())
        .map_err(|e| Error::InvalidInput(format!("malformed public key: {}", e)))?;

    let valid_until = match validity {
        Some(v) => Some(
            Utc::now()
                .checked_add_signed(parse_duration(v)?)
                .ok_or_else(|| {
                    Error::InvalidInput(format!("validity '{}' ends past the supported range", v))
                })?,
        ),
        None => None,
    };

    Ok(SigningRequest {
        key: public_key.to_string(),
        principal: principal.filter(|p| !p.is_empty()).map(str::to_string),
        validity: validity.map(str::to_string),
        valid_until,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Build a signing request for an already-parsed public key.
pub fn build_sign_request_for_key(
    public_key: &PublicKey,
    principal: Option<&str>,
    validity: Option<&str>,
) -> Result<SigningRequest, Error> {
    let text = public_key
        .to_openssh()
        .map_err(|e| Error::InvalidInput(format!("cannot encode public key: {}", e)))?;
    build_sign_request(&text, principal, validity)
}

/// Parse a positive duration made of `<n><unit>` groups.
///
/// Units are `s`, `m`, `h`, `d`; groups may be chained (`1h30m`). A bare
/// number is taken as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, Error> {
    let s = s.trim();
    let invalid = || {
        Error::InvalidInput(format!(
            "invalid duration '{}', expected e.g. 24h, 30m, 1h30m",
            s
        ))
    };

    if s.is_empty() {
        return Err(invalid());
    }

    let total = if let Ok(secs) = s.parse::<i64>() {
        secs
    } else {
        let mut total: i64 = 0;
        let mut digits = String::new();
        for c in s.chars() {
            if c.is_ascii_digit() {
                digits.push(c);
                continue;
            }
            let unit = match c {
                's' => 1,
                'm' => 60,
                'h' => 3600,
                'd' => 86400,
                _ => return Err(invalid()),
            };
            let n: i64 = digits.parse().map_err(|_| invalid())?;
            digits.clear();
            total = n
                .checked_mul(unit)
                .and_then(|v| total.checked_add(v))
                .ok_or_else(invalid)?;
        }
        if !digits.is_empty() {
            return Err(invalid());
        }
        total
    };

    if total <= 0 {
        return Err(Error::InvalidInput(format!(
            "duration '{}' must be positive",
            s
        )));
    }
    Duration::try_seconds(total).ok_or_else(invalid)
}
