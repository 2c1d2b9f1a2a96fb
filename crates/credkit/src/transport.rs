use crate::error::Error;
use crate::types::request::{ResponseEnvelope, SignResponse, SigningRequest};

/// Send a signing request to `<authority_url>/sign`.
///
/// Returns the certificate text exactly as the authority sent it. Nothing is
/// retried; a rejected request surfaces the authority's message verbatim.
pub async fn send(
    request: &SigningRequest,
    token: &str,
    authority_url: &str,
    skip_tls_verify: bool,
) -> Result<String, Error> {
    let url = sign_endpoint(authority_url)?;
    if skip_tls_verify {
        tracing::warn!(%url, "TLS certificate verification disabled");
    }

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .danger_accept_invalid_certs(skip_tls_verify)
        .build()?;

    tracing::debug!(%url, principal = ?request.principal(), "Sending signing request");
    let resp = client
        .post(url.clone())
        .bearer_auth(token)
        .json(request)
        .send()
        .await
        .map_err(|e| Error::Transport(format!("Failed to reach {}: {}", url, e)))?;

    let status = resp.status();
    let body = resp
        .bytes()
        .await
        .map_err(|e| Error::Transport(format!("Failed to read response from {}: {}", url, e)))?;

    let envelope: ResponseEnvelope = match serde_json::from_slice(&body) {
        Ok(env) => env,
        Err(_) if !status.is_success() => {
            return Err(Error::Transport(format!(
                "HTTP {} from {}",
                status, url
            )));
        }
        Err(e) => {
            return Err(Error::Protocol(format!(
                "Undecodable response from {}: {}",
                url, e
            )));
        }
    };

    match SignResponse::from(envelope) {
        SignResponse::Ok(cert) if status.is_success() => {
            tracing::debug!(%url, "Authority returned a certificate");
            Ok(cert)
        }
        SignResponse::Ok(_) => Err(Error::Transport(format!("HTTP {} from {}", status, url))),
        SignResponse::Error(message) => {
            tracing::debug!(%url, %status, "Authority rejected signing request");
            Err(Error::AuthorityRejected(message))
        }
    }
}

fn sign_endpoint(authority_url: &str) -> Result<reqwest::Url, Error> {
    let mut url = reqwest::Url::parse(authority_url)
        .map_err(|e| Error::InvalidInput(format!("Invalid authority URL '{}': {}", authority_url, e)))?;
    url.path_segments_mut()
        .map_err(|_| Error::InvalidInput(format!("Authority URL '{}' cannot have a path", authority_url)))?
        .pop_if_empty()
        .push("sign");
    Ok(url)
}
