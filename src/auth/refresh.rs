// Token exchange against the portal's role-specific refresh endpoints

use std::time::Duration;

use reqwest::Client;

use super::types::{Credential, SessionEnvelope};
use crate::error::RefreshError;

/// User-Agent sent on session endpoints, stable per machine
pub(crate) fn client_user_agent() -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    let mut hasher = DefaultHasher::new();
    host.hash(&mut hasher);
    format!(
        "portalctl/{}-{:x}",
        env!("CARGO_PKG_VERSION"),
        hasher.finish()
    )
}

/// Exchange the current (possibly expired) token for a fresh one.
///
/// The refresh endpoint is picked by the stored role and the call is
/// bounded by `timeout`: a hung refresh would otherwise strand every
/// queued caller. Returns the merged credential; persisting it is the
/// caller's job.
pub async fn exchange_token(
    http: &Client,
    origin: &str,
    current: &Credential,
    timeout: Duration,
) -> Result<Credential, RefreshError> {
    let url = format!("{}{}", origin, current.role.refresh_path());
    tracing::debug!(role = ?current.role, url = %url, "Exchanging session token");

    let send = http
        .post(&url)
        .bearer_auth(&current.token)
        .header(reqwest::header::USER_AGENT, client_user_agent())
        .send();

    let response = match tokio::time::timeout(timeout, send).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => return Err(RefreshError::Unreachable(e.to_string())),
        Err(_) => {
            return Err(RefreshError::Unreachable(format!(
                "refresh timed out after {}s",
                timeout.as_secs()
            )))
        }
    };

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RefreshError::Rejected(format!("{} - {}", status, body)));
    }

    let envelope: SessionEnvelope = response
        .json()
        .await
        .map_err(|e| RefreshError::Rejected(format!("malformed refresh response: {e}")))?;

    if !envelope.status {
        return Err(RefreshError::Rejected(
            "portal reported status=false".to_string(),
        ));
    }

    let token = match envelope.token {
        Some(token) if !token.trim().is_empty() => token,
        _ => {
            return Err(RefreshError::Rejected(
                "refresh response carried no token".to_string(),
            ))
        }
    };

    Ok(current.merged_with(envelope.user.as_ref(), token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_is_stable_and_versioned() {
        let ua = client_user_agent();
        assert!(ua.starts_with(&format!("portalctl/{}-", env!("CARGO_PKG_VERSION"))));
        // Fingerprint only varies across machines
        assert_eq!(ua, client_user_agent());
    }
}
