//! Session acquisition against the identity service.

use serde_json::json;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};

/// Session cookie handed out by the identity service, attached to every
/// outbound call.
#[derive(Debug, Clone)]
pub struct SessionCookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
}

/// Exchanges the configured credentials for a session cookie.
pub async fn login(config: &SyncConfig) -> SyncResult<SessionCookie> {
    let client = reqwest::Client::new();
    let url = format!("{}/authenticate", config.ims_url.trim_end_matches('/'));
    let body = json!({
        "login": config.ims_username,
        "password": config.ims_password,
    });

    let response = client
        .post(&url)
        .json(&body)
        .send()
        .await?
        .error_for_status()?;

    let set_cookie = response
        .headers()
        .get(reqwest::header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            SyncError::UnexpectedResponse("authentication response carried no Set-Cookie".into())
        })?;

    parse_session_cookie(set_cookie)
}

fn parse_session_cookie(set_cookie: &str) -> SyncResult<SessionCookie> {
    let pair = set_cookie.split(';').next().unwrap_or(set_cookie);
    let (name, value) = pair.split_once('=').ok_or_else(|| {
        SyncError::UnexpectedResponse(format!("malformed session cookie: {}", set_cookie))
    })?;
    Ok(SessionCookie {
        name: name.trim().to_string(),
        value: value.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_session_cookie_strips_attributes() {
        let cookie =
            parse_session_cookie("ims-session=abc123; Path=/; HttpOnly; Secure").unwrap();
        assert_eq!(cookie.name, "ims-session");
        assert_eq!(cookie.value, "abc123");
    }

    #[test]
    fn test_parse_session_cookie_rejects_garbage() {
        assert!(parse_session_cookie("no cookie here").is_err());
    }
}
