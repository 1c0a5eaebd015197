//! Request authentication for the per-user upload routes.
//!
//! The caller sends the raw JSON grant in `Authorization` and its
//! HMAC-SHA256 (base64) in `X-Authorization-HMAC`. The MAC is verified in
//! constant time before the grant is even parsed; only then are the grant
//! window and user binding checked.

use axum::http::HeaderMap;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const AUTH_HEADER: &str = "Authorization";
pub const HMAC_HEADER: &str = "X-Authorization-HMAC";

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("No authentication scheme was configured.")]
    NoAuthentication,

    #[error("Empty or missing authentication header.")]
    EmptyAuth,

    #[error("No grant time specified in the authentication grant.")]
    NoGrantTime,

    #[error("The authentication grant has expired.")]
    ExpiredGrant,

    #[error("The provided message authentication code is invalid for the given message.")]
    MacMismatch,
}

/// The grant a caller presents: who they are and for how long the grant
/// was issued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: String,
    #[serde(default)]
    pub grant_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub grant_duration_sec: i64,
}

pub trait Authenticator: Send + Sync {
    fn authenticate(&self, headers: &HeaderMap) -> Result<AuthenticatedUser, AuthError>;
}

/// Rejects everything; installed when no HMAC key is configured.
pub struct PassthroughAuthenticator;

impl Authenticator for PassthroughAuthenticator {
    fn authenticate(&self, _headers: &HeaderMap) -> Result<AuthenticatedUser, AuthError> {
        Err(AuthError::NoAuthentication)
    }
}

pub struct HmacAuthenticator {
    key: Vec<u8>,
}

impl HmacAuthenticator {
    pub fn new(key: &[u8]) -> HmacAuthenticator {
        HmacAuthenticator { key: key.to_vec() }
    }

    /// Verification with an explicit clock, so expiry is testable.
    pub fn authenticate_at(
        &self,
        headers: &HeaderMap,
        now: DateTime<Utc>,
    ) -> Result<AuthenticatedUser, AuthError> {
        let grant_bytes = headers
            .get(AUTH_HEADER)
            .map(|v| v.as_bytes())
            .unwrap_or_default();
        let provided_b64 = headers
            .get(HMAC_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if grant_bytes.is_empty() || provided_b64.is_empty() {
            return Err(AuthError::EmptyAuth);
        }

        let provided = base64::engine::general_purpose::STANDARD
            .decode(provided_b64)
            .unwrap_or_default();

        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key size");
        mac.update(grant_bytes);
        if mac.verify_slice(&provided).is_err() {
            return Err(AuthError::MacMismatch);
        }

        // A grant that fails to parse, or parses to nobody, is treated the
        // same as a bad MAC.
        let user: AuthenticatedUser =
            serde_json::from_slice(grant_bytes).map_err(|_| AuthError::MacMismatch)?;
        if user.user_id.is_empty() {
            return Err(AuthError::MacMismatch);
        }

        match user.grant_time {
            None => Err(AuthError::NoGrantTime),
            Some(t) if t.timestamp() <= 0 => Err(AuthError::NoGrantTime),
            Some(t) => {
                if t + Duration::seconds(user.grant_duration_sec) < now {
                    Err(AuthError::ExpiredGrant)
                } else {
                    Ok(user)
                }
            }
        }
    }
}

impl Authenticator for HmacAuthenticator {
    fn authenticate(&self, headers: &HeaderMap) -> Result<AuthenticatedUser, AuthError> {
        self.authenticate_at(headers, Utc::now())
    }
}

/// Sign a grant the way callers are expected to. Shared with the tests.
pub fn sign_grant(key: &[u8], grant_json: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key size");
    mac.update(grant_json);
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const KEY: &[u8] = b"foobar";

    fn headers_for(grant_json: &str, mac_b64: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTH_HEADER, HeaderValue::from_str(grant_json).unwrap());
        headers.insert(HMAC_HEADER, HeaderValue::from_str(mac_b64).unwrap());
        headers
    }

    fn grant(user_id: &str, grant_time: Option<DateTime<Utc>>, duration: i64) -> String {
        serde_json::to_string(&AuthenticatedUser {
            user_id: user_id.to_string(),
            grant_time,
            grant_duration_sec: duration,
        })
        .unwrap()
    }

    #[test]
    fn accepts_a_valid_grant() {
        let auth = HmacAuthenticator::new(KEY);
        let now = Utc::now();
        let grant = grant("123", Some(now), 31_536_000);
        let headers = headers_for(&grant, &sign_grant(KEY, grant.as_bytes()));

        let user = auth.authenticate_at(&headers, now).unwrap();
        assert_eq!(user.user_id, "123");
    }

    #[test]
    fn missing_headers_are_empty_auth() {
        let auth = HmacAuthenticator::new(KEY);
        assert_eq!(
            auth.authenticate_at(&HeaderMap::new(), Utc::now()),
            Err(AuthError::EmptyAuth)
        );
    }

    #[test]
    fn tampered_grant_is_a_mac_mismatch() {
        let auth = HmacAuthenticator::new(KEY);
        let now = Utc::now();
        let signed = grant("123", Some(now), 3600);
        let tampered = grant("124", Some(now), 3600);
        let headers = headers_for(&tampered, &sign_grant(KEY, signed.as_bytes()));

        assert_eq!(
            auth.authenticate_at(&headers, now),
            Err(AuthError::MacMismatch)
        );
    }

    #[test]
    fn wrong_key_is_a_mac_mismatch() {
        let auth = HmacAuthenticator::new(KEY);
        let now = Utc::now();
        let grant = grant("123", Some(now), 3600);
        let headers = headers_for(&grant, &sign_grant(b"not-the-key", grant.as_bytes()));

        assert_eq!(
            auth.authenticate_at(&headers, now),
            Err(AuthError::MacMismatch)
        );
    }

    #[test]
    fn missing_grant_time_is_rejected() {
        let auth = HmacAuthenticator::new(KEY);
        let grant = grant("123", None, 3600);
        let headers = headers_for(&grant, &sign_grant(KEY, grant.as_bytes()));

        assert_eq!(
            auth.authenticate_at(&headers, Utc::now()),
            Err(AuthError::NoGrantTime)
        );
    }

    #[test]
    fn epoch_grant_time_is_rejected() {
        let auth = HmacAuthenticator::new(KEY);
        let grant = grant("123", Some(DateTime::<Utc>::UNIX_EPOCH), 3600);
        let headers = headers_for(&grant, &sign_grant(KEY, grant.as_bytes()));

        assert_eq!(
            auth.authenticate_at(&headers, Utc::now()),
            Err(AuthError::NoGrantTime)
        );
    }

    #[test]
    fn expired_grant_is_rejected() {
        let auth = HmacAuthenticator::new(KEY);
        let now = Utc::now();
        let grant = grant("123", Some(now - Duration::seconds(7200)), 3600);
        let headers = headers_for(&grant, &sign_grant(KEY, grant.as_bytes()));

        assert_eq!(
            auth.authenticate_at(&headers, now),
            Err(AuthError::ExpiredGrant)
        );
    }

    #[test]
    fn passthrough_rejects_everyone() {
        assert_eq!(
            PassthroughAuthenticator.authenticate(&HeaderMap::new()),
            Err(AuthError::NoAuthentication)
        );
    }
}
