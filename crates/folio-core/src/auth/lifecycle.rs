//! Access token decoding and lifecycle classification.
//!
//! Tokens are JWTs; only the payload segment is read. Signature checks are the
//! server's job. Anything that cannot be read, or that carries no `exp`, is
//! classified as [`LifecycleState::Expired`].

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::DecodeError;
use super::Credential;

/// How long before `exp` a token counts as expiring soon (5 minutes).
/// The authorizer, the expiry monitor and any UI banner all read this value.
pub const EXPIRY_THRESHOLD_MS: i64 = 300_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub enum LifecycleState {
    Absent,
    Valid,
    ExpiringSoon,
    Expired,
}

impl LifecycleState {
    /// A token in this state may still be presented to the server
    pub fn is_usable(&self) -> bool {
        matches!(self, LifecycleState::Valid | LifecycleState::ExpiringSoon)
    }
}

/// Payload claims of an access token.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub exp: Option<serde_json::Number>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Claims {
    /// `exp` in whole seconds since the epoch
    pub fn expiry(&self) -> Option<i64> {
        let exp = self.exp.as_ref()?;
        exp.as_i64().or_else(|| exp.as_f64().map(|secs| secs as i64))
    }
}

#[derive(Debug, Clone)]
pub struct DecodedToken {
    pub exp: i64,
    pub claims: Claims,
}

impl DecodedToken {
    /// Milliseconds until `exp`; zero or negative once expired
    pub fn remaining_ms(&self, now: DateTime<Utc>) -> i64 {
        self.exp.saturating_mul(1000).saturating_sub(now.timestamp_millis())
    }
}

pub fn decode(access_token: &str) -> Result<DecodedToken, DecodeError> {
    let mut segments = access_token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(_header), Some(payload), Some(_signature), None) if !payload.is_empty() => payload,
        _ => return Err(DecodeError::Malformed),
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|_| DecodeError::Encoding)?;
    let claims: Claims =
        serde_json::from_slice(&bytes).map_err(|e| DecodeError::Payload(e.to_string()))?;
    let exp = claims.expiry().ok_or(DecodeError::MissingExpiry)?;

    Ok(DecodedToken { exp, claims })
}

fn state_for_remaining(remaining_ms: i64) -> LifecycleState {
    if remaining_ms <= 0 {
        LifecycleState::Expired
    } else if remaining_ms <= EXPIRY_THRESHOLD_MS {
        LifecycleState::ExpiringSoon
    } else {
        LifecycleState::Valid
    }
}

pub fn classify(credential: &Credential, now: DateTime<Utc>) -> LifecycleState {
    match decode(&credential.access_token) {
        Ok(token) => state_for_remaining(token.remaining_ms(now)),
        Err(e) => {
            debug!(error = %e, "Access token unreadable, treating as expired");
            LifecycleState::Expired
        }
    }
}

/// Classify whatever the store returned
pub fn classify_stored(credential: Option<&Credential>, now: DateTime<Utc>) -> LifecycleState {
    match credential {
        Some(credential) => classify(credential, now),
        None => LifecycleState::Absent,
    }
}

/// Time left before the access token expires, if it can be read
pub fn time_to_expiry(credential: &Credential, now: DateTime<Utc>) -> Option<Duration> {
    decode(&credential.access_token)
        .ok()
        .map(|token| Duration::milliseconds(token.remaining_ms(now)))
}

/// Get minutes remaining until expiry (for display)
pub fn minutes_until_expiry(credential: &Credential, now: DateTime<Utc>) -> i64 {
    time_to_expiry(credential, now)
        .map(|d| d.num_minutes().max(0))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_support::{credential_expiring_at, token_with_claims};

    fn at_ms(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).expect("timestamp in range")
    }

    const EXP: i64 = 1_900_000_000;

    #[test]
    fn test_threshold_boundary() {
        let credential = credential_expiring_at(EXP, "rt-1");

        assert_eq!(classify(&credential, at_ms(EXP * 1000 - 299_999)), LifecycleState::ExpiringSoon);
        assert_eq!(classify(&credential, at_ms(EXP * 1000 - 300_000)), LifecycleState::ExpiringSoon);
        assert_eq!(classify(&credential, at_ms(EXP * 1000 - 300_001)), LifecycleState::Valid);
        assert_eq!(classify(&credential, at_ms(EXP * 1000 - 1)), LifecycleState::ExpiringSoon);
        assert_eq!(classify(&credential, at_ms(EXP * 1000)), LifecycleState::Expired);
        assert_eq!(classify(&credential, at_ms(EXP * 1000 + 5_000)), LifecycleState::Expired);
    }

    #[test]
    fn test_malformed_tokens_fail_closed() {
        let now = at_ms(0);
        let bad_payload = format!("{}.{}.sig", URL_SAFE_NO_PAD.encode("{}"), URL_SAFE_NO_PAD.encode("not json"));
        for token in [
            "",
            "opaque-token",
            "only.two",
            "a.b.c.d",
            "header..sig",
            "header.!!!notbase64!!!.sig",
            bad_payload.as_str(),
        ] {
            let credential = Credential::new(token, "rt-1", 900);
            assert_eq!(classify(&credential, now), LifecycleState::Expired, "token {token:?}");
        }
    }

    #[test]
    fn test_missing_exp_fails_closed() {
        let token = token_with_claims(serde_json::json!({"sub": "u-1", "permissions": ["view_portfolio"]}));
        assert!(matches!(decode(&token), Err(DecodeError::MissingExpiry)));

        let credential = Credential::new(token, "rt-1", 900);
        assert_eq!(classify(&credential, at_ms(0)), LifecycleState::Expired);
    }

    #[test]
    fn test_non_numeric_exp_fails_closed() {
        let token = token_with_claims(serde_json::json!({"exp": "tomorrow"}));
        let credential = Credential::new(token, "rt-1", 900);
        assert_eq!(classify(&credential, at_ms(0)), LifecycleState::Expired);
    }

    #[test]
    fn test_decode_reads_claims() {
        let token = token_with_claims(serde_json::json!({
            "exp": EXP,
            "sub": "investor-7",
            "role": "analyst",
            "permissions": ["view_reports"],
            "tenant": "north",
        }));
        let decoded = decode(&token).expect("Failed to decode token");
        assert_eq!(decoded.exp, EXP);
        assert_eq!(decoded.claims.sub.as_deref(), Some("investor-7"));
        assert_eq!(decoded.claims.role.as_deref(), Some("analyst"));
        assert_eq!(decoded.claims.extra.get("tenant"), Some(&serde_json::json!("north")));
    }

    #[test]
    fn test_padded_payload_is_accepted() {
        let token = format!("h.{}==.s", URL_SAFE_NO_PAD.encode(format!("{{\"exp\":{}}}", EXP)));
        assert_eq!(decode(&token).expect("Failed to decode padded token").exp, EXP);
    }

    #[test]
    fn test_absent_and_minutes() {
        assert_eq!(classify_stored(None, at_ms(0)), LifecycleState::Absent);

        let credential = credential_expiring_at(EXP, "rt-1");
        assert_eq!(minutes_until_expiry(&credential, at_ms(EXP * 1000 - 600_000)), 10);
        assert_eq!(minutes_until_expiry(&credential, at_ms(EXP * 1000 + 600_000)), 0);
        assert!(LifecycleState::ExpiringSoon.is_usable());
        assert!(!LifecycleState::Expired.is_usable());
    }
}
