use std::fmt;

use serde::{Deserialize, Serialize};

/// The access/refresh token pair plus the lifetime the server granted.
///
/// A credential is all-or-nothing: every field is required when decoding, so
/// a record missing any of them never becomes a `Credential`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(rename = "expiresIn")]
    pub expires_in_seconds: u64,
}

impl Credential {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in_seconds: u64,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_in_seconds,
        }
    }

    /// Empty tokens are as good as absent
    pub fn is_complete(&self) -> bool {
        !self.access_token.is_empty() && !self.refresh_token.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_in_seconds", &self.expires_in_seconds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let json = r#"{"accessToken": "a.b.c", "refreshToken": "rt-1", "expiresIn": 900}"#;
        let credential: Credential = serde_json::from_str(json).expect("Failed to parse credential");
        assert_eq!(credential.refresh_token, "rt-1");
        assert_eq!(credential.expires_in_seconds, 900);
    }

    #[test]
    fn test_partial_record_is_rejected() {
        let json = r#"{"accessToken": "a.b.c", "expiresIn": 900}"#;
        assert!(serde_json::from_str::<Credential>(json).is_err());
        assert!(!Credential::new("a.b.c", "", 900).is_complete());
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let rendered = format!("{:?}", Credential::new("access-secret", "refresh-secret", 60));
        assert!(!rendered.contains("secret"));
    }
}
