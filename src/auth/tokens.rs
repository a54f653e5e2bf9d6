//! Token record and storage abstraction

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Persisted token state.
///
/// `absolute_expiry_epoch_ms` is the only field consulted for expiry;
/// `expires_in_seconds` is kept for reference and is relative to issuance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    #[serde(rename = "expires_in", default)]
    pub expires_in_seconds: u64,
    #[serde(default)]
    pub absolute_expiry_epoch_ms: u64,
}

impl TokenRecord {
    /// Build a record for a token issued at `now_ms`.
    pub fn issued(
        access_token: String,
        refresh_token: Option<String>,
        token_type: Option<String>,
        expires_in_seconds: u64,
        now_ms: u64,
    ) -> Self {
        Self {
            access_token: Some(access_token),
            refresh_token,
            token_type,
            expires_in_seconds,
            absolute_expiry_epoch_ms: now_ms.saturating_add(expires_in_seconds.saturating_mul(1000)),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    /// True if there is no access token or it expires within `buffer` of `now_ms`.
    pub fn expires_within(&self, buffer: Duration, now_ms: u64) -> bool {
        if !self.is_authenticated() {
            return true;
        }
        self.absolute_expiry_epoch_ms <= now_ms.saturating_add(buffer.as_millis() as u64)
    }
}

/// Token store trait for different storage backends
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<Option<TokenRecord>>;
    fn save(&self, record: &TokenRecord) -> Result<()>;
    fn clear(&self) -> Result<()>;
}


#[cfg(test)]
mod tests {
    use super::*;

    const BUFFER: Duration = Duration::from_secs(60);

    #[test]
    fn test_issued_computes_absolute_expiry() {
        let t = 1_700_000_000_000;
        let rec = TokenRecord::issued("at".into(), None, Some("Bearer".into()), 3600, t);
        assert_eq!(rec.absolute_expiry_epoch_ms, t + 3_600_000);
        assert_eq!(rec.expires_in_seconds, 3600);
    }

    #[test]
    fn test_expired_in_past() {
        let now = 1_700_000_000_000;
        let rec = TokenRecord {
            access_token: Some("at".into()),
            absolute_expiry_epoch_ms: now - 1,
            ..Default::default()
        };
        assert!(rec.expires_within(BUFFER, now));
    }

    #[test]
    fn test_inside_buffer_counts_as_expiring() {
        let now = 1_700_000_000_000;
        let rec = TokenRecord {
            access_token: Some("at".into()),
            absolute_expiry_epoch_ms: now + 30_000,
            ..Default::default()
        };
        assert!(rec.expires_within(BUFFER, now));
    }

    #[test]
    fn test_beyond_buffer_is_valid() {
        let now = 1_700_000_000_000;
        let rec = TokenRecord {
            access_token: Some("at".into()),
            absolute_expiry_epoch_ms: now + 61_000,
            ..Default::default()
        };
        assert!(!rec.expires_within(BUFFER, now));
    }

    #[test]
    fn test_missing_access_token_is_unauthenticated() {
        let rec = TokenRecord {
            access_token: None,
            refresh_token: Some("rt".into()),
            absolute_expiry_epoch_ms: u64::MAX,
            ..Default::default()
        };
        assert!(!rec.is_authenticated());
        assert!(rec.expires_within(BUFFER, 0));
    }

    #[test]
    fn test_serialized_keys() {
        let rec = TokenRecord::issued("at".into(), Some("rt".into()), Some("Bearer".into()), 10, 0);
        let v = serde_json::to_value(&rec).unwrap();
        for key in [
            "access_token",
            "refresh_token",
            "token_type",
            "expires_in",
            "absolute_expiry_epoch_ms",
        ] {
            assert!(v.get(key).is_some(), "missing {}", key);
        }
    }
}
