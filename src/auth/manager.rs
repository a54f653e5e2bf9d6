//! Token state manager
//!
//! Owns the in-memory token state and is the only writer of the
//! [`TokenStore`]. Refreshes are single-flight: callers that arrive while a
//! refresh is running wait for it and share its result.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use super::endpoint::{TokenEndpoint, TokenGrant};
use super::tokens::{now_ms, TokenRecord, TokenStore};

/// Refresh this long before the recorded expiry.
pub const TOKEN_REFRESH_BUFFER: Duration = Duration::from_secs(60);

struct Inner {
    store: Box<dyn TokenStore>,
    endpoint: Box<dyn TokenEndpoint>,
    state: RwLock<Option<TokenRecord>>,
    /// Bumped after every completed refresh attempt.
    generation: AtomicU64,
    /// Result of the last completed refresh. Held for the whole round-trip.
    refresh_slot: tokio::sync::Mutex<Option<String>>,
}

/// Cloneable handle to the shared token state.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

impl TokenManager {
    /// Build a manager and load any persisted record.
    pub fn new(store: Box<dyn TokenStore>, endpoint: Box<dyn TokenEndpoint>) -> Self {
        let state = match store.load() {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Ignoring unreadable token store: {:#}", e);
                None
            }
        };

        Self {
            inner: Arc::new(Inner {
                store,
                endpoint,
                state: RwLock::new(state),
                generation: AtomicU64::new(0),
                refresh_slot: tokio::sync::Mutex::new(None),
            }),
        }
    }

    /// Last known access token. Does not check expiry.
    pub fn access_token(&self) -> Option<String> {
        self.inner.read_state().and_then(|r| r.access_token)
    }

    pub fn has_refresh_token(&self) -> bool {
        self.inner
            .read_state()
            .map_or(false, |r| r.refresh_token.is_some())
    }

    /// Copy of the current record, if any.
    pub fn snapshot(&self) -> Option<TokenRecord> {
        self.inner.read_state()
    }

    pub fn is_expired_or_expiring_soon(&self) -> bool {
        self.inner
            .read_state()
            .map_or(true, |r| r.expires_within(TOKEN_REFRESH_BUFFER, now_ms()))
    }

    pub fn token_url(&self) -> &url::Url {
        self.inner.endpoint.token_url()
    }

    /// Exchange the stored refresh token for a new access token.
    ///
    /// Concurrent calls collapse into one round-trip and all observe the same
    /// outcome. The round-trip runs on its own task so it completes even if
    /// every caller stops waiting.
    pub async fn refresh(&self) -> Option<String> {
        let inner = Arc::clone(&self.inner);
        let observed = inner.generation.load(Ordering::Acquire);

        let task = tokio::spawn(async move {
            let mut slot = inner.refresh_slot.lock().await;
            if inner.generation.load(Ordering::Acquire) != observed {
                tracing::debug!("Joining result of concurrent refresh");
                return slot.clone();
            }

            let outcome = inner.refresh_now().await;
            *slot = outcome.clone();
            inner.generation.fetch_add(1, Ordering::Release);
            outcome
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Token refresh task failed: {}", e);
                None
            }
        }
    }

    /// One-time exchange of an authorization code for the initial token pair.
    ///
    /// Leaves stored state untouched on failure.
    pub async fn exchange_authorization_code(
        &self,
        code: &str,
        pkce_verifier: Option<&str>,
    ) -> Option<TokenRecord> {
        let grant = match self.inner.endpoint.exchange_code(code, pkce_verifier).await {
            Ok(grant) => grant,
            Err(e) => {
                tracing::error!("Authorization code exchange failed: {}", e);
                return None;
            }
        };

        if let Some(scope) = &grant.scope {
            tracing::debug!("Granted scopes: {}", scope);
        }
        let record = record_from_grant(grant, None);
        if let Err(e) = self.inner.commit(&record) {
            tracing::error!("Failed to persist tokens: {:#}", e);
            return None;
        }
        tracing::info!("Authorization code exchanged");
        Some(record)
    }

    /// Erase persisted and in-memory token state.
    pub fn clear_all(&self) {
        self.inner.clear_all();
    }
}

impl Inner {
    fn read_state(&self) -> Option<TokenRecord> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Persist first, then publish to memory.
    fn commit(&self, record: &TokenRecord) -> anyhow::Result<()> {
        self.store.save(record)?;
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = Some(record.clone());
        Ok(())
    }

    fn clear_all(&self) {
        if let Err(e) = self.store.clear() {
            tracing::error!("Failed to clear token store: {:#}", e);
        }
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = None;
        tracing::info!("All stored tokens cleared");
    }

    async fn refresh_now(&self) -> Option<String> {
        let refresh_token = match self.read_state().and_then(|r| r.refresh_token) {
            Some(rt) => rt,
            None => {
                tracing::warn!("No refresh token available; clearing credentials");
                self.clear_all();
                return None;
            }
        };

        tracing::info!("Refreshing access token...");
        match self.endpoint.refresh(&refresh_token).await {
            Ok(grant) => {
                let record = record_from_grant(grant, Some(refresh_token));
                if let Err(e) = self.commit(&record) {
                    tracing::error!("Failed to persist refreshed tokens: {:#}", e);
                    return None;
                }
                tracing::info!("Access token refreshed");
                record.access_token
            }
            Err(e) if e.is_invalid_credential() => {
                tracing::error!("{}; re-authorization required", e);
                self.clear_all();
                None
            }
            Err(e) => {
                tracing::warn!("Token refresh failed, keeping stored credentials: {}", e);
                None
            }
        }
    }
}

/// Keep `previous_refresh` when the server does not rotate the refresh token.
fn record_from_grant(grant: TokenGrant, previous_refresh: Option<String>) -> TokenRecord {
    TokenRecord::issued(
        grant.access_token,
        grant.refresh_token.or(previous_refresh),
        Some(grant.token_type),
        grant.expires_in.unwrap_or(0),
        now_ms(),
    )
}
