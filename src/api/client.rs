//! Authenticated HTTP client for the Web API
//!
//! Wraps reqwest::Client with token tagging, proactive refresh, and a single
//! replay after a 401.

use anyhow::Result;
use reqwest::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use super::pipeline::{authenticate, tag_request};
use crate::auth::TokenManager;
use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("401 Unauthorized for {url}. Session is no longer valid -- run 'music-extended login'.")]
    Unauthorized { url: String },
    #[error("HTTP {status} for {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },
    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to decode response from {url}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to build request")]
    Build(#[source] reqwest::Error),
    #[error("invalid API URL")]
    Url(#[from] url::ParseError),
}

/// Authenticated client for the resource API.
pub struct SpotifyClient {
    http: reqwest::Client,
    tokens: TokenManager,
    api_base: Url,
}

impl SpotifyClient {
    pub fn new(config: &Config, tokens: TokenManager) -> Result<Self> {
        let api_base = Url::parse(&config.api_base)?;
        Ok(Self::with_http(reqwest::Client::new(), tokens, api_base))
    }

    pub fn with_http(http: reqwest::Client, tokens: TokenManager, api_base: Url) -> Self {
        Self {
            http,
            tokens,
            api_base,
        }
    }

    /// GET `path` (relative to the API base) and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = self.api_base.join(path)?;
        let request = self
            .http
            .get(url.clone())
            .query(query)
            .build()
            .map_err(ApiError::Build)?;

        let resp = self.execute(request).await?;
        resp.json().await.map_err(|source| ApiError::Decode {
            url: url.to_string(),
            source,
        })
    }

    /// Send `request` through the auth pipeline.
    pub async fn execute(&self, mut request: Request) -> Result<Response, ApiError> {
        if self.tokens.is_expired_or_expiring_soon() && self.tokens.has_refresh_token() {
            tracing::debug!("Access token expiring, refreshing before request");
            self.tokens.refresh().await;
        }

        tag_request(
            &mut request,
            self.tokens.access_token().as_deref(),
            self.tokens.token_url(),
        );
        let replay_source = request.try_clone();
        let url = request.url().to_string();
        tracing::debug!("{} {}", request.method(), url);

        let resp = self.send(request, &url).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return check_response(resp, &url).await;
        }

        tracing::info!("401 from {}, attempting token refresh", url);
        let retry = match replay_source {
            Some(original) => authenticate(&original, &self.tokens).await,
            None => None,
        };
        match retry {
            Some(retry) => {
                let resp = self.send(retry, &url).await?;
                check_response(resp, &url).await
            }
            None => Err(ApiError::Unauthorized { url }),
        }
    }

    async fn send(&self, request: Request, url: &str) -> Result<Response, ApiError> {
        self.http
            .execute(request)
            .await
            .map_err(|source| ApiError::Transport {
                url: url.to_string(),
                source,
            })
    }
}

/// Check HTTP response status code and return a clear error on failure.
async fn check_response(resp: Response, url: &str) -> Result<Response, ApiError> {
    let status = resp.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(ApiError::Unauthorized {
            url: url.to_string(),
        });
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ApiError::Status {
            status: status.as_u16(),
            url: url.to_string(),
            body,
        });
    }
    Ok(resp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::endpoint::EndpointError;
    use crate::auth::manager::testing::FakeEndpoint;
    use crate::auth::tokens::memory::MemoryTokenStore;
    use crate::auth::tokens::{now_ms, TokenRecord};
    use crate::models::UserProfile;
    use std::sync::atomic::Ordering;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal HTTP/1.1 server: 200 with `body` for `Bearer fresh`, 401 otherwise.
    async fn serve(body: &'static str) -> (Url, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);

        tokio::spawn(async move {
            loop {
                let Ok((mut sock, _)) = listener.accept().await else {
                    return;
                };
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = sock.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                let head = String::from_utf8_lossy(&buf).to_lowercase();
                log.lock().unwrap().push(head.clone());

                let (status, payload) = if head.contains("authorization: bearer fresh") {
                    ("200 OK", body)
                } else {
                    ("401 Unauthorized", r#"{"error":{"status":401}}"#)
                };
                let resp = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    payload.len(),
                    payload
                );
                sock.write_all(resp.as_bytes()).await.unwrap();
            }
        });

        (Url::parse(&format!("http://{}/", addr)).unwrap(), seen)
    }

    fn valid_but_revoked() -> TokenRecord {
        TokenRecord::issued(
            "revoked".into(),
            Some("rt-1".into()),
            Some("Bearer".into()),
            3600,
            now_ms(),
        )
    }

    fn client(base: Url, endpoint: FakeEndpoint, record: TokenRecord) -> SpotifyClient {
        let tokens =
            TokenManager::new(Box::new(MemoryTokenStore::with(record)), Box::new(endpoint));
        let http = reqwest::Client::builder().no_proxy().build().unwrap();
        SpotifyClient::with_http(http, tokens, base)
    }

    #[tokio::test]
    async fn test_401_triggers_refresh_and_single_replay() {
        let (base, seen) = serve(r#"{"id":"u1","display_name":"Tester"}"#).await;
        let endpoint = FakeEndpoint::granting("fresh");
        let calls = Arc::clone(&endpoint.refresh_calls);
        let client = client(base, endpoint, valid_but_revoked());

        let me: UserProfile = client.get_json("v1/me", &[]).await.unwrap();
        assert_eq!(me.display_name.as_deref(), Some("Tester"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].contains("authorization: bearer revoked"));
        assert!(seen[1].contains("authorization: bearer fresh"));
    }

    #[tokio::test]
    async fn test_failed_refresh_surfaces_unauthorized() {
        let (base, seen) = serve("{}").await;
        let endpoint = FakeEndpoint::new(Box::new(|_| {
            Err(EndpointError::InvalidGrant("revoked".into()))
        }));
        let client = client(base, endpoint, valid_but_revoked());

        let err = client
            .get_json::<UserProfile>("v1/me", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized { .. }));
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert!(client.tokens.access_token().is_none());
    }

    #[tokio::test]
    async fn test_expiring_token_is_refreshed_before_sending() {
        let (base, seen) = serve(r#"{"id":"u1"}"#).await;
        let endpoint = FakeEndpoint::granting("fresh");
        let mut record = valid_but_revoked();
        record.absolute_expiry_epoch_ms = now_ms();
        let client = client(base, endpoint, record);

        let me: UserProfile = client.get_json("v1/me", &[]).await.unwrap();
        assert_eq!(me.id, "u1");
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_query_parameters_are_sent() {
        let (base, seen) = serve(r#"{"id":"u1"}"#).await;
        let mut record = valid_but_revoked();
        record.access_token = Some("fresh".into());
        let client = client(base, FakeEndpoint::granting("unused"), record);

        let _: UserProfile = client
            .get_json("v1/me/top/tracks", &[("time_range", "short_term".to_string())])
            .await
            .unwrap();
        let seen = seen.lock().unwrap();
        assert!(seen[0].starts_with("get /v1/me/top/tracks?time_range=short_term "));
    }
}
