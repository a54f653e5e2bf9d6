//! Request tagging and the 401 retry decision
//!
//! Both are plain functions over `reqwest::Request` so the client can compose
//! them around `reqwest::Client::execute`.

use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::Request;
use url::Url;

use crate::auth::TokenManager;

/// True if `url` points at the token-issuance endpoint.
pub fn targets_token_endpoint(url: &Url, token_url: &Url) -> bool {
    url.scheme() == token_url.scheme()
        && url.host_str() == token_url.host_str()
        && url.port_or_known_default() == token_url.port_or_known_default()
        && url.path().trim_end_matches('/') == token_url.path().trim_end_matches('/')
}

fn bearer(token: &str) -> Option<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token)).ok()?;
    value.set_sensitive(true);
    Some(value)
}

/// Attach the cached bearer token unless the request already carries
/// credentials or targets the token endpoint.
pub fn tag_request(request: &mut Request, access_token: Option<&str>, token_url: &Url) {
    if request.headers().contains_key(AUTHORIZATION) {
        tracing::debug!("Request already has credentials: {}", request.url());
        return;
    }
    if targets_token_endpoint(request.url(), token_url) {
        return;
    }

    match access_token.and_then(bearer) {
        Some(value) => {
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        None => {
            tracing::warn!("No access token available for {}", request.url());
        }
    }
}

/// Decide how to answer a `401` for `rejected`.
///
/// Returns the request to replay once with a fresh token, or `None` to give up.
pub async fn authenticate(rejected: &Request, tokens: &TokenManager) -> Option<Request> {
    if targets_token_endpoint(rejected.url(), tokens.token_url()) {
        tracing::error!("Token endpoint itself rejected the request; giving up");
        tokens.clear_all();
        return None;
    }

    let Some(mut retry) = rejected.try_clone() else {
        tracing::warn!("Cannot replay {} (streaming body)", rejected.url());
        return None;
    };

    let Some(token) = tokens.refresh().await else {
        tracing::error!("Token refresh failed; re-authorization required");
        return None;
    };

    let value = bearer(&token)?;
    retry.headers_mut().insert(AUTHORIZATION, value);
    tracing::debug!("Replaying {} with refreshed token", retry.url());
    Some(retry)
}
