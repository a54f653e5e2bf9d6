//! Token endpoint client (authorization-code exchange and refresh)

use anyhow::Result;
use async_trait::async_trait;
use oauth2::basic::{
    BasicClient, BasicErrorResponseType, BasicRequestTokenError, BasicTokenResponse,
};
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, HttpRequest,
    HttpResponse, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RefreshToken, Scope,
    TokenResponse, TokenUrl,
};
use url::Url;

use super::AuthConfig;

/// Token pair as returned by the token endpoint.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: Option<u64>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

/// Failure classes of a token endpoint call.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("token endpoint unreachable: {0}")]
    Network(String),
    #[error("refresh token rejected: {0}")]
    InvalidGrant(String),
    #[error("malformed token response: {0}")]
    Malformed(String),
    #[error("token request rejected: {0}")]
    Rejected(String),
}

impl EndpointError {
    /// True when stored credentials can no longer be used.
    pub fn is_invalid_credential(&self) -> bool {
        matches!(self, Self::InvalidGrant(_))
    }
}

impl<RE: std::error::Error + 'static> From<BasicRequestTokenError<RE>> for EndpointError {
    fn from(err: BasicRequestTokenError<RE>) -> Self {
        use oauth2::RequestTokenError;

        match err {
            RequestTokenError::ServerResponse(resp) => {
                let detail = resp
                    .error_description()
                    .cloned()
                    .unwrap_or_else(|| resp.error().to_string());
                match resp.error() {
                    BasicErrorResponseType::InvalidGrant => Self::InvalidGrant(detail),
                    other => Self::Rejected(format!("{}: {}", other, detail)),
                }
            }
            RequestTokenError::Request(e) => Self::Network(e.to_string()),
            RequestTokenError::Parse(e, body) => Self::Malformed(format!(
                "{} (body: {})",
                e,
                String::from_utf8_lossy(&body)
            )),
            RequestTokenError::Other(msg) => Self::Rejected(msg),
        }
    }
}

/// The token-issuance collaborator.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Exchange an authorization code for the initial token pair.
    async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: Option<&str>,
    ) -> Result<TokenGrant, EndpointError>;

    /// Mint a new access token from a refresh token.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, EndpointError>;

    /// URL of the token endpoint, used to keep it out of the retry path.
    fn token_url(&self) -> &Url;
}

#[async_trait]
impl<T: TokenEndpoint + ?Sized> TokenEndpoint for std::sync::Arc<T> {
    async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: Option<&str>,
    ) -> Result<TokenGrant, EndpointError> {
        (**self).exchange_code(code, pkce_verifier).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, EndpointError> {
        (**self).refresh(refresh_token).await
    }

    fn token_url(&self) -> &Url {
        (**self).token_url()
    }
}

/// `TokenEndpoint` backed by the `oauth2` crate.
pub struct OAuthEndpoint {
    client: BasicClient,
    http: reqwest::Client,
    token_url: Url,
    scopes: Vec<String>,
}

impl OAuthEndpoint {
    pub fn new(auth_config: &AuthConfig) -> Result<Self> {
        let token_url = Url::parse(&auth_config.token_url)?;
        let client = BasicClient::new(
            ClientId::new(auth_config.client_id.clone()),
            auth_config.client_secret.clone().map(ClientSecret::new),
            AuthUrl::new(auth_config.auth_url.clone())?,
            Some(TokenUrl::new(auth_config.token_url.clone())?),
        )
        .set_redirect_uri(RedirectUrl::new(auth_config.redirect_uri.clone())?)
        // client_id/client_secret go in the form body
        .set_auth_type(AuthType::RequestBody);

        // Redirects from the token endpoint are never followed
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            http,
            token_url,
            scopes: auth_config.scopes.clone(),
        })
    }

    /// Build the browser authorization URL with a fresh PKCE challenge and CSRF state.
    pub fn authorize_url(&self) -> (Url, CsrfToken, PkceCodeVerifier) {
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        let (url, state) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.scopes.iter().cloned().map(Scope::new))
            .set_pkce_challenge(challenge)
            .url();
        (url, state, verifier)
    }

    #[cfg(test)]
    fn with_http(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }
}

/// Send an oauth2 request through `http`.
async fn send(http: reqwest::Client, request: HttpRequest) -> Result<HttpResponse, reqwest::Error> {
    let request = http
        .request(request.method, request.url.as_str())
        .headers(request.headers)
        .body(request.body)
        .build()?;

    let resp = http.execute(request).await?;
    let status_code = resp.status();
    let headers = resp.headers().to_owned();
    let body = resp.bytes().await?.to_vec();
    Ok(HttpResponse {
        status_code,
        headers,
        body,
    })
}

fn into_grant(resp: BasicTokenResponse) -> TokenGrant {
    TokenGrant {
        access_token: resp.access_token().secret().to_string(),
        token_type: resp.token_type().as_ref().to_string(),
        expires_in: resp.expires_in().map(|d| d.as_secs()),
        refresh_token: resp.refresh_token().map(|rt| rt.secret().to_string()),
        scope: resp.scopes().map(|scopes| {
            scopes
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        }),
    }
}

#[async_trait]
impl TokenEndpoint for OAuthEndpoint {
    async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: Option<&str>,
    ) -> Result<TokenGrant, EndpointError> {
        tracing::debug!("Exchanging authorization code at {}", self.token_url);

        let mut request = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()));
        if let Some(verifier) = pkce_verifier {
            request = request.set_pkce_verifier(PkceCodeVerifier::new(verifier.to_string()));
        }
        let resp = request
            .request_async(|req| send(self.http.clone(), req))
            .await?;
        Ok(into_grant(resp))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, EndpointError> {
        tracing::debug!("Refreshing access token at {}", self.token_url);

        let resp = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(|req| send(self.http.clone(), req))
            .await?;
        Ok(into_grant(resp))
    }

    fn token_url(&self) -> &Url {
        &self.token_url
    }
}

/// Endpoint used when no OAuth client is configured.
///
/// Stored state can still be inspected and cleared; every token request fails
/// without touching credentials.
pub struct UnconfiguredEndpoint {
    token_url: Url,
}

impl UnconfiguredEndpoint {
    pub fn new(token_url: Url) -> Self {
        Self { token_url }
    }
}

#[async_trait]
impl TokenEndpoint for UnconfiguredEndpoint {
    async fn exchange_code(
        &self,
        _code: &str,
        _pkce_verifier: Option<&str>,
    ) -> Result<TokenGrant, EndpointError> {
        Err(EndpointError::Rejected("no client_id configured".to_string()))
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant, EndpointError> {
        Err(EndpointError::Rejected("no client_id configured".to_string()))
    }

    fn token_url(&self) -> &Url {
        &self.token_url
    }
}
