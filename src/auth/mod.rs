//! Authentication module for the streaming Web API
//!
//! Implements the OAuth2 authorization-code flow with PKCE, an encrypted
//! token store, and a token manager that refreshes on demand.

pub mod endpoint;
pub mod manager;
pub mod oauth;
pub mod tokens;
pub mod vault;

use anyhow::{Context, Result};
use std::sync::Arc;
use url::Url;

use crate::config::Config;

pub use endpoint::{OAuthEndpoint, UnconfiguredEndpoint};
pub use manager::TokenManager;
pub use oauth::{login, logout, status};
use tokens::TokenStore;
pub use vault::EncryptedFileStore;

/// OAuth2 client configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// OAuth2 client ID
    pub client_id: String,
    /// OAuth2 client secret, sent in the form body when present
    pub client_secret: Option<String>,
    /// OAuth2 redirect URI
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
}

impl AuthConfig {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            client_id: config.client_id()?.to_string(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            auth_url: config.auth_url.clone(),
            token_url: config.token_url.clone(),
            scopes: config.scopes.clone(),
        })
    }
}

/// Wire the encrypted store and the OAuth endpoint into a token manager.
///
/// Returns the endpoint too, since login needs it to build the authorization URL.
pub fn session(config: &Config) -> Result<(TokenManager, Arc<OAuthEndpoint>)> {
    let auth_config = AuthConfig::from_config(config)?;
    let endpoint = Arc::new(OAuthEndpoint::new(&auth_config)?);
    let store = EncryptedFileStore::default_location()?;
    let manager = TokenManager::new(Box::new(store), Box::new(Arc::clone(&endpoint)));
    Ok((manager, endpoint))
}

/// Token manager over the encrypted store that needs no OAuth client.
///
/// Enough for `logout` and `status`; refreshes fail until a client id is set.
pub fn local_session(config: &Config) -> Result<TokenManager> {
    let store = EncryptedFileStore::default_location()?;
    local_manager(config, Box::new(store))
}

fn local_manager(config: &Config, store: Box<dyn TokenStore>) -> Result<TokenManager> {
    let token_url = Url::parse(&config.token_url).context("Invalid token_url")?;
    Ok(TokenManager::new(
        store,
        Box::new(UnconfiguredEndpoint::new(token_url)),
    ))
}
