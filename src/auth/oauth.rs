//! Authorization-code + PKCE login, logout and status

use anyhow::{bail, Context, Result};
use chrono::{Local, TimeZone};
use tokio::io::{AsyncBufReadExt, BufReader};
use url::Url;

use super::endpoint::OAuthEndpoint;
use super::manager::TokenManager;

/// Extract the authorization code from the URL the browser was redirected to.
///
/// Fails on a state mismatch or an `error=` parameter.
pub fn parse_redirect(input: &str, expected_state: &str) -> Result<String> {
    let url = Url::parse(input.trim()).context("Not a valid URL")?;

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        bail!("Authorization was denied: {}", error);
    }
    if state.as_deref() != Some(expected_state) {
        bail!("State mismatch in redirect; refusing to exchange the code");
    }
    code.context("Redirect URL has no 'code' parameter")
}

/// Perform the authorization-code login flow
pub async fn login(manager: &TokenManager, endpoint: &OAuthEndpoint, force: bool) -> Result<()> {
    if !force && manager.access_token().is_some() {
        if !manager.is_expired_or_expiring_soon() {
            println!("Already logged in (access token valid). Use --force to re-authenticate.");
            return Ok(());
        }
        if manager.has_refresh_token() {
            tracing::info!("Access token expired, attempting refresh...");
            if manager.refresh().await.is_some() {
                println!("Token refreshed successfully.");
                return Ok(());
            }
            tracing::warn!("Refresh failed, falling back to browser login");
        }
    }

    let (auth_url, state, verifier) = endpoint.authorize_url();

    println!();
    println!("To sign in, open this URL in a browser:");
    println!();
    println!("  {}", auth_url);
    println!();
    println!("After approving, paste the full URL you were redirected to:");

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("Failed to read redirect URL")?;

    let code = parse_redirect(&line, state.secret())?;

    tracing::info!("Exchanging authorization code...");
    match manager
        .exchange_authorization_code(&code, Some(verifier.secret().as_str()))
        .await
    {
        Some(_) => {
            println!("Login successful.");
            Ok(())
        }
        None => bail!("Token exchange failed. Run with --verbose for details."),
    }
}

/// Clear stored credentials
pub async fn logout(manager: &TokenManager) -> Result<()> {
    manager.clear_all();
    println!("Logged out.");
    Ok(())
}

fn format_expiry(epoch_ms: u64) -> String {
    match Local.timestamp_millis_opt(epoch_ms as i64).single() {
        Some(t) => t.format("%Y-%m-%d %H:%M:%S %Z").to_string(),
        None => epoch_ms.to_string(),
    }
}

/// Display current auth status
pub async fn status(manager: &TokenManager) -> Result<()> {
    let record = manager.snapshot();

    match &record {
        Some(r) if r.is_authenticated() => {
            let label = if manager.is_expired_or_expiring_soon() {
                "expired"
            } else {
                "valid"
            };
            println!("Access token: {}", label);
            println!("  expires_at: {}", format_expiry(r.absolute_expiry_epoch_ms));
            println!("  token_type: {}", r.token_type.as_deref().unwrap_or("(none)"));
        }
        _ => println!("Access token: none"),
    }

    if manager.has_refresh_token() {
        println!("Refresh tok:  present");
    } else {
        println!("Refresh tok:  none");
    }

    if manager.access_token().is_none() {
        println!("\nRun 'music-extended login' to authenticate.");
    }

    Ok(())
}
