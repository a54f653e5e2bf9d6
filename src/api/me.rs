//! User profile endpoint (/v1/me)

use anyhow::{Context, Result};

use super::client::SpotifyClient;
use crate::models::{UserProfile, NONE};

/// Fetch and display current user info.
pub async fn whoami(client: &SpotifyClient) -> Result<()> {
    let me: UserProfile = client
        .get_json("v1/me", &[])
        .await
        .context("Failed to fetch user profile")?;

    println!();
    println!("Display Name: {}", me.display_name.as_deref().unwrap_or(NONE));
    println!("Email:        {}", me.email.as_deref().unwrap_or(NONE));
    println!("Country:      {}", me.country.as_deref().unwrap_or(NONE));
    println!("Product:      {}", me.product.as_deref().unwrap_or(NONE));
    match me.followers.and_then(|f| f.total) {
        Some(n) => println!("Followers:    {}", n),
        None => println!("Followers:    {}", NONE),
    }
    println!("ID:           {}", me.id);

    Ok(())
}
