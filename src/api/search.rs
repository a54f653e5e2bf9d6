//! Track search (/v1/search)

use anyhow::{bail, Context, Result};

use super::client::SpotifyClient;
use super::library::print_tracks;
use crate::models::track::SearchResponse;

pub async fn search_tracks(client: &SpotifyClient, query: &str, limit: u32) -> Result<()> {
    if query.trim().is_empty() {
        bail!("Search query is empty");
    }

    let resp: SearchResponse = client
        .get_json(
            "v1/search",
            &[
                ("q", query.to_string()),
                ("type", "track".to_string()),
                ("limit", limit.to_string()),
            ],
        )
        .await
        .with_context(|| format!("Search for '{}' failed", query))?;

    let tracks = resp.tracks.map(|page| page.items).unwrap_or_default();
    if tracks.is_empty() {
        println!("No tracks match '{}'.", query);
        return Ok(());
    }

    println!();
    print_tracks(&tracks, 0);
    Ok(())
}
