//! Current user's playlists (/v1/me/playlists)

use anyhow::{Context, Result};

use super::client::SpotifyClient;
use crate::models::{Paging, Playlist};

pub async fn list_playlists(client: &SpotifyClient, limit: u32, offset: u32) -> Result<()> {
    let page: Paging<Playlist> = client
        .get_json(
            "v1/me/playlists",
            &[("limit", limit.to_string()), ("offset", offset.to_string())],
        )
        .await
        .context("Failed to fetch playlists")?;

    if page.items.is_empty() {
        println!("No playlists found.");
        return Ok(());
    }

    println!();
    for (i, playlist) in page.items.iter().enumerate() {
        let flags = match (playlist.collaborative, playlist.public) {
            (true, _) => " [collab]",
            (false, Some(false)) => " [private]",
            _ => "",
        };
        println!(
            "{:>3}. {}{} ({} tracks, by {})",
            page.offset as usize + i + 1,
            playlist.name,
            flags,
            playlist.track_count(),
            playlist.owner.label()
        );
        println!("     {}", playlist.id);
    }
    println!();
    println!("Showing {} of {}.", page.items.len(), page.total);
    if page.has_more() {
        println!(
            "More available: --offset {}",
            page.offset as usize + page.items.len()
        );
    }

    Ok(())
}
