//! Saved tracks (/v1/me/tracks)

use anyhow::{Context, Result};

use super::client::SpotifyClient;
use crate::models::{Paging, SavedTrack, Track};

/// Unwrap saved items to their tracks.
fn into_tracks(page: Paging<SavedTrack>) -> Vec<Track> {
    page.items.into_iter().map(|item| item.track).collect()
}

pub async fn saved_tracks(client: &SpotifyClient, limit: u32, offset: u32) -> Result<()> {
    let page: Paging<SavedTrack> = client
        .get_json(
            "v1/me/tracks",
            &[("limit", limit.to_string()), ("offset", offset.to_string())],
        )
        .await
        .context("Failed to fetch saved tracks")?;

    let total = page.total;
    let start = page.offset as usize;
    let tracks = into_tracks(page);
    if tracks.is_empty() {
        println!("No saved tracks.");
        return Ok(());
    }

    println!();
    print_tracks(&tracks, start);
    println!();
    println!("Showing {} of {}.", tracks.len(), total);
    Ok(())
}

/// Shared track listing used by library, top and search output.
pub(super) fn print_tracks(tracks: &[Track], start: usize) {
    for (i, track) in tracks.iter().enumerate() {
        println!(
            "{:>3}. {} - {} [{}]",
            start + i + 1,
            track.name,
            track.artist_names(),
            track.duration()
        );
        println!("     {}", track.album_name());
    }
}
