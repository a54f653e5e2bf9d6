//! API client module for the streaming Web API

pub mod client;
mod library;
mod me;
pub mod pipeline;
mod playlists;
mod search;
mod top;

use anyhow::Result;

pub use client::SpotifyClient;
pub use top::TimeRange;

/// Show current user info
pub async fn whoami(client: &SpotifyClient) -> Result<()> {
    me::whoami(client).await
}

/// List the current user's playlists
pub async fn list_playlists(client: &SpotifyClient, limit: u32, offset: u32) -> Result<()> {
    playlists::list_playlists(client, limit, offset).await
}

/// List the current user's saved tracks
pub async fn saved_tracks(client: &SpotifyClient, limit: u32, offset: u32) -> Result<()> {
    library::saved_tracks(client, limit, offset).await
}

/// List the current user's top artists
pub async fn top_artists(
    client: &SpotifyClient,
    range: TimeRange,
    limit: u32,
    offset: u32,
) -> Result<()> {
    top::top_artists(client, range, limit, offset).await
}

/// List the current user's top tracks
pub async fn top_tracks(
    client: &SpotifyClient,
    range: TimeRange,
    limit: u32,
    offset: u32,
) -> Result<()> {
    top::top_tracks(client, range, limit, offset).await
}

/// Search the catalog for tracks
pub async fn search_tracks(client: &SpotifyClient, query: &str, limit: u32) -> Result<()> {
    search::search_tracks(client, query, limit).await
}
