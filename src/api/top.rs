//! Top artists and tracks (/v1/me/top/{type})

use anyhow::{Context, Result};

use super::client::SpotifyClient;
use super::library::print_tracks;
use crate::models::{Artist, Paging, Track};

/// Affinity window for top items
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum TimeRange {
    /// About the last 4 weeks
    Short,
    /// About the last 6 months
    #[default]
    Medium,
    /// Several years
    Long,
}

impl TimeRange {
    pub fn as_param(self) -> &'static str {
        match self {
            Self::Short => "short_term",
            Self::Medium => "medium_term",
            Self::Long => "long_term",
        }
    }
}

fn query(range: TimeRange, limit: u32, offset: u32) -> Vec<(&'static str, String)> {
    vec![
        ("time_range", range.as_param().to_string()),
        ("limit", limit.to_string()),
        ("offset", offset.to_string()),
    ]
}

pub async fn top_artists(
    client: &SpotifyClient,
    range: TimeRange,
    limit: u32,
    offset: u32,
) -> Result<()> {
    let page: Paging<Artist> = client
        .get_json("v1/me/top/artists", &query(range, limit, offset))
        .await
        .context("Failed to fetch top artists")?;

    if page.items.is_empty() {
        println!("No top artists yet.");
        return Ok(());
    }

    println!();
    for (i, artist) in page.items.iter().enumerate() {
        let genres = if artist.genres.is_empty() {
            crate::models::NONE.to_string()
        } else {
            artist.genres.join(", ")
        };
        println!("{:>3}. {}", page.offset as usize + i + 1, artist.name);
        println!("     {}", genres);
    }
    Ok(())
}

pub async fn top_tracks(
    client: &SpotifyClient,
    range: TimeRange,
    limit: u32,
    offset: u32,
) -> Result<()> {
    let page: Paging<Track> = client
        .get_json("v1/me/top/tracks", &query(range, limit, offset))
        .await
        .context("Failed to fetch top tracks")?;

    if page.items.is_empty() {
        println!("No top tracks yet.");
        return Ok(());
    }

    println!();
    print_tracks(&page.items, page.offset as usize);
    Ok(())
}
