//! Track and artist models
//!
//! Optional fields are `Option`; display helpers substitute placeholders.

use serde::{Deserialize, Serialize};

use super::user::Followers;

/// Artist (full object from top-artists, simplified inside tracks)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artist {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    pub popularity: Option<u32>,
    pub followers: Option<Followers>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Album {
    pub id: Option<String>,
    pub name: String,
    pub release_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<Artist>,
    pub album: Option<Album>,
    #[serde(default)]
    pub duration_ms: u64,
    pub popularity: Option<u32>,
    pub uri: Option<String>,
    pub preview_url: Option<String>,
}

impl Track {
    /// Comma-joined artist names.
    pub fn artist_names(&self) -> String {
        if self.artists.is_empty() {
            return "Unknown artist".to_string();
        }
        self.artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn album_name(&self) -> &str {
        self.album.as_ref().map_or(super::NONE, |a| a.name.as_str())
    }

    /// `m:ss`
    pub fn duration(&self) -> String {
        let secs = self.duration_ms / 1000;
        format!("{}:{:02}", secs / 60, secs % 60)
    }
}

/// Item of `/v1/me/tracks`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedTrack {
    pub added_at: Option<String>,
    pub track: Track,
}

/// `/v1/search` response; only the track section is requested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub tracks: Option<super::Paging<Track>>,
}
