//! Playlist models

use serde::{Deserialize, Serialize};

use super::user::PublicUser;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracksRef {
    pub total: u32,
}

/// Simplified playlist (list responses)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub collaborative: bool,
    pub public: Option<bool>,
    pub owner: PublicUser,
    pub tracks: Option<TracksRef>,
    pub uri: String,
}

impl Playlist {
    pub fn track_count(&self) -> u32 {
        self.tracks.as_ref().map_or(0, |t| t.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Paging;

    #[test]
    fn test_parse_playlist_page() {
        let json = r#"{
            "href": "https://api.spotify.com/v1/me/playlists?offset=0&limit=1",
            "items": [{
                "id": "37i9dQZF1DX",
                "name": "Focus",
                "description": null,
                "collaborative": false,
                "public": true,
                "owner": {"id": "spotify", "display_name": "Spotify"},
                "tracks": {"href": "https://api.spotify.com/v1/playlists/x/tracks", "total": 42},
                "images": [],
                "uri": "spotify:playlist:37i9dQZF1DX",
                "snapshot_id": "abc"
            }],
            "limit": 1,
            "next": "https://api.spotify.com/v1/me/playlists?offset=1&limit=1",
            "offset": 0,
            "previous": null,
            "total": 12
        }"#;
        let page: Paging<Playlist> = serde_json::from_str(json).unwrap();
        assert_eq!(page.total, 12);
        assert!(page.has_more());
        assert_eq!(page.items[0].track_count(), 42);
        assert_eq!(page.items[0].owner.label(), "Spotify");
    }
}
