//! Data models for the Web API

pub mod paging;
pub mod playlist;
pub mod track;
pub mod user;

pub use paging::Paging;
pub use playlist::Playlist;
pub use track::{Artist, SavedTrack, Track};
pub use user::UserProfile;

/// Placeholder for absent optional fields.
pub const NONE: &str = "(none)";
