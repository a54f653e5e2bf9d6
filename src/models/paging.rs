//! Paged list envelope

use serde::{Deserialize, Deserializer, Serialize};

/// One page of a list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Paging<T> {
    /// Null entries (removed or unavailable items) are dropped.
    #[serde(default = "Vec::new", deserialize_with = "skip_nulls")]
    pub items: Vec<T>,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default)]
    pub total: u32,
    pub next: Option<String>,
}

impl<T> Paging<T> {
    pub fn has_more(&self) -> bool {
        self.next.is_some()
    }
}

fn skip_nulls<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let items: Option<Vec<Option<T>>> = Option::deserialize(deserializer)?;
    Ok(items.unwrap_or_default().into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Playlist, SavedTrack};

    #[test]
    fn test_null_items_are_skipped() {
        let json = r#"{
            "items": [
                null,
                {"added_at": null, "track": {"id": "a", "name": "One"}},
                null
            ],
            "limit": 3, "offset": 0, "total": 3, "next": null
        }"#;
        let page: Paging<SavedTrack> = serde_json::from_str(json).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].track.name, "One");
        assert_eq!(page.total, 3);
    }

    #[test]
    fn test_null_or_missing_items_list_is_empty() {
        let page: Paging<Playlist> =
            serde_json::from_str(r#"{"items": null, "next": null}"#).unwrap();
        assert!(page.items.is_empty());

        let page: Paging<Playlist> = serde_json::from_str(r#"{"total": 0}"#).unwrap();
        assert!(page.items.is_empty());
        assert!(!page.has_more());
    }
}
