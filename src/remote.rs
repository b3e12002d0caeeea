//! Access to the remote photo library.

use crate::error::RemoteError;
use crate::model::{Album, ContentCategory, MediaItem};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub type MediaItemStream<'a> = Box<dyn Iterator<Item = Result<MediaItem, RemoteError>> + Send + 'a>;

/// Read-only operations the duplicate analysis needs from a photo library.
///
/// Listings are lazy and may page through the remote service as they are
/// consumed; each call starts a fresh listing.
pub trait RemoteLibrary: Send + Sync {
    fn list_albums(&self) -> Result<Vec<Album>, RemoteError>;

    fn list_media_items(&self) -> MediaItemStream<'_>;

    fn list_media_items_by_album(&self, album_id: &str) -> MediaItemStream<'_>;

    fn list_media_items_by_category(
        &self,
        category: ContentCategory,
    ) -> Result<Vec<MediaItem>, RemoteError>;

    /// `Ok(None)` when the library has no item with this id.
    fn get_media_item_by_id(&self, id: &str) -> Result<Option<MediaItem>, RemoteError>;
}

/// A library export: every media item plus album and category memberships.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibrarySnapshot {
    #[serde(default)]
    pub albums: Vec<Album>,
    #[serde(default)]
    pub media_items: Vec<MediaItem>,
    /// Album id to the ids of its media items.
    #[serde(default)]
    pub album_items: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub category_items: HashMap<ContentCategory, Vec<String>>,
    /// Items reachable by id or through albums but left out of the main listing.
    #[serde(default)]
    pub unlisted_items: Vec<MediaItem>,
}

/// [`RemoteLibrary`] served from a [`LibrarySnapshot`].
pub struct SnapshotLibrary {
    snapshot: LibrarySnapshot,
    by_id: HashMap<String, MediaItem>,
}

impl SnapshotLibrary {
    pub fn new(snapshot: LibrarySnapshot) -> Self {
        let by_id = snapshot
            .media_items
            .iter()
            .chain(&snapshot.unlisted_items)
            .map(|item| (item.id.clone(), item.clone()))
            .collect();
        Self { snapshot, by_id }
    }

    /// Load a JSON library export from disk.
    pub fn open(path: &Path) -> Result<Self, RemoteError> {
        let json = fs::read_to_string(path)?;
        let snapshot: LibrarySnapshot = serde_json::from_str(&json)?;
        log::info!(
            "Loaded library export {} ({} media items, {} albums)",
            path.display(),
            snapshot.media_items.len(),
            snapshot.albums.len()
        );
        Ok(Self::new(snapshot))
    }

    fn item(&self, id: &str) -> Option<&MediaItem> {
        self.by_id.get(id)
    }

    fn resolve<'a>(&'a self, ids: &'a [String]) -> MediaItemStream<'a> {
        Box::new(ids.iter().map(move |id| {
            self.item(id)
                .cloned()
                .ok_or_else(|| RemoteError::NotFound { id: id.clone() })
        }))
    }
}

impl RemoteLibrary for SnapshotLibrary {
    fn list_albums(&self) -> Result<Vec<Album>, RemoteError> {
        Ok(self.snapshot.albums.clone())
    }

    fn list_media_items(&self) -> MediaItemStream<'_> {
        Box::new(self.snapshot.media_items.iter().cloned().map(Ok))
    }

    fn list_media_items_by_album(&self, album_id: &str) -> MediaItemStream<'_> {
        match self.snapshot.album_items.get(album_id) {
            Some(ids) => self.resolve(ids),
            None => Box::new(std::iter::once(Err(RemoteError::Unavailable {
                message: format!("unknown album {}", album_id),
            }))),
        }
    }

    fn list_media_items_by_category(
        &self,
        category: ContentCategory,
    ) -> Result<Vec<MediaItem>, RemoteError> {
        match self.snapshot.category_items.get(&category) {
            Some(ids) => self.resolve(ids).collect(),
            None => Ok(Vec::new()),
        }
    }

    fn get_media_item_by_id(&self, id: &str) -> Result<Option<MediaItem>, RemoteError> {
        Ok(self.item(id).cloned())
    }
}
