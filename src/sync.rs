//! Pull the media library through the disk cache and index it for analysis.

use crate::cache::DiskCache;
use crate::error::{AnalysisError, RemoteError};
use crate::model::{Album, ContentCategory, FlattenedRecord, MediaItem};
use crate::projector::{self, AlbumMembership, CategoryMembership};
use crate::remote::RemoteLibrary;
use rayon::ThreadPool;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap, HashSet};

pub const MEDIA_ITEMS_KEY: &str = "media_items.json";
pub const ALBUMS_KEY: &str = "albums.json";

pub fn album_media_items_key(album_id: &str) -> String {
    format!("album_media_items_{}.json", album_id)
}

pub fn category_media_items_key(category: ContentCategory) -> String {
    format!("media_items_{}.json", category)
}

pub fn media_item_key(id: &str) -> String {
    format!("media_item_{}.json", id)
}

/// The synchronised library: every media item plus album and category membership.
#[derive(Debug, Clone, Default)]
pub struct Library {
    items: Vec<MediaItem>,
    lookup: HashMap<String, usize>,
    albums: Vec<Album>,
    album_members: Vec<AlbumMembership>,
    category_members: Vec<CategoryMembership>,
}

impl Library {
    pub fn items(&self) -> &[MediaItem] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&MediaItem> {
        self.lookup.get(id).map(|&i| &self.items[i])
    }

    pub fn albums(&self) -> &[Album] {
        &self.albums
    }

    pub fn album_members(&self) -> &[AlbumMembership] {
        &self.album_members
    }

    pub fn category_members(&self) -> &[CategoryMembership] {
        &self.category_members
    }

    /// Flatten every item for the scoring engine.
    pub fn project(&self) -> Result<Vec<FlattenedRecord>, AnalysisError> {
        projector::project(&self.items, &self.album_members, &self.category_members)
    }

    fn insert(&mut self, item: MediaItem) -> bool {
        if self.lookup.contains_key(&item.id) {
            return false;
        }
        self.lookup.insert(item.id.clone(), self.items.len());
        self.items.push(item);
        true
    }
}

/// Albums sharing a title with another album, compared case-insensitively.
///
/// Keeps the order of `albums`.
pub fn album_title_duplicates(albums: &[Album]) -> Vec<&Album> {
    let mut titles: HashMap<String, usize> = HashMap::new();
    for album in albums {
        *titles.entry(album.title.to_lowercase()).or_insert(0) += 1;
    }
    albums
        .iter()
        .filter(|album| titles.get(&album.title.to_lowercase()).is_some_and(|&n| n > 1))
        .collect()
}

/// Fetch media items, albums and categories, each through the cache.
///
/// Album listings are fetched on `pool`; every listing is cached under its
/// own key, so concurrent callers for one album share a single remote call.
pub fn synchronize(
    cache: &DiskCache,
    remote: &dyn RemoteLibrary,
    pool: &ThreadPool,
    skip_cache: bool,
) -> Result<Library, AnalysisError> {
    let mut library = sync_media_items(cache, remote, skip_cache)?;
    sync_albums(&mut library, cache, remote, pool, skip_cache)?;
    sync_categories(&mut library, cache, remote, skip_cache)?;
    log::info!(
        "Synchronised {} media items, {} albums",
        library.items.len(),
        library.albums.len()
    );
    Ok(library)
}

fn sync_media_items(
    cache: &DiskCache,
    remote: &dyn RemoteLibrary,
    skip_cache: bool,
) -> Result<Library, AnalysisError> {
    let items: Vec<MediaItem> = cache.get_value(MEDIA_ITEMS_KEY, skip_cache, || {
        collect_stream(remote.list_media_items())
    })?;

    let mut library = Library::default();
    let mut duplicates = BTreeSet::new();
    for item in items {
        let id = item.id.clone();
        if !library.insert(item) {
            duplicates.insert(id);
        }
    }
    for id in &duplicates {
        log::warn!(
            "Media item id {} listed more than once; keeping the first occurrence",
            id
        );
    }
    Ok(library)
}

fn sync_albums(
    library: &mut Library,
    cache: &DiskCache,
    remote: &dyn RemoteLibrary,
    pool: &ThreadPool,
    skip_cache: bool,
) -> Result<(), AnalysisError> {
    let albums: Vec<Album> = cache.get_value(ALBUMS_KEY, skip_cache, || {
        remote.list_albums().map_err(AnalysisError::from)
    })?;

    let listings = pool.install(|| {
        albums
            .par_iter()
            .map(|album| -> Result<AlbumMembership, AnalysisError> {
                let key = album_media_items_key(&album.id);
                let items: Vec<MediaItem> = cache.get_value(&key, skip_cache, || {
                    collect_stream(remote.list_media_items_by_album(&album.id))
                })?;
                Ok(AlbumMembership {
                    album_id: album.id.clone(),
                    member_ids: items.into_iter().map(|item| item.id).collect(),
                })
            })
            .collect::<Result<Vec<_>, _>>()
    })?;

    // Some items (bursts, for one) only show up inside albums.
    let mut missing: BTreeSet<&str> = BTreeSet::new();
    for membership in &listings {
        for id in &membership.member_ids {
            if library.get(id).is_none() {
                missing.insert(id.as_str());
            }
        }
    }
    for id in missing {
        let item: Option<MediaItem> = cache.get_value(&media_item_key(id), skip_cache, || {
            remote.get_media_item_by_id(id).map_err(AnalysisError::from)
        })?;
        match item {
            Some(item) => {
                log::info!("Added {} ({}) found only in an album", item.filename, id);
                library.insert(item);
            }
            None => log::warn!("Album member {} could not be found in the library", id),
        }
    }

    library.albums = albums;
    library.album_members = listings;
    Ok(())
}

fn sync_categories(
    library: &mut Library,
    cache: &DiskCache,
    remote: &dyn RemoteLibrary,
    skip_cache: bool,
) -> Result<(), AnalysisError> {
    for category in ContentCategory::ALL {
        let items: Vec<MediaItem> =
            cache.get_value(&category_media_items_key(category), skip_cache, || {
                remote
                    .list_media_items_by_category(category)
                    .map_err(AnalysisError::from)
            })?;
        // The category search may repeat an id; membership is a set.
        let member_ids: HashSet<String> = items.into_iter().map(|item| item.id).collect();
        library.category_members.push(CategoryMembership {
            category,
            member_ids,
        });
    }
    Ok(())
}

fn collect_stream<I>(stream: I) -> Result<Vec<MediaItem>, AnalysisError>
where
    I: Iterator<Item = Result<MediaItem, RemoteError>>,
{
    stream
        .collect::<Result<Vec<_>, _>>()
        .map_err(AnalysisError::from)
}
