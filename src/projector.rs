//! Flattening of raw media items into scoring records.

use crate::error::AnalysisError;
use crate::model::{ContentCategory, FlattenedRecord, MediaItem};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The ids of every media item in one album.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlbumMembership {
    pub album_id: String,
    pub member_ids: HashSet<String>,
}

/// The ids of every media item the remote classifier tagged with `category`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryMembership {
    pub category: ContentCategory,
    pub member_ids: HashSet<String>,
}

/// Project each media item into a [`FlattenedRecord`].
///
/// Album and category lists keep the order of `albums` and `categories`.
/// Two items sharing an id is an upstream consistency bug and aborts the
/// projection with [`AnalysisError::DuplicateId`].
pub fn project(
    items: &[MediaItem],
    albums: &[AlbumMembership],
    categories: &[CategoryMembership],
) -> Result<Vec<FlattenedRecord>, AnalysisError> {
    let mut seen = HashSet::with_capacity(items.len());
    let mut records = Vec::with_capacity(items.len());

    for item in items {
        if !seen.insert(item.id.as_str()) {
            return Err(AnalysisError::DuplicateId {
                id: item.id.clone(),
            });
        }

        let album_ids = albums
            .iter()
            .filter(|album| album.member_ids.contains(&item.id))
            .map(|album| album.album_id.clone())
            .collect();
        let content_category_types = categories
            .iter()
            .filter(|category| category.member_ids.contains(&item.id))
            .map(|category| category.category)
            .collect();

        records.push(flatten(item, album_ids, content_category_types));
    }

    Ok(records)
}

fn flatten(
    item: &MediaItem,
    album_ids: Vec<String>,
    content_category_types: Vec<ContentCategory>,
) -> FlattenedRecord {
    let metadata = &item.media_metadata;
    let photo = if item.is_video() {
        None
    } else {
        metadata.photo.as_ref()
    };
    let video = metadata.video.as_ref();

    let (camera_make, camera_model) = match (video, photo) {
        (Some(video), _) => (video.camera_make.clone(), video.camera_model.clone()),
        (None, Some(photo)) => (photo.camera_make.clone(), photo.camera_model.clone()),
        (None, None) => (None, None),
    };

    FlattenedRecord {
        id: item.id.clone(),
        filename: item.filename.clone(),
        description: item.description.clone(),
        mime_type: item.mime_type.clone(),
        creation_time: metadata.creation_time,
        width: metadata.width.clone(),
        height: metadata.height.clone(),
        focal_length: photo.and_then(|p| p.focal_length),
        aperture_f_number: photo.and_then(|p| p.aperture_f_number),
        iso_equivalent: photo.and_then(|p| p.iso_equivalent),
        exposure_time: photo.and_then(|p| p.exposure_time),
        fps: video.and_then(|v| v.fps),
        status: video.and_then(|v| v.status.clone()),
        camera_make,
        camera_model,
        album_ids,
        content_category_types,
    }
}
