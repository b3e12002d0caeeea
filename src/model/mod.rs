//! Media library model as served by the remote photo API.

pub mod flattened;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use flattened::FlattenedRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub mime_type: String,
    pub filename: String,
    pub media_metadata: MediaMetadata,
}

impl MediaItem {
    /// The video metadata group doubles as the photo/video discriminator.
    pub fn is_video(&self) -> bool {
        self.media_metadata.video.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMetadata {
    pub creation_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<PhotoMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhotoMetadata {
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub focal_length: Option<f32>,
    pub aperture_f_number: Option<f32>,
    pub iso_equivalent: Option<i32>,
    pub exposure_time: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoMetadata {
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub fps: Option<f64>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_url: Option<String>,
    #[serde(default)]
    pub media_items_count: u64,
}

/// Classifier tags the remote library assigns to media items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentCategory {
    None,
    Landscapes,
    Receipts,
    Cityscapes,
    Landmarks,
    Selfies,
    People,
    Pets,
    Weddings,
    Birthdays,
    Documents,
    Travel,
    Animals,
    Food,
    Sport,
    Night,
    Performances,
    Whiteboards,
    Screenshots,
    Utility,
    Arts,
    Crafts,
    Fashion,
    Houses,
    Gardens,
    Flowers,
    Holidays,
}

impl ContentCategory {
    pub const ALL: [ContentCategory; 27] = [
        ContentCategory::None,
        ContentCategory::Landscapes,
        ContentCategory::Receipts,
        ContentCategory::Cityscapes,
        ContentCategory::Landmarks,
        ContentCategory::Selfies,
        ContentCategory::People,
        ContentCategory::Pets,
        ContentCategory::Weddings,
        ContentCategory::Birthdays,
        ContentCategory::Documents,
        ContentCategory::Travel,
        ContentCategory::Animals,
        ContentCategory::Food,
        ContentCategory::Sport,
        ContentCategory::Night,
        ContentCategory::Performances,
        ContentCategory::Whiteboards,
        ContentCategory::Screenshots,
        ContentCategory::Utility,
        ContentCategory::Arts,
        ContentCategory::Crafts,
        ContentCategory::Fashion,
        ContentCategory::Houses,
        ContentCategory::Gardens,
        ContentCategory::Flowers,
        ContentCategory::Holidays,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentCategory::None => "none",
            ContentCategory::Landscapes => "landscapes",
            ContentCategory::Receipts => "receipts",
            ContentCategory::Cityscapes => "cityscapes",
            ContentCategory::Landmarks => "landmarks",
            ContentCategory::Selfies => "selfies",
            ContentCategory::People => "people",
            ContentCategory::Pets => "pets",
            ContentCategory::Weddings => "weddings",
            ContentCategory::Birthdays => "birthdays",
            ContentCategory::Documents => "documents",
            ContentCategory::Travel => "travel",
            ContentCategory::Animals => "animals",
            ContentCategory::Food => "food",
            ContentCategory::Sport => "sport",
            ContentCategory::Night => "night",
            ContentCategory::Performances => "performances",
            ContentCategory::Whiteboards => "whiteboards",
            ContentCategory::Screenshots => "screenshots",
            ContentCategory::Utility => "utility",
            ContentCategory::Arts => "arts",
            ContentCategory::Crafts => "crafts",
            ContentCategory::Fashion => "fashion",
            ContentCategory::Houses => "houses",
            ContentCategory::Gardens => "gardens",
            ContentCategory::Flowers => "flowers",
            ContentCategory::Holidays => "holidays",
        }
    }
}

impl fmt::Display for ContentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which slice of the library a duplicate analysis covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    All,
    Photo,
    Video,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::All => "all",
            MediaType::Photo => "photo",
            MediaType::Video => "video",
        }
    }

    /// Whether a mime type belongs to this media type (`image/*`, `video/*`).
    pub fn matches_mime(&self, mime_type: &str) -> bool {
        let prefix = match self {
            MediaType::All => return true,
            MediaType::Photo => "image",
            MediaType::Video => "video",
        };
        mime_type
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(MediaType::All),
            "photo" | "photos" => Ok(MediaType::Photo),
            "video" | "videos" => Ok(MediaType::Video),
            other => Err(format!(
                "unknown media type '{}' (expected all, photo or video)",
                other
            )),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    pub fn photo(id: &str, filename: &str) -> MediaItem {
        MediaItem {
            id: id.to_string(),
            description: None,
            product_url: None,
            base_url: None,
            mime_type: "image/jpeg".to_string(),
            filename: filename.to_string(),
            media_metadata: MediaMetadata {
                creation_time: Utc.with_ymd_and_hms(2020, 6, 1, 12, 0, 0).unwrap(),
                width: Some("4032".to_string()),
                height: Some("3024".to_string()),
                photo: Some(PhotoMetadata {
                    camera_make: Some("Google".to_string()),
                    camera_model: Some("Pixel 4".to_string()),
                    focal_length: Some(4.38),
                    aperture_f_number: Some(1.73),
                    iso_equivalent: Some(100),
                    exposure_time: Some(0.01),
                }),
                video: None,
            },
        }
    }

    pub fn video(id: &str, filename: &str) -> MediaItem {
        MediaItem {
            id: id.to_string(),
            description: None,
            product_url: None,
            base_url: None,
            mime_type: "video/mp4".to_string(),
            filename: filename.to_string(),
            media_metadata: MediaMetadata {
                creation_time: Utc.with_ymd_and_hms(2021, 1, 1, 9, 30, 0).unwrap(),
                width: Some("1920".to_string()),
                height: Some("1080".to_string()),
                photo: None,
                video: Some(VideoMetadata {
                    camera_make: Some("Google".to_string()),
                    camera_model: Some("Pixel 4".to_string()),
                    fps: Some(30.0),
                    status: Some("READY".to_string()),
                }),
            },
        }
    }
}
