use super::ContentCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A media item reduced to the fields the duplicate engine groups on.
///
/// Photo fields are only populated for photos and video fields only for
/// videos; the other group stays `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlattenedRecord {
    pub id: String,
    pub filename: String,
    pub description: Option<String>,
    pub mime_type: String,

    pub creation_time: DateTime<Utc>,
    pub width: Option<String>,
    pub height: Option<String>,

    // photo
    pub focal_length: Option<f32>,
    pub aperture_f_number: Option<f32>,
    pub iso_equivalent: Option<i32>,
    pub exposure_time: Option<f32>,

    // video
    pub fps: Option<f64>,
    pub status: Option<String>,

    pub camera_make: Option<String>,
    pub camera_model: Option<String>,

    pub album_ids: Vec<String>,
    pub content_category_types: Vec<ContentCategory>,
}
