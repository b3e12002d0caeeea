//! Grouping properties and the combinations the duplicate engine runs over.

use crate::model::MediaType;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

bitflags! {
    /// A set of record properties used together as a grouping key.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    pub struct PropertySubset: u16 {
        const FILENAME = 1;
        const MIME_TYPE = 1 << 1;
        const DIMENSIONS = 1 << 2;
        const CREATION_TIME = 1 << 3;
        const DESCRIPTION = 1 << 4;
        // photo
        const FOCAL_LENGTH = 1 << 5;
        const APERTURE_F_NUMBER = 1 << 6;
        const ISO_EQUIVALENT = 1 << 7;
        const EXPOSURE_TIME = 1 << 8;
        // video
        const FPS = 1 << 9;
        const STATUS = 1 << 10;
        // photo & video
        const CAMERA_MAKE = 1 << 11;
        const CAMERA_MODEL = 1 << 12;
        // collections
        const ALBUM_IDS = 1 << 13;
        const CONTENT_CATEGORY_TYPES = 1 << 14;
    }
}

impl PropertySubset {
    pub const PHOTO_ONLY: PropertySubset = PropertySubset::FOCAL_LENGTH
        .union(PropertySubset::APERTURE_F_NUMBER)
        .union(PropertySubset::ISO_EQUIVALENT)
        .union(PropertySubset::EXPOSURE_TIME);

    pub const VIDEO_ONLY: PropertySubset = PropertySubset::FPS.union(PropertySubset::STATUS);

    /// Every non-empty subset of the full property set, lowest bit pattern first.
    pub fn combinations() -> Vec<PropertySubset> {
        Self::combinations_of(PropertySubset::all())
    }

    /// Every non-empty subset of `set`, lowest bit pattern first.
    ///
    /// Walks the submasks of `set` so the output holds exactly
    /// `2^n - 1` values for an `n`-flag set.
    pub fn combinations_of(set: PropertySubset) -> Vec<PropertySubset> {
        let mask = set.bits();
        let mut subsets = Vec::with_capacity((1usize << mask.count_ones()) - 1);
        let mut sub: u16 = 0;
        loop {
            // next submask of `mask` in increasing order
            sub = sub.wrapping_sub(mask) & mask;
            if sub == 0 {
                break;
            }
            subsets.push(PropertySubset::from_bits_retain(sub));
        }
        subsets
    }

    /// Properties that carry no signal for `media_type`.
    pub fn irrelevant_to(media_type: MediaType) -> PropertySubset {
        match media_type {
            MediaType::All => PropertySubset::empty(),
            MediaType::Photo => PropertySubset::VIDEO_ONLY,
            MediaType::Video => PropertySubset::PHOTO_ONLY,
        }
    }

    /// Camel-case property names, as used in reports.
    pub fn names(&self) -> Vec<&'static str> {
        PROPERTY_NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

const PROPERTY_NAMES: [(PropertySubset, &str); 15] = [
    (PropertySubset::FILENAME, "filename"),
    (PropertySubset::MIME_TYPE, "mimeType"),
    (PropertySubset::DIMENSIONS, "dimensions"),
    (PropertySubset::CREATION_TIME, "creationTime"),
    (PropertySubset::DESCRIPTION, "description"),
    (PropertySubset::FOCAL_LENGTH, "focalLength"),
    (PropertySubset::APERTURE_F_NUMBER, "apertureFNumber"),
    (PropertySubset::ISO_EQUIVALENT, "isoEquivalent"),
    (PropertySubset::EXPOSURE_TIME, "exposureTime"),
    (PropertySubset::FPS, "fps"),
    (PropertySubset::STATUS, "status"),
    (PropertySubset::CAMERA_MAKE, "cameraMake"),
    (PropertySubset::CAMERA_MODEL, "cameraModel"),
    (PropertySubset::ALBUM_IDS, "albumIds"),
    (PropertySubset::CONTENT_CATEGORY_TYPES, "contentCategoryTypes"),
];

impl fmt::Display for PropertySubset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names().join(", "))
    }
}

/// Subsets applicable to `media_type`: the full power set minus any subset
/// touching a property irrelevant to that media type.
pub fn combinations_for(media_type: MediaType) -> Vec<PropertySubset> {
    let irrelevant = PropertySubset::irrelevant_to(media_type);
    let mut subsets = PropertySubset::combinations();
    subsets.retain(|subset| !subset.intersects(irrelevant));
    subsets
}
