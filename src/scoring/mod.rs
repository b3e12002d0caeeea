//! Duplicate scoring: one grouping pass per property subset, run on a worker pool.

mod response;

pub use response::{MediaItemScore, ScoreResponse};

use crate::error::AnalysisError;
use crate::model::{ContentCategory, FlattenedRecord};
use crate::property::PropertySubset;
use chrono::{DateTime, Utc};
use indicatif::ProgressBar;
use rayon::prelude::*;
use response::ScoreAccumulator;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// One position of a grouping key.
///
/// `Unused` marks a property outside the active subset and never equals a
/// real value, including a record's own "no value".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Slot<T> {
    Unused,
    Used(T),
}

fn slot<T>(subset: PropertySubset, flag: PropertySubset, value: impl FnOnce() -> T) -> Slot<T> {
    if subset.contains(flag) {
        Slot::Used(value())
    } else {
        Slot::Unused
    }
}

/// Floats are compared by bit pattern, with both zeroes folded together.
fn f32_bits(value: f32) -> u32 {
    if value == 0.0 { 0 } else { value.to_bits() }
}

fn f64_bits(value: f64) -> u64 {
    if value == 0.0 { 0 } else { value.to_bits() }
}

#[derive(Debug, PartialEq, Eq, Hash)]
struct GroupKey<'a> {
    filename: Slot<&'a str>,
    mime_type: Slot<&'a str>,
    dimensions: Slot<(Option<&'a str>, Option<&'a str>)>,
    creation_time: Slot<DateTime<Utc>>,
    description: Slot<Option<&'a str>>,
    focal_length: Slot<Option<u32>>,
    aperture_f_number: Slot<Option<u32>>,
    iso_equivalent: Slot<Option<i32>>,
    exposure_time: Slot<Option<u32>>,
    fps: Slot<Option<u64>>,
    status: Slot<Option<&'a str>>,
    camera_make: Slot<Option<&'a str>>,
    camera_model: Slot<Option<&'a str>>,
    album_ids: Slot<&'a [String]>,
    content_category_types: Slot<&'a [ContentCategory]>,
}

impl<'a> GroupKey<'a> {
    fn new(record: &'a FlattenedRecord, subset: PropertySubset) -> Self {
        use PropertySubset as P;
        Self {
            filename: slot(subset, P::FILENAME, || record.filename.as_str()),
            mime_type: slot(subset, P::MIME_TYPE, || record.mime_type.as_str()),
            dimensions: slot(subset, P::DIMENSIONS, || {
                (record.height.as_deref(), record.width.as_deref())
            }),
            creation_time: slot(subset, P::CREATION_TIME, || record.creation_time),
            description: slot(subset, P::DESCRIPTION, || record.description.as_deref()),
            focal_length: slot(subset, P::FOCAL_LENGTH, || record.focal_length.map(f32_bits)),
            aperture_f_number: slot(subset, P::APERTURE_F_NUMBER, || {
                record.aperture_f_number.map(f32_bits)
            }),
            iso_equivalent: slot(subset, P::ISO_EQUIVALENT, || record.iso_equivalent),
            exposure_time: slot(subset, P::EXPOSURE_TIME, || record.exposure_time.map(f32_bits)),
            fps: slot(subset, P::FPS, || record.fps.map(f64_bits)),
            status: slot(subset, P::STATUS, || record.status.as_deref()),
            camera_make: slot(subset, P::CAMERA_MAKE, || record.camera_make.as_deref()),
            camera_model: slot(subset, P::CAMERA_MODEL, || record.camera_model.as_deref()),
            album_ids: slot(subset, P::ALBUM_IDS, || record.album_ids.as_slice()),
            content_category_types: slot(subset, P::CONTENT_CATEGORY_TYPES, || {
                record.content_category_types.as_slice()
            }),
        }
    }
}

/// Group `records` on the properties in `subset`, returning every cluster of two or more ids.
pub fn duplicate_clusters(records: &[FlattenedRecord], subset: PropertySubset) -> Vec<Vec<&str>> {
    let mut groups: HashMap<GroupKey<'_>, Vec<&str>> = HashMap::new();
    for record in records {
        groups
            .entry(GroupKey::new(record, subset))
            .or_default()
            .push(record.id.as_str());
    }
    groups.into_values().filter(|ids| ids.len() > 1).collect()
}

/// Build the bounded worker pool shared by library sync and scoring.
pub fn build_pool(workers: usize) -> Result<rayon::ThreadPool, AnalysisError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|i| format!("photodupes-{}", i))
        .build()?;
    Ok(pool)
}

pub struct ScoringEngine {
    pool: Arc<rayon::ThreadPool>,
    cancellation_token: Arc<AtomicBool>,
}

impl ScoringEngine {
    pub fn new(pool: Arc<rayon::ThreadPool>, cancellation_token: Arc<AtomicBool>) -> Self {
        Self {
            pool,
            cancellation_token,
        }
    }

    /// An engine on a fresh pool of `workers` threads.
    pub fn with_workers(
        workers: usize,
        cancellation_token: Arc<AtomicBool>,
    ) -> Result<Self, AnalysisError> {
        Ok(Self::new(Arc::new(build_pool(workers)?), cancellation_token))
    }

    pub fn cancel(&self) {
        self.cancellation_token.store(true, Ordering::Relaxed);
    }

    /// Score every subset against `records`.
    ///
    /// Cancellation is checked before each subset is dispatched; subsets
    /// already running finish, after which the partial result is dropped
    /// and [`AnalysisError::Cancelled`] is returned. Nothing is logged while
    /// `progress` may be drawing.
    pub fn score(
        &self,
        records: &[FlattenedRecord],
        subsets: &[PropertySubset],
        progress: &ProgressBar,
    ) -> Result<ScoreResponse, AnalysisError> {
        let accumulator = ScoreAccumulator::default();
        let completed = AtomicUsize::new(0);
        let total = subsets.len();

        let outcome = self.pool.install(|| {
            subsets.par_iter().try_for_each(|&subset| {
                if self.cancellation_token.load(Ordering::Relaxed) {
                    return Err(AnalysisError::Cancelled);
                }
                for cluster in duplicate_clusters(records, subset) {
                    accumulator.record_cluster(subset, &cluster);
                }
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                progress.inc(1);
                progress.set_message(format!("Iteration {} of {} completed, {}", done, total, subset));
                Ok(())
            })
        });

        outcome.map(|()| accumulator.into_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::photo;
    use crate::projector::project;
    use chrono::TimeZone;
    use std::collections::HashSet;

    fn engine() -> ScoringEngine {
        ScoringEngine::with_workers(2, Arc::new(AtomicBool::new(false))).unwrap()
    }

    fn record(id: &str, filename: &str) -> FlattenedRecord {
        project(&[photo(id, filename)], &[], &[]).unwrap().remove(0)
    }

    #[test]
    fn test_filename_only_cluster() {
        let mut a = record("a", "IMG_1.jpg");
        let mut b = record("b", "IMG_1.jpg");
        a.mime_type = "image/png".to_string();
        a.description = Some("first".to_string());
        a.creation_time = Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap();
        a.width = Some("1".to_string());
        a.iso_equivalent = Some(50);
        a.camera_make = Some("Canon".to_string());
        a.album_ids = vec!["x".to_string()];
        b.description = Some("second".to_string());
        b.focal_length = Some(50.0);
        b.content_category_types = vec![ContentCategory::Food];

        let records = vec![a, b];
        let clusters = duplicate_clusters(&records, PropertySubset::FILENAME);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 2);

        assert!(duplicate_clusters(&records, PropertySubset::FILENAME | PropertySubset::MIME_TYPE)
            .is_empty());
    }

    #[test]
    fn test_creation_time_cluster() {
        let a = record("a", "1.jpg");
        let b = record("b", "2.jpg");
        let mut c = record("c", "3.jpg");
        c.creation_time = Utc.with_ymd_and_hms(2022, 2, 2, 2, 2, 2).unwrap();

        let response = engine()
            .score(
                &[a, b, c],
                &[PropertySubset::CREATION_TIME],
                &ProgressBar::hidden(),
            )
            .unwrap();

        assert_eq!(response.scores().len(), 2);
        assert!(response.score("c").is_none());
        assert_eq!(response.subset_stats()[&PropertySubset::CREATION_TIME], 2);
        assert_eq!(response.total_clusters(), 1);
    }

    #[test]
    fn test_absent_value_is_not_unused() {
        // One record lacks a description, the other has one; neither the
        // absent value nor the unused marker may make them collide.
        let a = record("a", "same.jpg");
        let mut b = record("b", "same.jpg");
        b.description = Some(String::new());

        let records = vec![a, b];
        assert_eq!(duplicate_clusters(&records, PropertySubset::FILENAME).len(), 1);
        assert!(
            duplicate_clusters(&records, PropertySubset::FILENAME | PropertySubset::DESCRIPTION)
                .is_empty()
        );
    }

    #[test]
    fn test_signed_zero_floats_group_together() {
        let mut a = record("a", "1.jpg");
        let mut b = record("b", "2.jpg");
        a.exposure_time = Some(0.0);
        b.exposure_time = Some(-0.0);
        assert_eq!(
            duplicate_clusters(&[a, b], PropertySubset::EXPOSURE_TIME).len(),
            1
        );
    }

    #[test]
    fn test_scores_match_cluster_membership() {
        let mut records: Vec<FlattenedRecord> = (0..6)
            .map(|i| record(&format!("id{}", i), &format!("{}.jpg", i % 3)))
            .collect();
        records[4].camera_model = Some("Other".to_string());
        records[5].album_ids = vec!["album".to_string()];

        let subsets = PropertySubset::combinations_of(
            PropertySubset::FILENAME | PropertySubset::CAMERA_MODEL | PropertySubset::ALBUM_IDS,
        );
        let response = engine()
            .score(&records, &subsets, &ProgressBar::hidden())
            .unwrap();

        for record in &records {
            let matched: Vec<PropertySubset> = subsets
                .iter()
                .copied()
                .filter(|&subset| {
                    duplicate_clusters(&records, subset)
                        .iter()
                        .any(|cluster| cluster.contains(&record.id.as_str()))
                })
                .collect();
            match response.score(&record.id) {
                Some(score) => {
                    assert_eq!(score.count, matched.len());
                    let union = matched
                        .iter()
                        .fold(PropertySubset::empty(), |acc, s| acc | *s);
                    assert_eq!(score.property_matches, union);
                }
                None => assert!(matched.is_empty()),
            }
        }
    }

    #[test]
    fn test_cancelled_run_discards_results() {
        let engine = engine();
        engine.cancel();
        let records = vec![record("a", "x.jpg"), record("b", "x.jpg")];

        let result = engine.score(
            &records,
            &PropertySubset::combinations(),
            &ProgressBar::hidden(),
        );
        assert!(matches!(result, Err(AnalysisError::Cancelled)));
    }

    #[test]
    fn test_cancel_mid_run() {
        let token = Arc::new(AtomicBool::new(false));
        let engine = ScoringEngine::with_workers(2, token.clone()).unwrap();
        let records: Vec<FlattenedRecord> = (0..50)
            .map(|i| record(&format!("id{}", i), &format!("{}.jpg", i % 5)))
            .collect();
        let subsets = PropertySubset::combinations();
        let progress = ProgressBar::hidden();

        let result = std::thread::scope(|s| {
            let run = s.spawn(|| engine.score(&records, &subsets, &progress));
            while progress.position() < 10 {
                std::thread::yield_now();
            }
            token.store(true, Ordering::Relaxed);
            run.join().unwrap()
        });

        assert!(matches!(result, Err(AnalysisError::Cancelled)));
        assert!(progress.position() >= 10);
        assert!(progress.position() < subsets.len() as u64);
    }

    #[test]
    fn test_every_subset_reported() {
        let records = vec![record("a", "x.jpg"), record("b", "y.jpg")];
        let subsets = PropertySubset::combinations_of(
            PropertySubset::FILENAME | PropertySubset::MIME_TYPE,
        );
        let progress = ProgressBar::hidden();
        let response = engine().score(&records, &subsets, &progress).unwrap();

        assert_eq!(progress.position(), 3);
        // mime type alone matches; the filename subsets do not
        let stats: HashSet<_> = response.subset_stats().keys().copied().collect();
        assert_eq!(stats, HashSet::from([PropertySubset::MIME_TYPE]));
    }
}
