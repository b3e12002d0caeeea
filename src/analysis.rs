//! Duplicate analysis entry point: sync, project, score, rank.

use crate::cache::DiskCache;
use crate::error::AnalysisError;
use crate::model::{FlattenedRecord, MediaType};
use crate::property::{PropertySubset, combinations_for};
use crate::remote::RemoteLibrary;
use crate::scoring::{ScoreResponse, ScoringEngine};
use crate::sync::{self, Library};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::ThreadPool;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

pub const DEFAULT_RANK_LIMIT: usize = 250;

pub fn score_response_key(media_type: MediaType) -> String {
    format!("score_response_{}.json", media_type)
}

/// A finished analysis.
#[derive(Debug)]
pub struct AnalysisRun {
    pub response: ScoreResponse,
    pub library: Library,
    pub from_cache: bool,
    /// Records and subsets the engine ran (or would have run) over.
    pub records: usize,
    pub subsets: usize,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub enum AnalysisOutcome {
    Completed(Box<AnalysisRun>),
    /// Aborted by the cancellation token; nothing was cached.
    Cancelled,
}

pub struct DuplicateAnalysis<'a> {
    cache: &'a DiskCache,
    remote: &'a dyn RemoteLibrary,
    pool: Arc<ThreadPool>,
    cancellation_token: Arc<AtomicBool>,
    show_progress: bool,
}

impl<'a> DuplicateAnalysis<'a> {
    pub fn new(
        cache: &'a DiskCache,
        remote: &'a dyn RemoteLibrary,
        pool: Arc<ThreadPool>,
        cancellation_token: Arc<AtomicBool>,
    ) -> Self {
        Self {
            cache,
            remote,
            pool,
            cancellation_token,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Synchronise the library and score it for duplicates of `media_type`.
    ///
    /// The score is cached per media type; `skip_cache` refreshes both the
    /// library listings and the score.
    pub fn run(&self, media_type: MediaType, skip_cache: bool) -> Result<AnalysisOutcome, AnalysisError> {
        let start = Instant::now();
        let library = sync::synchronize(self.cache, self.remote, &self.pool, skip_cache)?;

        let mut records = library.project()?;
        records.retain(|record| media_type.matches_mime(&record.mime_type));
        let subsets = combinations_for(media_type);
        log::info!(
            "Now processing {} records against {} property combinations.",
            records.len(),
            subsets.len()
        );

        let key = score_response_key(media_type);
        let result = self
            .cache
            .get(&key, skip_cache, || {
                let progress = self.progress_bar(subsets.len() as u64);
                self.score(&records, &subsets, &progress)
            });

        match result {
            Ok((response, from_cache)) => Ok(AnalysisOutcome::Completed(Box::new(AnalysisRun {
                response,
                library,
                from_cache,
                records: records.len(),
                subsets: subsets.len(),
                elapsed: start.elapsed(),
            }))),
            Err(AnalysisError::Cancelled) => Ok(AnalysisOutcome::Cancelled),
            Err(err) => Err(err),
        }
    }

    /// Run the engine under `progress`, closing the bar before anything is logged.
    fn score(
        &self,
        records: &[FlattenedRecord],
        subsets: &[PropertySubset],
        progress: &ProgressBar,
    ) -> Result<ScoreResponse, AnalysisError> {
        let engine = ScoringEngine::new(self.pool.clone(), self.cancellation_token.clone());
        let result = engine.score(records, subsets, progress);
        match &result {
            Ok(response) => progress.finish_with_message(format!(
                "{} duplicate clusters found",
                response.total_clusters()
            )),
            Err(err) => {
                progress.abandon_with_message("Cancelled");
                log::info!(
                    "Scoring stopped after {} of {} subsets: {}",
                    progress.position(),
                    subsets.len(),
                    err
                );
            }
        }
        result
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {bar:40.yellow/blue} {pos}/{len} (eta {eta}) {msg}",
        ) {
            bar.set_style(style.progress_chars("─▓ "));
        }
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    }
}

/// One row of the duplicate report.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedDuplicate {
    pub id: String,
    pub filename: String,
    pub count: usize,
    pub property_matches: PropertySubset,
    /// What a person could search for to find the duplicates.
    pub hint: String,
    pub product_url: Option<String>,
}

/// Order scored items by match count, highest first, keeping at most `limit`.
///
/// Every scored id must resolve in `library`; one that does not means the
/// score and library are out of step and the report is abandoned.
pub fn rank(
    response: &ScoreResponse,
    library: &Library,
    limit: usize,
) -> Result<Vec<RankedDuplicate>, AnalysisError> {
    let mut ranked = response
        .scores()
        .iter()
        .map(|(id, score)| {
            let item = library
                .get(id)
                .ok_or_else(|| AnalysisError::MissingItem { id: id.clone() })?;

            let mut query = Vec::new();
            if score.property_matches.contains(PropertySubset::FILENAME) {
                query.push(item.filename.clone());
            }
            if score.property_matches.contains(PropertySubset::CREATION_TIME) {
                query.push(item.media_metadata.creation_time.format("%Y-%m-%d").to_string());
            }
            let hint = if query.is_empty() {
                "??how to identify??".to_string()
            } else {
                query.join(", ")
            };

            Ok(RankedDuplicate {
                id: id.clone(),
                filename: item.filename.clone(),
                count: score.count,
                property_matches: score.property_matches,
                hint,
                product_url: item.product_url.clone(),
            })
        })
        .collect::<Result<Vec<_>, AnalysisError>>()?;

    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.id.cmp(&b.id)));
    ranked.truncate(limit);
    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::model::fixtures::{photo, video};
    use crate::model::{Album, ContentCategory, MediaItem};
    use crate::remote::{LibrarySnapshot, MediaItemStream, SnapshotLibrary};
    use crate::scoring::build_pool;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Counts listing calls made against the wrapped library.
    struct CountingLibrary {
        inner: SnapshotLibrary,
        calls: AtomicUsize,
    }

    impl CountingLibrary {
        fn new(snapshot: LibrarySnapshot) -> Self {
            Self {
                inner: SnapshotLibrary::new(snapshot),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn tick(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl RemoteLibrary for CountingLibrary {
        fn list_albums(&self) -> Result<Vec<Album>, RemoteError> {
            self.tick();
            self.inner.list_albums()
        }

        fn list_media_items(&self) -> MediaItemStream<'_> {
            self.tick();
            self.inner.list_media_items()
        }

        fn list_media_items_by_album(&self, album_id: &str) -> MediaItemStream<'_> {
            self.tick();
            self.inner.list_media_items_by_album(album_id)
        }

        fn list_media_items_by_category(
            &self,
            category: ContentCategory,
        ) -> Result<Vec<MediaItem>, RemoteError> {
            self.tick();
            self.inner.list_media_items_by_category(category)
        }

        fn get_media_item_by_id(&self, id: &str) -> Result<Option<MediaItem>, RemoteError> {
            self.tick();
            self.inner.get_media_item_by_id(id)
        }
    }

    fn snapshot() -> LibrarySnapshot {
        let mut copy = photo("p2", "IMG_1.jpg");
        copy.product_url = Some("https://photos.example/p2".to_string());
        let mut other = photo("p3", "IMG_2.jpg");
        other.media_metadata.photo.as_mut().unwrap().iso_equivalent = Some(800);

        LibrarySnapshot {
            albums: vec![Album {
                id: "al1".to_string(),
                title: "Trip".to_string(),
                product_url: None,
                media_items_count: 1,
            }],
            media_items: vec![
                photo("p1", "IMG_1.jpg"),
                copy,
                other,
                video("v1", "VID_1.mp4"),
                video("v2", "VID_1.mp4"),
            ],
            album_items: HashMap::from([("al1".to_string(), vec!["p1".to_string()])]),
            category_items: HashMap::new(),
            unlisted_items: Vec::new(),
        }
    }

    fn analysis<'a>(cache: &'a DiskCache, remote: &'a dyn RemoteLibrary) -> DuplicateAnalysis<'a> {
        DuplicateAnalysis::new(
            cache,
            remote,
            Arc::new(build_pool(2).unwrap()),
            Arc::new(AtomicBool::new(false)),
        )
    }

    fn completed(outcome: AnalysisOutcome) -> AnalysisRun {
        match outcome {
            AnalysisOutcome::Completed(run) => *run,
            AnalysisOutcome::Cancelled => panic!("analysis was cancelled"),
        }
    }

    #[test]
    fn test_photo_analysis_end_to_end() {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskCache::new(temp_dir.path()).unwrap();
        let remote = CountingLibrary::new(snapshot());

        let run = completed(analysis(&cache, &remote).run(MediaType::Photo, false).unwrap());
        assert!(!run.from_cache);
        assert_eq!(run.records, 3);
        assert_eq!(run.subsets, (1 << 13) - 1);

        // videos are filtered out of a photo run
        assert!(run.response.score("v1").is_none());
        let p1 = run.response.score("p1").unwrap();
        assert!(p1.property_matches.contains(PropertySubset::FILENAME));
        assert!(!p1.property_matches.intersects(PropertySubset::VIDEO_ONLY));
        // p1 and p2 share a filename but only p1 sits in the album
        assert!(run.response.subset_stats().contains_key(&PropertySubset::FILENAME));
        assert!(!run
            .response
            .subset_stats()
            .contains_key(&(PropertySubset::FILENAME | PropertySubset::ALBUM_IDS)));

        let ranked = rank(&run.response, &run.library, DEFAULT_RANK_LIMIT).unwrap();
        assert_eq!(ranked.len(), run.response.scores().len());
        assert!(ranked.windows(2).all(|w| w[0].count >= w[1].count));
        let top_p2 = ranked.iter().find(|r| r.id == "p2").unwrap();
        assert!(top_p2.hint.contains("IMG_1.jpg"));
        assert_eq!(top_p2.product_url.as_deref(), Some("https://photos.example/p2"));
    }

    #[test]
    fn test_second_run_is_cached() {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskCache::new(temp_dir.path()).unwrap();
        let remote = CountingLibrary::new(snapshot());

        let first = completed(analysis(&cache, &remote).run(MediaType::Video, false).unwrap());
        let calls = remote.calls();
        assert!(calls > 0);
        assert!(temp_dir.path().join(score_response_key(MediaType::Video)).exists());

        let second = completed(analysis(&cache, &remote).run(MediaType::Video, false).unwrap());
        assert!(second.from_cache);
        assert_eq!(second.response, first.response);
        assert_eq!(remote.calls(), calls);

        let third = completed(analysis(&cache, &remote).run(MediaType::Video, true).unwrap());
        assert!(!third.from_cache);
        assert!(remote.calls() > calls);
    }

    #[test]
    fn test_cancelled_run_caches_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskCache::new(temp_dir.path()).unwrap();
        let remote = CountingLibrary::new(snapshot());
        let token = Arc::new(AtomicBool::new(true));
        let analysis = DuplicateAnalysis::new(
            &cache,
            &remote,
            Arc::new(build_pool(2).unwrap()),
            token,
        );

        let outcome = analysis.run(MediaType::All, false).unwrap();
        assert!(matches!(outcome, AnalysisOutcome::Cancelled));
        assert!(!temp_dir.path().join(score_response_key(MediaType::All)).exists());
    }

    #[test]
    fn test_progress_bar_closed_when_scoring_returns() {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskCache::new(temp_dir.path()).unwrap();
        let remote = CountingLibrary::new(snapshot());
        let records = crate::sync::synchronize(
            &cache,
            &remote,
            &build_pool(1).unwrap(),
            false,
        )
        .unwrap()
        .project()
        .unwrap();
        let subsets = PropertySubset::combinations_of(
            PropertySubset::FILENAME | PropertySubset::MIME_TYPE,
        );

        let finished = ProgressBar::hidden();
        analysis(&cache, &remote)
            .score(&records, &subsets, &finished)
            .unwrap();
        assert!(finished.is_finished());
        assert_eq!(finished.position(), subsets.len() as u64);

        let token = Arc::new(AtomicBool::new(true));
        let cancelled = DuplicateAnalysis::new(
            &cache,
            &remote,
            Arc::new(build_pool(1).unwrap()),
            token,
        );
        let abandoned = ProgressBar::hidden();
        let result = cancelled.score(&records, &subsets, &abandoned);
        assert!(matches!(result, Err(AnalysisError::Cancelled)));
        assert!(abandoned.is_finished());
    }

    #[test]
    fn test_rank_rejects_unknown_ids() {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskCache::new(temp_dir.path()).unwrap();
        let remote = CountingLibrary::new(snapshot());
        let run = completed(analysis(&cache, &remote).run(MediaType::Video, false).unwrap());

        let empty = crate::sync::Library::default();
        let err = rank(&run.response, &empty, DEFAULT_RANK_LIMIT).unwrap_err();
        assert!(matches!(err, AnalysisError::MissingItem { .. }));
    }

    #[test]
    fn test_rank_limit_and_hint() {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskCache::new(temp_dir.path()).unwrap();
        let remote = CountingLibrary::new(snapshot());
        let run = completed(analysis(&cache, &remote).run(MediaType::Video, false).unwrap());

        let ranked = rank(&run.response, &run.library, 1).unwrap();
        assert_eq!(ranked.len(), 1);
        // both videos share every property, so filename and date both show up
        assert_eq!(ranked[0].hint, "VID_1.mp4, 2021-01-01");
        assert_eq!(ranked[0].count, (1 << 11) - 1);
    }
}
