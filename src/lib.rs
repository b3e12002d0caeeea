//! Find likely duplicates in a photo library by scoring how often items
//! agree on combinations of their metadata.

pub mod analysis;
pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod projector;
pub mod property;
pub mod remote;
pub mod scoring;
pub mod sync;

pub use analysis::{AnalysisOutcome, AnalysisRun, DuplicateAnalysis, RankedDuplicate, rank};
pub use cache::DiskCache;
pub use error::{AnalysisError, CacheError, RemoteError};
pub use model::MediaType;
pub use property::PropertySubset;
pub use scoring::{ScoreResponse, ScoringEngine};
