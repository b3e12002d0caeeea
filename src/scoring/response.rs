use crate::property::PropertySubset;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// How often a media item landed in a duplicate cluster, and on which properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItemScore {
    /// Number of subsets for which the item was part of a cluster.
    pub count: usize,
    /// Union of every subset that produced a match.
    pub property_matches: PropertySubset,
}

impl fmt::Display for MediaItemScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.count, self.property_matches)
    }
}

/// Shared state every worker folds its clusters into during one engine run.
#[derive(Debug, Default)]
pub(crate) struct ScoreAccumulator {
    per_item: DashMap<String, MediaItemScore>,
    per_subset: DashMap<PropertySubset, usize>,
    clusters: DashMap<PropertySubset, usize>,
}

impl ScoreAccumulator {
    /// Fold one duplicate cluster found under `subset`.
    pub(crate) fn record_cluster(&self, subset: PropertySubset, ids: &[&str]) {
        for id in ids {
            self.per_item
                .entry((*id).to_string())
                .and_modify(|score| {
                    score.count += 1;
                    score.property_matches |= subset;
                })
                .or_insert(MediaItemScore {
                    count: 1,
                    property_matches: subset,
                });
        }
        // last cluster recorded for the subset wins
        self.per_subset.insert(subset, ids.len());
        *self.clusters.entry(subset).or_insert(0) += 1;
    }

    pub(crate) fn into_response(self) -> ScoreResponse {
        ScoreResponse {
            scores: self.per_item.into_iter().collect(),
            subset_stats: self.per_subset.into_iter().collect(),
            cluster_counts: self.clusters.into_iter().collect(),
        }
    }
}

/// Result of a completed scoring run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreResponse {
    scores: HashMap<String, MediaItemScore>,
    subset_stats: HashMap<PropertySubset, usize>,
    #[serde(default)]
    cluster_counts: HashMap<PropertySubset, usize>,
}

impl ScoreResponse {
    /// Per media item id: match count and matched properties.
    pub fn scores(&self) -> &HashMap<String, MediaItemScore> {
        &self.scores
    }

    pub fn score(&self, id: &str) -> Option<&MediaItemScore> {
        self.scores.get(id)
    }

    /// Per subset: size of the last duplicate cluster recorded for it.
    ///
    /// A summary figure only; see [`ScoreResponse::cluster_counts`] for how
    /// many clusters each subset produced.
    pub fn subset_stats(&self) -> &HashMap<PropertySubset, usize> {
        &self.subset_stats
    }

    /// Per subset: number of duplicate clusters found.
    pub fn cluster_counts(&self) -> &HashMap<PropertySubset, usize> {
        &self.cluster_counts
    }

    pub fn total_clusters(&self) -> usize {
        self.cluster_counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}
