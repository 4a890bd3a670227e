//! Per-stratum diversity scoring and enforcement.

use std::collections::BTreeMap;

use ndarray::Axis;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::CurationError;
use crate::integrity::digest::derive_seed;
use crate::storage::{Archetype, CandidateRecord};

use super::clustering::{cluster_sizes, kmeans_clusters, threshold_clusters, ClusteringMethod};
use super::metrics::{gini_coefficient, normalized_entropy, shannon_entropy};
use super::tfidf::{TfidfDocument, TfidfVectorizer, DEFAULT_MAX_DF, DEFAULT_MIN_DF};

/// Diversity parameters and thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiversityConfig {
    pub method: ClusteringMethod,
    /// Cosine similarity at which the threshold method joins two items.
    pub min_similarity: f64,
    /// Cluster count for k-means, capped at the stratum size.
    pub k: usize,
    pub max_iterations: usize,
    /// Minimum clusters per stratum (`C_min`).
    pub min_clusters: usize,
    /// Minimum Shannon entropy per stratum (`H_min`).
    pub min_entropy: f64,
    pub min_df: usize,
    pub max_df: f64,
    /// Advisory floor for normalized archetype entropy.
    pub archetype_balance_threshold: f64,
}

impl Default for DiversityConfig {
    fn default() -> Self {
        Self {
            method: ClusteringMethod::Threshold,
            min_similarity: 0.9,
            k: 3,
            max_iterations: 100,
            min_clusters: 2,
            min_entropy: 0.5,
            min_df: DEFAULT_MIN_DF,
            max_df: DEFAULT_MAX_DF,
            archetype_balance_threshold: 0.97,
        }
    }
}

impl DiversityConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.min_similarity) {
            return Err(format!(
                "min_similarity must be in [0, 1], got {}",
                self.min_similarity
            ));
        }
        if !(0.0..=1.0).contains(&self.max_df) || self.max_df == 0.0 {
            return Err(format!("max_df must be in (0, 1], got {}", self.max_df));
        }
        if self.min_entropy < 0.0 {
            return Err("min_entropy must not be negative".to_string());
        }
        if self.method == ClusteringMethod::Kmeans && self.k == 0 {
            return Err("k must be positive for kmeans clustering".to_string());
        }
        Ok(())
    }
}

/// Diversity scores of one stratum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StratumDiversity {
    pub items: usize,
    pub cluster_count: usize,
    pub cluster_sizes: Vec<usize>,
    pub entropy: f64,
    pub normalized_entropy: f64,
    pub gini: f64,
    /// Final id -> cluster label.
    pub assignments: BTreeMap<String, usize>,
    pub clusters_pass: bool,
    pub entropy_pass: bool,
    pub pass: bool,
}

/// Spread of items over archetypes across the whole dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchetypeBalance {
    pub counts: BTreeMap<String, usize>,
    pub entropy: f64,
    pub normalized_entropy: f64,
    pub threshold: f64,
    pub pass: bool,
}

/// Report written as `diversity_report.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiversityReport {
    pub method: ClusteringMethod,
    pub min_similarity: f64,
    pub k: usize,
    pub min_clusters: usize,
    pub min_entropy: f64,
    pub min_df: usize,
    pub max_df: f64,
    pub vocabulary_size: usize,
    pub strata: BTreeMap<String, StratumDiversity>,
    pub archetype_balance: ArchetypeBalance,
    pub pass: bool,
}

impl DiversityReport {
    /// Turns the first failing stratum into `DIV_C_ERR` or `DIV_H_ERR`.
    ///
    /// Strata are checked in canonical order; within a stratum the cluster
    /// count is checked before entropy. Without `enforce` failures are only
    /// logged.
    pub fn check(&self, enforce: bool) -> Result<(), CurationError> {
        if !self.archetype_balance.pass {
            warn!(
                normalized_entropy = self.archetype_balance.normalized_entropy,
                threshold = self.archetype_balance.threshold,
                "Archetype balance below threshold (advisory)"
            );
        }

        for (stratum, scores) in &self.strata {
            let error = if !scores.clusters_pass {
                CurationError::TooFewClusters {
                    stratum: stratum.clone(),
                    clusters: scores.cluster_count,
                    min: self.min_clusters,
                }
            } else if !scores.entropy_pass {
                CurationError::EntropyTooLow {
                    stratum: stratum.clone(),
                    entropy: scores.entropy,
                    min: self.min_entropy,
                }
            } else {
                continue;
            };

            if enforce {
                return Err(error);
            }
            warn!(stratum = %stratum, error = %error, "Diversity check failed (advisory)");
        }
        Ok(())
    }
}

/// Scores diversity over the final items.
#[derive(Debug, Clone)]
pub struct DiversityEngine {
    config: DiversityConfig,
    seed: u64,
}

impl DiversityEngine {
    /// # Arguments
    ///
    /// * `config` - Clustering method and thresholds.
    /// * `seed` - Diversity sub-seed; only k-means consumes it.
    pub fn new(config: DiversityConfig, seed: u64) -> Self {
        Self { config, seed }
    }

    pub fn config(&self) -> &DiversityConfig {
        &self.config
    }

    /// Vectorizes the whole corpus, clusters each stratum and scores it.
    ///
    /// Items are identified by `slot_id`, which is the final id after top-up.
    pub fn score(&self, records: &[CandidateRecord]) -> DiversityReport {
        let keys: Vec<String> = records.iter().map(|r| r.stratum_key()).collect();
        let docs: Vec<TfidfDocument<'_>> = records
            .iter()
            .zip(&keys)
            .map(|(r, key)| TfidfDocument {
                text: &r.spec,
                stratum: key,
            })
            .collect();

        let tfidf =
            TfidfVectorizer::new(self.config.min_df, self.config.max_df).fit_transform(&docs);

        let mut by_stratum: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (idx, key) in keys.iter().enumerate() {
            by_stratum.entry(key.as_str()).or_default().push(idx);
        }

        let mut strata = BTreeMap::new();
        for (key, indices) in by_stratum {
            let vectors = tfidf.matrix.select(Axis(0), &indices);
            let labels = match self.config.method {
                ClusteringMethod::Threshold => {
                    threshold_clusters(&vectors, self.config.min_similarity)
                }
                ClusteringMethod::Kmeans => kmeans_clusters(
                    &vectors,
                    self.config.k,
                    self.config.max_iterations,
                    derive_seed(self.seed, key),
                ),
            };
            strata.insert(key.to_string(), self.score_stratum(records, &indices, &labels));
        }

        let archetype_balance = self.archetype_balance(records);
        let pass = strata.values().all(|s: &StratumDiversity| s.pass);

        info!(
            strata = strata.len(),
            vocabulary = tfidf.vocabulary.len(),
            pass,
            archetype_balance = archetype_balance.normalized_entropy,
            "Diversity scored"
        );

        DiversityReport {
            method: self.config.method,
            min_similarity: self.config.min_similarity,
            k: self.config.k,
            min_clusters: self.config.min_clusters,
            min_entropy: self.config.min_entropy,
            min_df: self.config.min_df,
            max_df: self.config.max_df,
            vocabulary_size: tfidf.vocabulary.len(),
            strata,
            archetype_balance,
            pass,
        }
    }

    fn score_stratum(
        &self,
        records: &[CandidateRecord],
        indices: &[usize],
        labels: &[usize],
    ) -> StratumDiversity {
        let sizes = cluster_sizes(labels);
        let entropy = shannon_entropy(&sizes);
        let clusters_pass = sizes.len() >= self.config.min_clusters;
        let entropy_pass = entropy >= self.config.min_entropy;

        StratumDiversity {
            items: indices.len(),
            cluster_count: sizes.len(),
            entropy,
            normalized_entropy: normalized_entropy(&sizes),
            gini: gini_coefficient(&sizes),
            assignments: indices
                .iter()
                .zip(labels)
                .map(|(&i, &label)| (records[i].slot_id.clone(), label))
                .collect(),
            cluster_sizes: sizes,
            clusters_pass,
            entropy_pass,
            pass: clusters_pass && entropy_pass,
        }
    }

    fn archetype_balance(&self, records: &[CandidateRecord]) -> ArchetypeBalance {
        let counts: BTreeMap<String, usize> = Archetype::ALL
            .iter()
            .map(|a| {
                let count = records.iter().filter(|r| r.archetype == *a).count();
                (a.to_string(), count)
            })
            .collect();
        let values: Vec<usize> = counts.values().copied().collect();
        let normalized = normalized_entropy(&values);
        ArchetypeBalance {
            entropy: shannon_entropy(&values),
            normalized_entropy: normalized,
            threshold: self.config.archetype_balance_threshold,
            pass: normalized >= self.config.archetype_balance_threshold,
            counts,
        }
    }
}
