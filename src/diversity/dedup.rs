//! Near-duplicate removal and surplus trimming for candidate specs.
//!
//! Provides the keep/drop policy applied to each near-duplicate group found by
//! the similarity engine, followed by per-stratum trimming to the replication
//! target.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::storage::{by_order_key, canonical_order, CandidateRecord, RecordStatus};

use super::minhash::{MinHasher, NearDuplicateGroup, SimilarityConfig, SimilarityIndex};

/// Default number of items kept per stratum.
pub const DEFAULT_REPLICATION: usize = 5;

/// Why a record left the kept set during dedup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DropReason {
    DedupDrop,
    SurplusTrim,
}

/// A record dropped as a near-duplicate of a kept record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropDecision {
    pub dropped_id: String,
    pub kept_id: String,
    pub stratum: String,
    pub similarity: f64,
    pub reason: DropReason,
}

/// A record trimmed because its stratum held more than the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrimDecision {
    pub trimmed_id: String,
    pub stratum: String,
    pub reason: DropReason,
}

/// Summary of one near-duplicate group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub members: Vec<String>,
    pub kept: Vec<String>,
    pub dropped: Vec<String>,
}

/// Report written as `dedup_report.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupReport {
    pub threshold: f64,
    pub num_perm: usize,
    pub bands: usize,
    pub shingle_width: usize,
    pub replication: usize,
    pub candidates_total: usize,
    pub candidate_pairs: usize,
    pub groups: Vec<GroupSummary>,
    pub drops: Vec<DropDecision>,
    pub surplus: Vec<TrimDecision>,
    pub kept_total: usize,
    pub kept_per_stratum: BTreeMap<String, usize>,
}

impl DedupReport {
    /// Returns the deduplication ratio (near-duplicate drops / total).
    pub fn dedup_ratio(&self) -> f64 {
        if self.candidates_total == 0 {
            return 0.0;
        }
        self.drops.len() as f64 / self.candidates_total as f64
    }

    /// Returns the retention ratio (kept / total).
    pub fn retention_ratio(&self) -> f64 {
        if self.candidates_total == 0 {
            return 1.0;
        }
        self.kept_total as f64 / self.candidates_total as f64
    }
}

/// Result of a dedup pass.
#[derive(Debug, Clone)]
pub struct DedupOutcome {
    /// Survivors, in canonical order, with status `kept`.
    pub kept: Vec<CandidateRecord>,
    /// Near-duplicate drops and surplus trims, in canonical order.
    pub removed: Vec<CandidateRecord>,
    pub report: DedupReport,
}

/// Deterministic keep/drop controller.
///
/// Within a group the member with the lowest ordering key (seq, then id) is
/// always kept. Every other member is dropped against the most similar kept
/// member if that similarity reaches the threshold; members only linked
/// transitively stay, so no kept pair is ever a near-duplicate.
#[derive(Debug, Clone)]
pub struct DedupController {
    config: SimilarityConfig,
    replication: usize,
    hasher: MinHasher,
}

impl DedupController {
    /// Creates a controller.
    ///
    /// # Arguments
    ///
    /// * `config` - Similarity parameters (threshold, signature shape).
    /// * `replication` - Items kept per stratum after trimming.
    /// * `seed` - Similarity sub-seed for the MinHash family.
    pub fn new(config: SimilarityConfig, replication: usize, seed: u64) -> Self {
        let hasher = MinHasher::from_config(&config, seed);
        Self {
            config,
            replication,
            hasher,
        }
    }

    pub fn hasher(&self) -> &MinHasher {
        &self.hasher
    }

    /// Deduplicates `records` and trims each stratum to the replication target.
    pub fn dedup(&self, records: &[CandidateRecord]) -> DedupOutcome {
        let index = SimilarityIndex::build(&self.hasher, self.config.bands, records);
        let candidate_pairs = index.candidate_pairs().len();
        let groups = index.cluster(records, self.config.threshold);

        let mut dropped: HashSet<usize> = HashSet::new();
        let mut drops = Vec::new();
        let mut summaries = Vec::with_capacity(groups.len());

        for group in &groups {
            let (kept, group_drops) = self.resolve_group(records, &index, group);
            for decision in &group_drops {
                debug!(
                    dropped = %records[decision.0].candidate_id,
                    kept = %records[decision.1].candidate_id,
                    similarity = decision.2,
                    "DEDUP_DROP"
                );
            }
            summaries.push(GroupSummary {
                members: ids(records, &group.members),
                kept: ids(records, &kept),
                dropped: group_drops
                    .iter()
                    .map(|d| records[d.0].candidate_id.clone())
                    .collect(),
            });
            for (drop_idx, kept_idx, similarity) in group_drops {
                dropped.insert(drop_idx);
                drops.push(DropDecision {
                    dropped_id: records[drop_idx].candidate_id.clone(),
                    kept_id: records[kept_idx].candidate_id.clone(),
                    stratum: records[drop_idx].stratum_key(),
                    similarity,
                    reason: DropReason::DedupDrop,
                });
            }
        }
        drops.sort_by(|a, b| {
            a.stratum
                .cmp(&b.stratum)
                .then_with(|| a.dropped_id.cmp(&b.dropped_id))
        });

        // Surplus trimming per stratum, lowest ordering keys survive.
        let mut by_stratum: BTreeMap<String, Vec<&CandidateRecord>> = BTreeMap::new();
        for (idx, record) in records.iter().enumerate() {
            if !dropped.contains(&idx) {
                by_stratum.entry(record.stratum_key()).or_default().push(record);
            }
        }

        let mut kept = Vec::new();
        let mut removed: Vec<CandidateRecord> = dropped
            .iter()
            .map(|&idx| records[idx].with_status(RecordStatus::Dropped))
            .collect();
        let mut surplus = Vec::new();
        let mut kept_per_stratum = BTreeMap::new();

        for (stratum, mut members) in by_stratum {
            members.sort_by(|a, b| by_order_key(a, b));
            for (pos, record) in members.iter().enumerate() {
                if pos < self.replication {
                    kept.push(record.with_status(RecordStatus::Kept));
                } else {
                    debug!(trimmed = %record.candidate_id, stratum = %stratum, "SURPLUS_TRIM");
                    surplus.push(TrimDecision {
                        trimmed_id: record.candidate_id.clone(),
                        stratum: stratum.clone(),
                        reason: DropReason::SurplusTrim,
                    });
                    removed.push(record.with_status(RecordStatus::Trimmed));
                }
            }
            kept_per_stratum.insert(stratum, members.len().min(self.replication));
        }
        kept.sort_by(canonical_order);
        removed.sort_by(canonical_order);

        let report = DedupReport {
            threshold: self.config.threshold,
            num_perm: self.config.num_perm,
            bands: self.config.bands,
            shingle_width: self.config.shingle_width,
            replication: self.replication,
            candidates_total: records.len(),
            candidate_pairs,
            groups: summaries,
            drops,
            surplus,
            kept_total: kept.len(),
            kept_per_stratum,
        };
        info!(
            candidates = report.candidates_total,
            groups = report.groups.len(),
            dropped = report.drops.len(),
            trimmed = report.surplus.len(),
            kept = report.kept_total,
            dedup_ratio = report.dedup_ratio(),
            retention_ratio = report.retention_ratio(),
            "Dedup complete"
        );

        DedupOutcome {
            kept,
            removed,
            report,
        }
    }

    /// Applies the keep policy to one group.
    ///
    /// Returns the kept members and `(dropped, kept, similarity)` triples.
    fn resolve_group(
        &self,
        records: &[CandidateRecord],
        index: &SimilarityIndex,
        group: &NearDuplicateGroup,
    ) -> (Vec<usize>, Vec<(usize, usize, f64)>) {
        let mut kept: Vec<usize> = Vec::new();
        let mut drops = Vec::new();

        for &member in &group.members {
            let closest = kept
                .iter()
                .map(|&k| (k, index.similarity(member, k)))
                .fold(None, |best: Option<(usize, f64)>, (k, sim)| match best {
                    Some((_, best_sim)) if best_sim >= sim => best,
                    _ => Some((k, sim)),
                });

            match closest {
                Some((kept_idx, sim)) if sim >= self.config.threshold => {
                    drops.push((member, kept_idx, sim));
                }
                _ => kept.push(member),
            }
        }
        debug_assert!(kept
            .windows(2)
            .all(|w| records[w[0]].order_key() <= records[w[1]].order_key()));
        (kept, drops)
    }
}

fn ids(records: &[CandidateRecord], indices: &[usize]) -> Vec<String> {
    indices
        .iter()
        .map(|&i| records[i].candidate_id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bands::Band;
    use crate::storage::{Archetype, Complexity};

    fn words(prefix: &str, n: usize) -> String {
        (0..n)
            .map(|i| format!("{}{}", prefix, i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn record(archetype: Archetype, seq: u32, text: String) -> CandidateRecord {
        let id = format!("{}_{:03}", archetype, seq);
        CandidateRecord {
            candidate_id: id.clone(),
            slot_id: id,
            archetype,
            complexity: Complexity::Mvp,
            locale: "en".to_string(),
            platform: "replit".to_string(),
            rep: 1,
            seq,
            spec: text,
            token_count: 700,
            length_band: Band::Standard,
            status: RecordStatus::Valid,
        }
    }

    fn controller() -> DedupController {
        DedupController::new(SimilarityConfig::default(), 5, 2025)
    }

    #[test]
    fn test_blog_stratum_keeps_lowest_seq_and_trims_surplus() {
        // seq 2 and 5 are near-duplicates; seq 1..7 otherwise distinct.
        let shared = words("shared", 300);
        let records: Vec<CandidateRecord> = (1..=7)
            .map(|seq| {
                let text = match seq {
                    2 => shared.clone(),
                    5 => format!("{} one more line", shared),
                    _ => words(&format!("s{}x", seq), 300),
                };
                record(Archetype::Blog, seq, text)
            })
            .collect();

        let outcome = controller().dedup(&records);
        let report = &outcome.report;

        assert_eq!(report.drops.len(), 1);
        assert_eq!(report.drops[0].dropped_id, "blog_005");
        assert_eq!(report.drops[0].kept_id, "blog_002");
        assert_eq!(report.drops[0].reason, DropReason::DedupDrop);
        assert!(report.drops[0].similarity >= 0.85);

        let kept: Vec<u32> = outcome.kept.iter().map(|r| r.seq).collect();
        assert_eq!(kept, vec![1, 2, 3, 4, 6]);
        assert_eq!(report.surplus.len(), 1);
        assert_eq!(report.surplus[0].trimmed_id, "blog_007");
        assert_eq!(report.kept_per_stratum["blog_MVP_en"], 5);
        assert!(outcome
            .kept
            .iter()
            .all(|r| r.status == RecordStatus::Kept));
        assert_eq!(outcome.removed.len(), 2);
        assert!((report.dedup_ratio() - 1.0 / 7.0).abs() < 1e-10);
        assert!((report.retention_ratio() - 5.0 / 7.0).abs() < 1e-10);
    }

    #[test]
    fn test_clique_keeps_exactly_one() {
        let text = words("same", 120);
        let records: Vec<CandidateRecord> = (1..=4)
            .map(|seq| record(Archetype::Chat, seq, text.clone()))
            .collect();
        let outcome = controller().dedup(&records);
        assert_eq!(outcome.kept.len(), 1);
        assert_eq!(outcome.kept[0].seq, 1);
        assert!(outcome.report.drops.iter().all(|d| d.kept_id == "chat_001"));
    }

    #[test]
    fn test_kept_pairs_stay_below_threshold() {
        let base = words("b", 100);
        let records: Vec<CandidateRecord> = (1..=5)
            .map(|seq| {
                let text = if seq % 2 == 0 {
                    format!("{} v{}", base, seq)
                } else {
                    words(&format!("u{}u", seq), 100)
                };
                record(Archetype::Notes, seq, text)
            })
            .collect();
        let c = controller();
        let outcome = c.dedup(&records);
        let index = SimilarityIndex::build(c.hasher(), 32, &outcome.kept);
        for i in 0..outcome.kept.len() {
            for j in (i + 1)..outcome.kept.len() {
                assert!(index.similarity(i, j) < 0.85);
            }
        }
    }

    #[test]
    fn test_dedup_ratios() {
        let outcome = controller().dedup(&[]);
        assert!((outcome.report.dedup_ratio() - 0.0).abs() < 1e-10);
        assert!((outcome.report.retention_ratio() - 1.0).abs() < 1e-10);
    }
}
