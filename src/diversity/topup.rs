//! Quota restoration after dedup.
//!
//! Strata that fell below the replication target are refilled from the
//! candidate pool (then the reserve pool) in ordering-key order. Every
//! insertion is checked against the global kept set so top-up can never
//! reintroduce a near-duplicate.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::CurationError;
use crate::storage::{by_order_key, CandidateRecord, RecordStatus, Stratum};

use super::minhash::{estimate_similarity, MinHasher, Signature};

/// Decision taken for one considered candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopUpOutcome {
    Accepted,
    Rejected,
    Skipped,
}

/// Reason attached to a trace entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TopUpReason {
    TopUp,
    NearDuplicate,
    NotNeeded,
}

/// One considered candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopUpEntry {
    pub stratum: String,
    pub considered_id: String,
    pub source: PoolSource,
    pub outcome: TopUpOutcome,
    pub reason: TopUpReason,
    pub similarity: Option<f64>,
    pub conflict_id: Option<String>,
}

/// Which pool a candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolSource {
    Pool,
    Reserve,
}

/// Per-stratum top-up totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StratumTopUp {
    pub before: usize,
    pub added: usize,
    pub after: usize,
    pub target: usize,
    pub pass: bool,
}

/// Report written as `top_up_trace.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopUpTrace {
    pub replication: usize,
    pub threshold: f64,
    pub entries: Vec<TopUpEntry>,
    pub strata: BTreeMap<String, StratumTopUp>,
    pub total: usize,
    pub pass: bool,
}

impl TopUpTrace {
    pub fn added(&self) -> usize {
        self.strata.values().map(|s| s.added).sum()
    }
}

/// Successful top-up: the finalised items and the trace.
#[derive(Debug, Clone)]
pub struct TopUpResult {
    pub records: Vec<CandidateRecord>,
    pub trace: TopUpTrace,
}

/// Failed top-up. The trace is kept so it can still be written.
#[derive(Debug)]
pub struct TopUpFailure {
    pub error: CurationError,
    pub trace: TopUpTrace,
}

/// Refills strata to the replication target.
#[derive(Debug, Clone)]
pub struct TopUpController {
    hasher: MinHasher,
    threshold: f64,
    replication: usize,
    strata: Vec<Stratum>,
}

impl TopUpController {
    /// # Arguments
    ///
    /// * `hasher` - The same MinHash family dedup used.
    /// * `threshold` - Similarity at which a candidate is rejected.
    /// * `replication` - Target items per stratum.
    /// * `strata` - Every configured stratum, checked in canonical order.
    pub fn new(
        hasher: MinHasher,
        threshold: f64,
        replication: usize,
        mut strata: Vec<Stratum>,
    ) -> Self {
        strata.sort();
        Self {
            hasher,
            threshold,
            replication,
            strata,
        }
    }

    /// Tops up `kept` from `pool`, then `reserve`, and finalises identifiers.
    ///
    /// # Errors
    ///
    /// Returns a [`TopUpFailure`] carrying `TOPUP_ERR` for the first stratum
    /// (in canonical order) that cannot reach the target.
    pub fn top_up(
        &self,
        kept: &[CandidateRecord],
        pool: &[CandidateRecord],
        reserve: &[CandidateRecord],
    ) -> Result<TopUpResult, TopUpFailure> {
        let mut kept_ids: HashSet<&str> = kept.iter().map(|r| r.candidate_id.as_str()).collect();
        let mut kept_set: Vec<(String, Signature)> = kept
            .iter()
            .map(|r| (r.candidate_id.clone(), self.hasher.signature(&r.spec)))
            .collect();
        let mut survivors: Vec<CandidateRecord> = kept.to_vec();

        let mut entries = Vec::new();
        let mut strata = BTreeMap::new();
        let mut shortfall: Option<(String, usize)> = None;

        for stratum in &self.strata {
            let key = stratum.key();
            let before = kept.iter().filter(|r| r.stratum_key() == key).count();
            let mut have = before;

            for (source, record) in self.candidates_for(&key, pool, reserve, &kept_ids) {
                if have >= self.replication {
                    entries.push(TopUpEntry {
                        stratum: key.clone(),
                        considered_id: record.candidate_id.clone(),
                        source,
                        outcome: TopUpOutcome::Skipped,
                        reason: TopUpReason::NotNeeded,
                        similarity: None,
                        conflict_id: None,
                    });
                    continue;
                }

                let signature = self.hasher.signature(&record.spec);
                let conflict = closest(&kept_set, &signature);
                let best_similarity = conflict.as_ref().map(|(_, s)| *s);
                match conflict {
                    Some((conflict_id, similarity)) if similarity >= self.threshold => {
                        debug!(
                            candidate = %record.candidate_id,
                            conflict = %conflict_id,
                            similarity,
                            "Top-up candidate rejected as near-duplicate"
                        );
                        entries.push(TopUpEntry {
                            stratum: key.clone(),
                            considered_id: record.candidate_id.clone(),
                            source,
                            outcome: TopUpOutcome::Rejected,
                            reason: TopUpReason::NearDuplicate,
                            similarity: Some(similarity),
                            conflict_id: Some(conflict_id),
                        });
                    }
                    _ => {
                        debug!(
                            candidate = %record.candidate_id,
                            stratum = %key,
                            "Top-up candidate accepted"
                        );
                        entries.push(TopUpEntry {
                            stratum: key.clone(),
                            considered_id: record.candidate_id.clone(),
                            source,
                            outcome: TopUpOutcome::Accepted,
                            reason: TopUpReason::TopUp,
                            similarity: best_similarity,
                            conflict_id: None,
                        });
                        kept_ids.insert(record.candidate_id.as_str());
                        kept_set.push((record.candidate_id.clone(), signature));
                        survivors.push(record.with_status(RecordStatus::TopUpAdded));
                        have += 1;
                    }
                }
            }

            let pass = have >= self.replication;
            if !pass && shortfall.is_none() {
                shortfall = Some((key.clone(), have));
            }
            strata.insert(
                key,
                StratumTopUp {
                    before,
                    added: have - before,
                    after: have,
                    target: self.replication,
                    pass,
                },
            );
        }

        let trace = TopUpTrace {
            replication: self.replication,
            threshold: self.threshold,
            entries,
            total: survivors.len(),
            pass: shortfall.is_none(),
            strata,
        };

        if let Some((stratum, have)) = shortfall {
            warn!(stratum = %stratum, have, target = self.replication, "Top-up pool exhausted");
            return Err(TopUpFailure {
                error: CurationError::TopUpExhausted {
                    stratum,
                    have,
                    target: self.replication,
                },
                trace,
            });
        }

        info!(added = trace.added(), total = trace.total, "Top-up complete");
        Ok(TopUpResult {
            records: finalize(survivors),
            trace,
        })
    }

    /// Pool candidates of one stratum not already kept, then reserve ones.
    fn candidates_for<'a>(
        &self,
        stratum: &str,
        pool: &'a [CandidateRecord],
        reserve: &'a [CandidateRecord],
        kept_ids: &HashSet<&str>,
    ) -> Vec<(PoolSource, &'a CandidateRecord)> {
        let select = |records: &'a [CandidateRecord]| {
            let mut out: Vec<&'a CandidateRecord> = records
                .iter()
                .filter(|r| r.stratum_key() == stratum && !kept_ids.contains(r.candidate_id.as_str()))
                .collect();
            out.sort_by(|a, b| by_order_key(a, b));
            out
        };

        let main = select(pool);
        let seen: HashSet<&str> = main.iter().map(|r| r.candidate_id.as_str()).collect();
        let extra: Vec<&CandidateRecord> = select(reserve)
            .into_iter()
            .filter(|r| !seen.contains(r.candidate_id.as_str()))
            .collect();

        main.into_iter()
            .map(|r| (PoolSource::Pool, r))
            .chain(extra.into_iter().map(|r| (PoolSource::Reserve, r)))
            .collect()
    }
}

/// Most similar kept item; ties go to the earliest kept.
fn closest(kept: &[(String, Signature)], signature: &[u64]) -> Option<(String, f64)> {
    let mut best: Option<(&str, f64)> = None;
    for (id, other) in kept {
        let sim = estimate_similarity(signature, other);
        if best.map_or(true, |(_, b)| sim > b) {
            best = Some((id.as_str(), sim));
        }
    }
    best.map(|(id, sim)| (id.to_string(), sim))
}

/// Assigns final rep (1..R per stratum, by ordering key) and a global
/// sequence (1..N in canonical stratum order), re-deriving slot ids.
///
/// `candidate_id` keeps the source identifier.
pub fn finalize(records: Vec<CandidateRecord>) -> Vec<CandidateRecord> {
    let mut by_stratum: BTreeMap<String, Vec<CandidateRecord>> = BTreeMap::new();
    for record in records {
        by_stratum.entry(record.stratum_key()).or_default().push(record);
    }

    let mut out = Vec::new();
    let mut seq = 0u32;
    for (_, mut members) in by_stratum {
        members.sort_by(by_order_key);
        for (pos, mut record) in members.into_iter().enumerate() {
            seq += 1;
            record.rep = pos as u32 + 1;
            record.seq = seq;
            record.slot_id = record.stratum().slot_id(&record.platform, record.rep, record.seq);
            out.push(record);
        }
    }
    out
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

    fn record(
        archetype: Archetype,
        complexity: Complexity,
        seq: u32,
        text: String,
    ) -> CandidateRecord {
        let id = format!("{}{}_{:03}", archetype, complexity, seq);
        CandidateRecord {
            candidate_id: id.clone(),
            slot_id: id,
            archetype,
            complexity,
            locale: "en".to_string(),
            platform: "replit".to_string(),
            rep: 1,
            seq,
            spec: text,
            token_count: 700,
            length_band: Band::Standard,
            status: RecordStatus::Kept,
        }
    }

    fn controller(strata: Vec<Stratum>) -> TopUpController {
        TopUpController::new(MinHasher::new(128, 3, 11), 0.85, 5, strata)
    }

    fn chat_pro() -> Stratum {
        Stratum::new(Archetype::Chat, Complexity::Pro, "en")
    }

    #[test]
    fn test_full_stratum_is_a_no_op() {
        let kept: Vec<CandidateRecord> = (1..=5)
            .map(|s| record(Archetype::Chat, Complexity::Pro, s, words(&format!("k{}x", s), 60)))
            .collect();
        let mut pool = kept.clone();
        pool.push(record(Archetype::Chat, Complexity::Pro, 6, words("extra", 60)));

        let result = controller(vec![chat_pro()]).top_up(&kept, &pool, &[]).unwrap();
        assert_eq!(result.records.len(), 5);
        assert_eq!(result.trace.added(), 0);
        assert_eq!(result.trace.entries.len(), 1);
        assert_eq!(result.trace.entries[0].reason, TopUpReason::NotNeeded);
    }

    #[test]
    fn test_rejects_near_duplicate_and_accepts_next() {
        let kept: Vec<CandidateRecord> = (1..=4)
            .map(|s| record(Archetype::Chat, Complexity::Pro, s, words(&format!("k{}x", s), 80)))
            .collect();
        let mut pool = kept.clone();
        pool.push(record(
            Archetype::Chat,
            Complexity::Pro,
            5,
            format!("{} tail", words("k1x", 80)),
        ));
        pool.push(record(Archetype::Chat, Complexity::Pro, 6, words("fresh", 80)));

        let result = controller(vec![chat_pro()]).top_up(&kept, &pool, &[]).unwrap();
        let entries = &result.trace.entries;
        assert_eq!(entries[0].reason, TopUpReason::NearDuplicate);
        assert_eq!(entries[0].conflict_id.as_deref(), Some("chatPro_001"));
        assert_eq!(entries[1].reason, TopUpReason::TopUp);
        assert_eq!(entries[1].considered_id, "chatPro_006");
        assert_eq!(result.records.len(), 5);
        assert_eq!(
            result
                .records
                .iter()
                .filter(|r| r.status == RecordStatus::TopUpAdded)
                .count(),
            1
        );
    }

    #[test]
    fn test_exhausted_pool_fails_with_trace() {
        let kept: Vec<CandidateRecord> = (1..=4)
            .map(|s| record(Archetype::Chat, Complexity::Pro, s, words(&format!("k{}x", s), 80)))
            .collect();
        let mut pool = kept.clone();
        pool.push(record(
            Archetype::Chat,
            Complexity::Pro,
            5,
            format!("{} again", words("k1x", 80)),
        ));

        let failure = controller(vec![chat_pro()])
            .top_up(&kept, &pool, &[])
            .unwrap_err();
        assert_eq!(failure.error.code(), crate::error::ErrorCode::TopUpErr);
        assert!(failure.error.to_string().contains("chat_Pro_en"));
        assert!(!failure.trace.pass);
        assert_eq!(failure.trace.strata["chat_Pro_en"].after, 4);
    }

    #[test]
    fn test_reserve_used_after_pool() {
        let kept: Vec<CandidateRecord> = (1..=4)
            .map(|s| record(Archetype::Chat, Complexity::Pro, s, words(&format!("k{}x", s), 80)))
            .collect();
        let reserve = vec![record(Archetype::Chat, Complexity::Pro, 9, words("reserve", 80))];
        let result = controller(vec![chat_pro()])
            .top_up(&kept, &kept, &reserve)
            .unwrap();
        assert_eq!(result.trace.entries[0].source, PoolSource::Reserve);
        assert_eq!(result.records.len(), 5);
    }

    #[test]
    fn test_finalize_assigns_rep_and_global_seq() {
        let records = vec![
            record(Archetype::Notes, Complexity::Mvp, 7, "n".into()),
            record(Archetype::Blog, Complexity::Mvp, 9, "b".into()),
            record(Archetype::Blog, Complexity::Mvp, 3, "b".into()),
        ];
        let finalized = finalize(records);
        let ids: Vec<&str> = finalized.iter().map(|r| r.slot_id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "golden_blogMVPen_replit_rep01_seq001",
                "golden_blogMVPen_replit_rep02_seq002",
                "golden_notesMVPen_replit_rep01_seq003",
            ]
        );
        assert_eq!(finalized[0].candidate_id, "blogMVP_003");
    }
}
