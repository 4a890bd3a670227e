//! Deterministic stratified train/val/test assignment.
//!
//! Each stratum contributes the same number of items to each split. Which rep
//! lands where is decided by ranking reps on a SHA-256 key over the split
//! sub-seed, the stratum key and the rep number, so the assignment depends
//! only on `(stratum, rep, seed)` and never on input order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::CurationError;
use crate::integrity::digest::sha256_hex;
use crate::storage::{CandidateRecord, Stratum};

/// Split a final item is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitLabel {
    /// Training split.
    Train,
    /// Validation split.
    Val,
    /// Test split.
    Test,
}

impl SplitLabel {
    pub const ALL: [SplitLabel; 3] = [SplitLabel::Train, SplitLabel::Val, SplitLabel::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            SplitLabel::Train => "train",
            SplitLabel::Val => "val",
            SplitLabel::Test => "test",
        }
    }
}

impl std::fmt::Display for SplitLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Items per stratum in each split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub train: usize,
    pub val: usize,
    pub test: usize,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            train: 3,
            val: 1,
            test: 1,
        }
    }
}

impl SplitConfig {
    pub fn total(&self) -> usize {
        self.train + self.val + self.test
    }

    pub fn count(&self, label: SplitLabel) -> usize {
        match label {
            SplitLabel::Train => self.train,
            SplitLabel::Val => self.val,
            SplitLabel::Test => self.test,
        }
    }

    /// Validate that per-stratum counts sum to the replication target.
    pub fn validate(&self, replication: usize) -> Result<(), String> {
        if self.total() != replication {
            return Err(format!(
                "split counts {}/{}/{} must sum to replication {}",
                self.train, self.val, self.test, replication
            ));
        }
        Ok(())
    }
}

/// Split assignment written as `splits.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Splits {
    /// Split name -> sorted final ids.
    pub splits: BTreeMap<SplitLabel, Vec<String>>,
    /// Final id -> split.
    pub assignment: BTreeMap<String, SplitLabel>,
    pub counts: BTreeMap<SplitLabel, usize>,
    pub per_stratum: BTreeMap<String, BTreeMap<SplitLabel, usize>>,
    /// SHA-256 over the sorted `id\tsplit\n` lines of the assignment.
    pub digest: String,
}

impl Splits {
    pub fn label_of(&self, id: &str) -> Option<SplitLabel> {
        self.assignment.get(id).copied()
    }

    pub fn ids(&self, label: SplitLabel) -> &[String] {
        self.splits.get(&label).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Recomputes the digest from the assignment.
    pub fn compute_digest(assignment: &BTreeMap<String, SplitLabel>) -> String {
        let mut lines = String::new();
        for (id, label) in assignment {
            lines.push_str(id);
            lines.push('\t');
            lines.push_str(label.as_str());
            lines.push('\n');
        }
        sha256_hex(lines.as_bytes())
    }
}

/// Assigns final items to splits.
#[derive(Debug, Clone)]
pub struct Splitter {
    config: SplitConfig,
    replication: usize,
    strata: Vec<Stratum>,
    seed: u64,
}

impl Splitter {
    /// # Arguments
    ///
    /// * `config` - Items per split per stratum.
    /// * `replication` - Expected items per stratum.
    /// * `strata` - Every configured stratum; each must be present.
    /// * `seed` - Split sub-seed.
    pub fn new(config: SplitConfig, replication: usize, strata: Vec<Stratum>, seed: u64) -> Self {
        Self {
            config,
            replication,
            strata,
            seed,
        }
    }

    /// Rank key of one rep inside a stratum.
    fn rank_key(&self, stratum: &str, rep: u32) -> String {
        sha256_hex(format!("{}|{}|{}", self.seed, stratum, rep).as_bytes())
    }

    /// Splits `records` (final items, identified by `slot_id`).
    ///
    /// # Errors
    ///
    /// `SPLIT_ERR` if a stratum does not hold exactly the replication target,
    /// if its reps are not exactly `1..=R`, or if a record belongs to an
    /// unconfigured stratum.
    pub fn split(&self, records: &[CandidateRecord]) -> Result<Splits, CurationError> {
        self.config
            .validate(self.replication)
            .map_err(CurationError::Split)?;

        let mut by_stratum: BTreeMap<String, Vec<&CandidateRecord>> = self
            .strata
            .iter()
            .map(|s| (s.key(), Vec::new()))
            .collect();
        for record in records {
            let key = record.stratum_key();
            match by_stratum.get_mut(&key) {
                Some(members) => members.push(record),
                None => {
                    return Err(CurationError::Split(format!(
                        "item '{}' belongs to unconfigured stratum '{}'",
                        record.slot_id, key
                    )))
                }
            }
        }

        let mut assignment = BTreeMap::new();
        let mut per_stratum = BTreeMap::new();

        for (stratum, mut members) in by_stratum {
            if members.len() != self.replication {
                return Err(CurationError::Split(format!(
                    "stratum '{}' has {} items, expected {}",
                    stratum,
                    members.len(),
                    self.replication
                )));
            }
            let mut reps: Vec<u32> = members.iter().map(|r| r.rep).collect();
            reps.sort_unstable();
            let expected: Vec<u32> = (1..=self.replication as u32).collect();
            if reps != expected {
                return Err(CurationError::Split(format!(
                    "stratum '{}' has reps {:?}, expected 1..={}",
                    stratum, reps, self.replication
                )));
            }

            members.sort_by_cached_key(|r| (self.rank_key(&stratum, r.rep), r.rep));
            let mut counts = BTreeMap::new();
            let mut ranked = members.into_iter();
            for label in SplitLabel::ALL {
                for record in ranked.by_ref().take(self.config.count(label)) {
                    assignment.insert(record.slot_id.clone(), label);
                    *counts.entry(label).or_insert(0) += 1;
                }
            }
            per_stratum.insert(stratum, counts);
        }

        let mut splits: BTreeMap<SplitLabel, Vec<String>> =
            SplitLabel::ALL.iter().map(|&l| (l, Vec::new())).collect();
        for (id, label) in &assignment {
            splits.entry(*label).or_default().push(id.clone());
        }
        let counts = splits.iter().map(|(l, ids)| (*l, ids.len())).collect();
        let digest = Splits::compute_digest(&assignment);

        let result = Splits {
            splits,
            assignment,
            counts,
            per_stratum,
            digest,
        };
        info!(
            train = result.ids(SplitLabel::Train).len(),
            val = result.ids(SplitLabel::Val).len(),
            test = result.ids(SplitLabel::Test).len(),
            "Split assignment complete"
        );
        Ok(result)
    }
}
