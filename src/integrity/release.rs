//! Release checks over a packaged output directory.
//!
//! The lockfile only proves nothing changed since locking. These checks prove
//! the locked content is a valid release: N items, R per configured stratum,
//! and split artifacts that agree with `splits.json`.

use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

use crate::error::LockIssue;
use crate::export::{artifact_path, from_jsonl, PackagedItem, GOLDEN_ARTIFACT, SPLITS_FILE};
use crate::split::{SplitLabel, Splits};
use crate::storage::Stratum;

/// Verifies counts and split consistency of the locked files.
#[derive(Debug, Clone)]
pub struct ReleaseChecker {
    replication: usize,
    strata: Vec<Stratum>,
}

impl ReleaseChecker {
    pub fn new(replication: usize, strata: Vec<Stratum>) -> Self {
        Self {
            replication,
            strata,
        }
    }

    /// Expected item count of the release.
    pub fn expected_items(&self) -> usize {
        self.replication * self.strata.len()
    }

    /// Runs every release check over `files` (relative path -> bytes).
    pub fn check(&self, files: &BTreeMap<String, Vec<u8>>) -> Vec<LockIssue> {
        let mut issues = Vec::new();

        let golden = match self.load_items(files, GOLDEN_ARTIFACT) {
            Ok(items) => items,
            Err(issue) => return vec![issue],
        };
        self.check_counts(&golden, &mut issues);

        let splits: Splits = match files.get(SPLITS_FILE) {
            None => {
                issues.push(LockIssue::Release(format!("{} is missing", SPLITS_FILE)));
                return issues;
            }
            Some(bytes) => match serde_json::from_slice(bytes) {
                Ok(splits) => splits,
                Err(e) => {
                    issues.push(LockIssue::Release(format!(
                        "{} is unreadable: {}",
                        SPLITS_FILE, e
                    )));
                    return issues;
                }
            },
        };
        if Splits::compute_digest(&splits.assignment) != splits.digest {
            issues.push(LockIssue::Release(
                "split digest does not match the assignment".to_string(),
            ));
        }

        let golden_ids: BTreeSet<&str> = golden.iter().map(|i| i.id.as_str()).collect();
        let assigned_ids: BTreeSet<&str> = splits.assignment.keys().map(String::as_str).collect();
        if golden_ids != assigned_ids {
            issues.push(LockIssue::Release(
                "golden items and split assignment cover different ids".to_string(),
            ));
        }
        for item in &golden {
            if let Some(label) = splits.label_of(&item.id) {
                if label != item.split {
                    issues.push(LockIssue::Release(format!(
                        "item '{}' is packaged as {} but assigned to {}",
                        item.id, item.split, label
                    )));
                }
            }
        }

        for label in SplitLabel::ALL {
            let path = artifact_path(label.as_str());
            let items = match self.load_items(files, &path) {
                Ok(items) => items,
                Err(issue) => {
                    issues.push(issue);
                    continue;
                }
            };
            let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
            let expected: Vec<&str> = splits.ids(label).iter().map(String::as_str).collect();
            if ids != expected {
                issues.push(LockIssue::Release(format!(
                    "{} does not match the {} ids in {}",
                    path, label, SPLITS_FILE
                )));
            }
            if let Some(stray) = items.iter().find(|i| i.split != label) {
                issues.push(LockIssue::Release(format!(
                    "{} holds item '{}' labelled {}",
                    path, stray.id, stray.split
                )));
            }
        }

        info!(
            items = golden.len(),
            issues = issues.len(),
            "Release checks complete"
        );
        issues
    }

    fn load_items(
        &self,
        files: &BTreeMap<String, Vec<u8>>,
        path: &str,
    ) -> Result<Vec<PackagedItem>, LockIssue> {
        let bytes = files
            .get(path)
            .ok_or_else(|| LockIssue::Release(format!("{} is missing", path)))?;
        from_jsonl(bytes).map_err(|e| LockIssue::Release(format!("{} is unreadable: {}", path, e)))
    }

    fn check_counts(&self, golden: &[PackagedItem], issues: &mut Vec<LockIssue>) {
        if golden.len() != self.expected_items() {
            issues.push(LockIssue::Release(format!(
                "release holds {} items, expected {}",
                golden.len(),
                self.expected_items()
            )));
        }

        let mut per_stratum: BTreeMap<String, usize> = BTreeMap::new();
        for item in golden {
            *per_stratum.entry(item.stratum_key()).or_insert(0) += 1;
        }
        for stratum in &self.strata {
            let key = stratum.key();
            let count = per_stratum.remove(&key).unwrap_or(0);
            if count != self.replication {
                issues.push(LockIssue::Release(format!(
                    "stratum '{}' holds {} items, expected {}",
                    key, count, self.replication
                )));
            }
        }
        for key in per_stratum.keys() {
            issues.push(LockIssue::Release(format!(
                "stratum '{}' is not configured",
                key
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bands::Band;
    use crate::export::Package;
    use crate::split::{SplitConfig, Splitter};
    use crate::storage::{Archetype, CandidateRecord, Complexity, RecordStatus};

    fn release() -> (Vec<Stratum>, BTreeMap<String, Vec<u8>>) {
        let strata = vec![
            Stratum::new(Archetype::Notes, Complexity::Mvp, "en"),
            Stratum::new(Archetype::Store, Complexity::Pro, "en"),
        ];
        let mut items = Vec::new();
        let mut seq = 0;
        for stratum in &strata {
            for rep in 1..=5 {
                seq += 1;
                items.push(CandidateRecord {
                    candidate_id: format!("c{}", seq),
                    slot_id: stratum.slot_id("replit", rep, seq),
                    archetype: stratum.archetype,
                    complexity: stratum.complexity,
                    locale: "en".to_string(),
                    platform: "replit".to_string(),
                    rep,
                    seq,
                    spec: "text".to_string(),
                    token_count: 300,
                    length_band: Band::Short,
                    status: RecordStatus::Kept,
                });
            }
        }
        let splits = Splitter::new(SplitConfig::default(), 5, strata.clone(), 11)
            .split(&items)
            .unwrap();
        let mut files = Package::build(&items, &splits).unwrap().render().unwrap();
        files.insert(
            SPLITS_FILE.to_string(),
            crate::export::to_canonical_json(&splits).unwrap(),
        );
        (strata, files)
    }

    #[test]
    fn test_consistent_release_passes() {
        let (strata, files) = release();
        let issues = ReleaseChecker::new(5, strata).check(&files);
        assert!(issues.is_empty(), "{:?}", issues);
    }

    #[test]
    fn test_missing_stratum_is_reported() {
        let (mut strata, files) = release();
        strata.push(Stratum::new(Archetype::Gallery, Complexity::Mvp, "en"));
        let issues = ReleaseChecker::new(5, strata).check(&files);
        assert!(issues
            .iter()
            .any(|i| i.to_string().contains("gallery_MVP_en")));
        assert!(issues.iter().any(|i| i.to_string().contains("expected 15")));
    }

    #[test]
    fn test_split_artifact_disagreement_is_reported() {
        let (strata, mut files) = release();
        let train = files[&artifact_path("train")].clone();
        let val = files[&artifact_path("val")].clone();
        files.insert(artifact_path("train"), val);
        files.insert(artifact_path("val"), train);
        let issues = ReleaseChecker::new(5, strata).check(&files);
        assert!(issues
            .iter()
            .any(|i| i.to_string().contains("artifacts/train.jsonl")));
    }

    #[test]
    fn test_missing_golden_artifact() {
        let (strata, mut files) = release();
        files.remove(GOLDEN_ARTIFACT);
        let issues = ReleaseChecker::new(5, strata).check(&files);
        assert_eq!(issues.len(), 1);
    }
}
