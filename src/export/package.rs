//! Split artifacts: `train.jsonl`, `val.jsonl`, `test.jsonl`, `golden.jsonl`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::bands::Band;
use crate::error::ExportError;
use crate::split::{SplitLabel, Splits};
use crate::storage::{Archetype, CandidateRecord, Complexity};

use super::canonical::to_canonical_jsonl;
use super::{artifact_path, GOLDEN_ARTIFACT};

/// One line of a split artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagedItem {
    pub id: String,
    pub split: SplitLabel,
    pub source_candidate_id: String,
    pub archetype: Archetype,
    pub complexity: Complexity,
    pub locale: String,
    pub platform: String,
    pub rep: u32,
    pub seq: u32,
    pub length_band: Band,
    pub token_count: u32,
    pub spec: String,
}

impl PackagedItem {
    pub fn stratum_key(&self) -> String {
        format!("{}_{}_{}", self.archetype, self.complexity, self.locale)
    }
}

/// The packaged dataset, every list sorted by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Package {
    pub golden: Vec<PackagedItem>,
    pub splits: BTreeMap<SplitLabel, Vec<PackagedItem>>,
}

impl Package {
    /// Joins final items with their split assignment.
    ///
    /// # Errors
    ///
    /// `ExportError::Unassigned` if an item is missing from `splits`.
    pub fn build(items: &[CandidateRecord], splits: &Splits) -> Result<Self, ExportError> {
        let mut golden = Vec::with_capacity(items.len());
        for record in items {
            let split = splits
                .label_of(&record.slot_id)
                .ok_or_else(|| ExportError::Unassigned(record.slot_id.clone()))?;
            golden.push(PackagedItem {
                id: record.slot_id.clone(),
                split,
                source_candidate_id: record.candidate_id.clone(),
                archetype: record.archetype,
                complexity: record.complexity,
                locale: record.locale.clone(),
                platform: record.platform.clone(),
                rep: record.rep,
                seq: record.seq,
                length_band: record.length_band,
                token_count: record.token_count,
                spec: record.spec.clone(),
            });
        }
        golden.sort_by(|a, b| a.id.cmp(&b.id));

        let mut by_split: BTreeMap<SplitLabel, Vec<PackagedItem>> =
            SplitLabel::ALL.iter().map(|&l| (l, Vec::new())).collect();
        for item in &golden {
            by_split.entry(item.split).or_default().push(item.clone());
        }

        info!(
            items = golden.len(),
            train = by_split[&SplitLabel::Train].len(),
            val = by_split[&SplitLabel::Val].len(),
            test = by_split[&SplitLabel::Test].len(),
            "Packaged dataset"
        );
        Ok(Self {
            golden,
            splits: by_split,
        })
    }

    pub fn items(&self, label: SplitLabel) -> &[PackagedItem] {
        self.splits.get(&label).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Renders every artifact as `relative path -> bytes`.
    pub fn render(&self) -> Result<BTreeMap<String, Vec<u8>>, ExportError> {
        let mut out = BTreeMap::new();
        for label in SplitLabel::ALL {
            out.insert(
                artifact_path(label.as_str()),
                to_canonical_jsonl(self.items(label))?,
            );
        }
        out.insert(GOLDEN_ARTIFACT.to_string(), to_canonical_jsonl(&self.golden)?);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::split::{SplitConfig, Splitter};
    use crate::storage::{RecordStatus, Stratum};

    fn items() -> (Vec<Stratum>, Vec<CandidateRecord>) {
        let strata = vec![
            Stratum::new(Archetype::Blog, Complexity::Mvp, "en"),
            Stratum::new(Archetype::Chat, Complexity::Pro, "en"),
        ];
        let mut seq = 0;
        let mut out = Vec::new();
        for stratum in &strata {
            for rep in 1..=5 {
                seq += 1;
                out.push(CandidateRecord {
                    candidate_id: format!("cand_{:02}", seq),
                    slot_id: stratum.slot_id("replit", rep, seq),
                    archetype: stratum.archetype,
                    complexity: stratum.complexity,
                    locale: stratum.locale.clone(),
                    platform: "replit".to_string(),
                    rep,
                    seq,
                    spec: format!("spec {}", seq),
                    token_count: 700,
                    length_band: Band::Standard,
                    status: RecordStatus::Kept,
                });
            }
        }
        (strata, out)
    }

    #[test]
    fn test_package_follows_splits() {
        let (strata, items) = items();
        let splits = Splitter::new(SplitConfig::default(), 5, strata, 3)
            .split(&items)
            .unwrap();
        let package = Package::build(&items, &splits).unwrap();

        assert_eq!(package.golden.len(), 10);
        assert_eq!(package.items(SplitLabel::Train).len(), 6);
        assert_eq!(package.items(SplitLabel::Val).len(), 2);
        assert_eq!(package.items(SplitLabel::Test).len(), 2);
        for label in SplitLabel::ALL {
            let ids: Vec<String> = package.items(label).iter().map(|i| i.id.clone()).collect();
            assert_eq!(ids.as_slice(), splits.ids(label));
        }
        assert!(package.golden.windows(2).all(|w| w[0].id < w[1].id));
        assert_eq!(package.golden[0].source_candidate_id, "cand_01");
    }

    #[test]
    fn test_render_writes_four_artifacts() {
        let (strata, items) = items();
        let splits = Splitter::new(SplitConfig::default(), 5, strata, 3)
            .split(&items)
            .unwrap();
        let rendered = Package::build(&items, &splits).unwrap().render().unwrap();
        let names: Vec<&str> = rendered.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            vec![
                "artifacts/golden.jsonl",
                "artifacts/test.jsonl",
                "artifacts/train.jsonl",
                "artifacts/val.jsonl"
            ]
        );
        let golden = String::from_utf8(rendered[GOLDEN_ARTIFACT].clone()).unwrap();
        assert_eq!(golden.lines().count(), 10);
        assert!(golden.starts_with("{\"archetype\":\"blog\""));
    }

    #[test]
    fn test_unassigned_item_is_rejected() {
        let (strata, items) = items();
        let splits = Splitter::new(SplitConfig::default(), 5, strata, 3)
            .split(&items)
            .unwrap();
        let mut extra = items.clone();
        extra[0].slot_id = "golden_unknown".to_string();
        assert!(matches!(
            Package::build(&extra, &splits),
            Err(ExportError::Unassigned(id)) if id == "golden_unknown"
        ));
    }
}
