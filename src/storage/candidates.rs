//! The candidate store: the ordered record set every stage reads.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::bands::BandClassifier;
use crate::diversity::text::count_tokens;
use crate::error::StoreError;

use super::record::{canonical_order, CandidateInput, CandidateRecord, RecordStatus};

/// Counts gathered while loading a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub loaded: usize,
    pub excluded_status: usize,
    pub excluded_unbanded: usize,
}

/// Which record statuses a load accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Admission {
    /// Upstream candidate pools: only `valid` records.
    #[default]
    Candidates,
    /// Intermediate stage files: records still in the curated set.
    Curated,
}

impl Admission {
    pub fn admits(self, status: RecordStatus) -> bool {
        match self {
            Admission::Candidates => status == RecordStatus::Valid,
            Admission::Curated => matches!(
                status,
                RecordStatus::Valid | RecordStatus::Kept | RecordStatus::TopUpAdded
            ),
        }
    }
}

/// Options applied while turning raw input lines into records.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub locales: Vec<String>,
    pub classifier: BandClassifier,
    pub admission: Admission,
}

impl StoreOptions {
    pub fn with_admission(mut self, admission: Admission) -> Self {
        self.admission = admission;
        self
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            locales: vec!["en".to_string()],
            classifier: BandClassifier::default(),
            admission: Admission::default(),
        }
    }
}

/// Validated candidate records in canonical order (stratum key, seq, id).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateStore {
    records: Vec<CandidateRecord>,
}

impl CandidateStore {
    /// Builds a store from already-validated records.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateId` if two records share an identifier.
    pub fn from_records(mut records: Vec<CandidateRecord>) -> Result<Self, StoreError> {
        let mut seen = HashSet::with_capacity(records.len());
        for record in &records {
            if !seen.insert(record.candidate_id.as_str()) {
                return Err(StoreError::DuplicateId(record.candidate_id.clone()));
            }
        }
        records.sort_by(canonical_order);
        Ok(Self { records })
    }

    /// Parses JSONL input, one candidate per non-blank line.
    ///
    /// Records whose status the admission policy rejects and records outside
    /// every length band are excluded with a warning rather than failing the
    /// load.
    pub fn from_jsonl_str(
        text: &str,
        options: &StoreOptions,
    ) -> Result<(Self, LoadSummary), StoreError> {
        let mut summary = LoadSummary::default();
        let mut records = Vec::new();

        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let input: CandidateInput =
                serde_json::from_str(line).map_err(|source| StoreError::InvalidRecord {
                    line: idx + 1,
                    source,
                })?;

            if !options.admission.admits(input.status) {
                warn!(
                    candidate = %input.candidate_id,
                    status = input.status.as_str(),
                    "Excluding candidate by status"
                );
                summary.excluded_status += 1;
                continue;
            }

            match Self::validate_input(input, options)? {
                Some(record) => records.push(record),
                None => summary.excluded_unbanded += 1,
            }
        }

        let store = Self::from_records(records)?;
        summary.loaded = store.len();
        info!(
            loaded = summary.loaded,
            excluded_status = summary.excluded_status,
            excluded_unbanded = summary.excluded_unbanded,
            "Loaded candidate store"
        );
        Ok((store, summary))
    }

    /// Reads a JSONL file into a store.
    pub async fn load(
        path: impl AsRef<Path>,
        options: &StoreOptions,
    ) -> Result<(Self, LoadSummary), StoreError> {
        let text = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_jsonl_str(&text, options)
    }

    fn validate_input(
        input: CandidateInput,
        options: &StoreOptions,
    ) -> Result<Option<CandidateRecord>, StoreError> {
        if input.candidate_id.trim().is_empty() || input.spec.trim().is_empty() {
            return Err(StoreError::EmptyField {
                id: input.candidate_id,
            });
        }
        if !options.locales.iter().any(|l| l == &input.locale) {
            return Err(StoreError::UnknownLocale {
                id: input.candidate_id,
                locale: input.locale,
            });
        }

        let token_count = input.token_count.unwrap_or_else(|| count_tokens(&input.spec));
        let Some(band) = options.classifier.classify_tokens(token_count) else {
            warn!(
                candidate = %input.candidate_id,
                token_count,
                "Excluding candidate outside every length band"
            );
            return Ok(None);
        };
        if let Some(declared) = input.length_band {
            if declared != band {
                debug!(
                    candidate = %input.candidate_id,
                    declared = %declared,
                    actual = %band,
                    "Declared band corrected from token count"
                );
            }
        }

        let stratum = super::record::Stratum::new(input.archetype, input.complexity, input.locale);
        let slot_id = input
            .slot_id
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| stratum.slot_id(&input.platform, input.rep, input.seq));

        Ok(Some(CandidateRecord {
            candidate_id: input.candidate_id,
            slot_id,
            archetype: stratum.archetype,
            complexity: stratum.complexity,
            locale: stratum.locale,
            platform: input.platform,
            rep: input.rep,
            seq: input.seq,
            spec: input.spec,
            token_count,
            length_band: band,
            status: input.status,
        }))
    }

    pub fn records(&self) -> &[CandidateRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<CandidateRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
