//! Length bands for golden specs.
//!
//! This module buckets records by token count into SHORT, STANDARD and
//! EXTENDED and checks the global band mix against its targets.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::CurationError;
use crate::storage::CandidateRecord;

/// The length band of a spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Band {
    Short,
    Standard,
    Extended,
}

impl Band {
    pub const ALL: [Band; 3] = [Band::Short, Band::Standard, Band::Extended];

    pub fn as_str(&self) -> &'static str {
        match self {
            Band::Short => "SHORT",
            Band::Standard => "STANDARD",
            Band::Extended => "EXTENDED",
        }
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive token range and global target for one band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandSpec {
    pub min_tokens: u32,
    pub max_tokens: u32,
    pub target: usize,
}

impl BandSpec {
    pub fn contains(&self, tokens: u32) -> bool {
        (self.min_tokens..=self.max_tokens).contains(&tokens)
    }
}

/// Band thresholds and the global mix they are checked against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandConfig {
    pub short: BandSpec,
    pub standard: BandSpec,
    pub extended: BandSpec,
    /// Allowed absolute deviation from each band's target.
    pub tolerance: usize,
}

impl Default for BandConfig {
    fn default() -> Self {
        Self {
            short: BandSpec {
                min_tokens: 250,
                max_tokens: 400,
                target: 14,
            },
            standard: BandSpec {
                min_tokens: 600,
                max_tokens: 900,
                target: 42,
            },
            extended: BandSpec {
                min_tokens: 1100,
                max_tokens: 1500,
                target: 14,
            },
            tolerance: 7,
        }
    }
}

impl BandConfig {
    pub fn spec(&self, band: Band) -> &BandSpec {
        match band {
            Band::Short => &self.short,
            Band::Standard => &self.standard,
            Band::Extended => &self.extended,
        }
    }

    /// Checks that ranges are well formed and strictly ordered.
    pub fn validate(&self) -> Result<(), String> {
        for band in Band::ALL {
            let spec = self.spec(band);
            if spec.min_tokens > spec.max_tokens {
                return Err(format!(
                    "band {} has min_tokens {} > max_tokens {}",
                    band, spec.min_tokens, spec.max_tokens
                ));
            }
        }
        if self.short.max_tokens >= self.standard.min_tokens
            || self.standard.max_tokens >= self.extended.min_tokens
        {
            return Err("band ranges must not overlap and must be ordered".to_string());
        }
        Ok(())
    }
}

/// Per-band outcome of a mix check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandStat {
    pub band: Band,
    pub min_tokens: u32,
    pub max_tokens: u32,
    pub count: usize,
    pub target: usize,
    pub tolerance: usize,
    pub pass: bool,
}

/// A proposed move of one item between bands to repair the mix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandSuggestion {
    pub id: String,
    pub current_band: Band,
    pub suggested_band: Band,
}

/// Report written as `band_report.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandReport {
    pub bands: Vec<BandStat>,
    pub total: usize,
    pub pass: bool,
    pub suggestions: Vec<BandSuggestion>,
}

impl BandReport {
    pub fn count(&self, band: Band) -> usize {
        self.bands
            .iter()
            .find(|s| s.band == band)
            .map(|s| s.count)
            .unwrap_or(0)
    }

    /// Turns the first failing band into `BAND_MIX_ERR` when enforcing.
    pub fn check(&self, enforce: bool) -> Result<(), CurationError> {
        let Some(failing) = self.bands.iter().find(|s| !s.pass) else {
            return Ok(());
        };
        if !enforce {
            warn!(
                band = %failing.band,
                count = failing.count,
                target = failing.target,
                "Band mix outside tolerance (advisory)"
            );
            return Ok(());
        }
        Err(CurationError::BandMix {
            band: failing.band.to_string(),
            count: failing.count,
            target: failing.target,
            tolerance: failing.tolerance,
        })
    }
}

/// Classifies records into bands and verifies the global mix.
#[derive(Debug, Clone, Default)]
pub struct BandClassifier {
    config: BandConfig,
}

impl BandClassifier {
    pub fn new(config: BandConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BandConfig {
        &self.config
    }

    /// Returns the band containing `tokens`, if any.
    pub fn classify_tokens(&self, tokens: u32) -> Option<Band> {
        Band::ALL
            .into_iter()
            .find(|&band| self.config.spec(band).contains(tokens))
    }

    /// Returns the band of a record from its token count.
    ///
    /// Records reaching this stage were banded at load time, so `None` only
    /// appears for hand-built records outside every range.
    pub fn classify(&self, record: &CandidateRecord) -> Option<Band> {
        self.classify_tokens(record.token_count)
    }

    /// Counts bands over `records` and compares them to the targets.
    pub fn verify(&self, records: &[CandidateRecord]) -> BandReport {
        let mut counts: BTreeMap<Band, usize> = Band::ALL.iter().map(|&b| (b, 0)).collect();
        for record in records {
            let band = self.classify(record).unwrap_or(record.length_band);
            *counts.entry(band).or_insert(0) += 1;
        }

        let tolerance = self.config.tolerance;
        let bands: Vec<BandStat> = Band::ALL
            .iter()
            .map(|&band| {
                let spec = self.config.spec(band);
                let count = counts[&band];
                BandStat {
                    band,
                    min_tokens: spec.min_tokens,
                    max_tokens: spec.max_tokens,
                    count,
                    target: spec.target,
                    tolerance,
                    pass: count.abs_diff(spec.target) <= tolerance,
                }
            })
            .collect();

        let pass = bands.iter().all(|s| s.pass);
        let suggestions = if pass {
            Vec::new()
        } else {
            self.suggest_adjustments(records, &counts)
        };

        info!(
            short = counts[&Band::Short],
            standard = counts[&Band::Standard],
            extended = counts[&Band::Extended],
            pass,
            "Band mix verified"
        );

        BandReport {
            bands,
            total: records.len(),
            pass,
            suggestions,
        }
    }

    /// Proposes which items would move from over-full to under-full bands.
    fn suggest_adjustments(
        &self,
        records: &[CandidateRecord],
        counts: &BTreeMap<Band, usize>,
    ) -> Vec<BandSuggestion> {
        let mut deltas: BTreeMap<Band, i64> = Band::ALL
            .iter()
            .map(|&b| (b, counts[&b] as i64 - self.config.spec(b).target as i64))
            .collect();

        let mut suggestions = Vec::new();
        for reduce in Band::ALL {
            let mut candidates: Vec<&str> = records
                .iter()
                .filter(|r| r.length_band == reduce)
                .map(|r| r.slot_id.as_str())
                .collect();
            candidates.sort_unstable();
            let mut next = 0;

            for increase in Band::ALL {
                let surplus = deltas[&reduce];
                let deficit = -deltas[&increase];
                let moves = surplus.min(deficit);
                if moves <= 0 {
                    continue;
                }
                for id in candidates.iter().skip(next).take(moves as usize) {
                    suggestions.push(BandSuggestion {
                        id: (*id).to_string(),
                        current_band: reduce,
                        suggested_band: increase,
                    });
                }
                next += moves as usize;
                *deltas.entry(reduce).or_insert(0) -= moves;
                *deltas.entry(increase).or_insert(0) += moves;
            }
        }
        suggestions
    }
}
