//! Candidate record and stratum types.
//!
//! A candidate record is one validated spec bound to a slot. Records are never
//! edited after validation; stages produce annotated copies instead.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bands::Band;

/// Platform tag used in slot identifiers when the input omits one.
pub const DEFAULT_PLATFORM: &str = "replit";

/// Application archetype of a spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Archetype {
    Blog,
    Guestbook,
    Chat,
    Notes,
    Dashboard,
    Store,
    Gallery,
}

impl Archetype {
    /// Every archetype, in declaration order.
    pub const ALL: [Archetype; 7] = [
        Archetype::Blog,
        Archetype::Guestbook,
        Archetype::Chat,
        Archetype::Notes,
        Archetype::Dashboard,
        Archetype::Store,
        Archetype::Gallery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Archetype::Blog => "blog",
            Archetype::Guestbook => "guestbook",
            Archetype::Chat => "chat",
            Archetype::Notes => "notes",
            Archetype::Dashboard => "dashboard",
            Archetype::Store => "store",
            Archetype::Gallery => "gallery",
        }
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Feature scope of a spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Complexity {
    #[serde(rename = "MVP")]
    Mvp,
    #[serde(rename = "Pro")]
    Pro,
}

impl Complexity {
    pub const ALL: [Complexity; 2] = [Complexity::Mvp, Complexity::Pro];

    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Mvp => "MVP",
            Complexity::Pro => "Pro",
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (archetype, complexity, locale) bucket with its own replication target.
///
/// Strata order by their rendered key so that every stage walks them in the
/// same canonical sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Stratum {
    pub archetype: Archetype,
    pub complexity: Complexity,
    pub locale: String,
}

impl Stratum {
    pub fn new(archetype: Archetype, complexity: Complexity, locale: impl Into<String>) -> Self {
        Self {
            archetype,
            complexity,
            locale: locale.into(),
        }
    }

    /// Rendered key, e.g. `blog_MVP_en`.
    pub fn key(&self) -> String {
        format!("{}_{}_{}", self.archetype, self.complexity, self.locale)
    }

    /// Prefix used in slot identifiers, e.g. `blogMVPen`.
    fn slot_prefix(&self) -> String {
        format!("{}{}{}", self.archetype, self.complexity, self.locale)
    }

    /// Builds the stable slot identifier for a position in this stratum.
    pub fn slot_id(&self, platform: &str, rep: u32, seq: u32) -> String {
        format!(
            "golden_{}_{}_rep{:02}_seq{:03}",
            self.slot_prefix(),
            platform,
            rep,
            seq
        )
    }

    /// Every stratum for the given locales, in canonical order.
    pub fn grid(locales: &[String]) -> Vec<Stratum> {
        let mut strata: Vec<Stratum> = Archetype::ALL
            .iter()
            .flat_map(|&archetype| {
                Complexity::ALL.iter().flat_map(move |&complexity| {
                    locales
                        .iter()
                        .map(move |locale| Stratum::new(archetype, complexity, locale.clone()))
                })
            })
            .collect();
        strata.sort();
        strata
    }
}

impl Ord for Stratum {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl PartialOrd for Stratum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Stratum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Validation and curation state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Valid,
    Invalid,
    Kept,
    Dropped,
    Trimmed,
    TopUpAdded,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Valid => "valid",
            RecordStatus::Invalid => "invalid",
            RecordStatus::Kept => "kept",
            RecordStatus::Dropped => "dropped",
            RecordStatus::Trimmed => "trimmed",
            RecordStatus::TopUpAdded => "top_up_added",
        }
    }
}

fn default_platform() -> String {
    DEFAULT_PLATFORM.to_string()
}

fn default_status() -> RecordStatus {
    RecordStatus::Valid
}

/// One line of upstream (or intermediate) JSONL input.
#[derive(Debug, Clone, Deserialize)]
pub struct CandidateInput {
    #[serde(alias = "id")]
    pub candidate_id: String,
    #[serde(default)]
    pub slot_id: Option<String>,
    pub archetype: Archetype,
    pub complexity: Complexity,
    pub locale: String,
    #[serde(default = "default_platform")]
    pub platform: String,
    pub rep: u32,
    pub seq: u32,
    #[serde(alias = "text")]
    pub spec: String,
    #[serde(default)]
    pub token_count: Option<u32>,
    #[serde(default)]
    pub length_band: Option<Band>,
    #[serde(default = "default_status")]
    pub status: RecordStatus,
}

/// A validated candidate spec bound to a slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub candidate_id: String,
    pub slot_id: String,
    pub archetype: Archetype,
    pub complexity: Complexity,
    pub locale: String,
    pub platform: String,
    pub rep: u32,
    pub seq: u32,
    pub spec: String,
    pub token_count: u32,
    pub length_band: Band,
    pub status: RecordStatus,
}

impl CandidateRecord {
    pub fn stratum(&self) -> Stratum {
        Stratum::new(self.archetype, self.complexity, self.locale.clone())
    }

    pub fn stratum_key(&self) -> String {
        format!("{}_{}_{}", self.archetype, self.complexity, self.locale)
    }

    /// Deterministic tie-break key: lowest seq first, then identifier.
    pub fn order_key(&self) -> (u32, &str) {
        (self.seq, self.candidate_id.as_str())
    }

    /// Returns an annotated copy; the text is carried over untouched.
    pub fn with_status(&self, status: RecordStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}

/// Compares two records by their order key.
pub fn by_order_key(a: &CandidateRecord, b: &CandidateRecord) -> Ordering {
    a.order_key().cmp(&b.order_key())
}

/// Compares two records canonically: stratum key, then order key.
pub fn canonical_order(a: &CandidateRecord, b: &CandidateRecord) -> Ordering {
    a.stratum_key()
        .cmp(&b.stratum_key())
        .then_with(|| by_order_key(a, b))
}
