//! Error types for golden-forge operations.
//!
//! Defines error types for the major subsystems:
//! - Candidate store loading
//! - Curation stages (top-up, diversity, bands, split, lock)
//! - Report and artifact export

use std::fmt;

use thiserror::Error;

/// Stable error codes surfaced to the operator.
///
/// `DedupDrop` is informational only; every other code stops the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorCode {
    DedupDrop,
    TopUpErr,
    DivCErr,
    DivHErr,
    BandMixErr,
    SplitErr,
    LockErr,
}

impl ErrorCode {
    /// Returns the wire name of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DedupDrop => "DEDUP_DROP",
            ErrorCode::TopUpErr => "TOPUP_ERR",
            ErrorCode::DivCErr => "DIV_C_ERR",
            ErrorCode::DivHErr => "DIV_H_ERR",
            ErrorCode::BandMixErr => "BAND_MIX_ERR",
            ErrorCode::SplitErr => "SPLIT_ERR",
            ErrorCode::LockErr => "LOCK_ERR",
        }
    }

    /// Process exit status used by the CLI for this code.
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorCode::DedupDrop => 0,
            ErrorCode::TopUpErr => 10,
            ErrorCode::DivCErr => 11,
            ErrorCode::DivHErr => 12,
            ErrorCode::BandMixErr => 13,
            ErrorCode::SplitErr => 14,
            ErrorCode::LockErr => 15,
        }
    }

    /// Whether the code halts the pipeline.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ErrorCode::DedupDrop)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single discrepancy found while verifying a lockfile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockIssue {
    /// A locked file is absent.
    Missing { name: String },
    /// A locked file's digest changed.
    DigestMismatch {
        name: String,
        expected: String,
        actual: String,
    },
    /// A file sits in a locked directory but is not listed in the lockfile.
    Unlisted { name: String },
    /// The lockfile's root digest does not match its entries.
    RootMismatch { expected: String, actual: String },
    /// The lockfile itself is malformed.
    Schema(String),
    /// The released dataset violates a count or split invariant.
    Release(String),
}

impl fmt::Display for LockIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockIssue::Missing { name } => write!(f, "missing file '{}'", name),
            LockIssue::DigestMismatch {
                name,
                expected,
                actual,
            } => write!(
                f,
                "digest mismatch for '{}': expected {}, got {}",
                name, expected, actual
            ),
            LockIssue::Unlisted { name } => write!(f, "unlisted file '{}'", name),
            LockIssue::RootMismatch { expected, actual } => {
                write!(f, "root digest mismatch: expected {}, got {}", expected, actual)
            }
            LockIssue::Schema(msg) => write!(f, "lockfile schema violation: {}", msg),
            LockIssue::Release(msg) => write!(f, "release check failed: {}", msg),
        }
    }
}

/// Fatal curation failures. Each maps to exactly one [`ErrorCode`].
#[derive(Debug, Error)]
pub enum CurationError {
    #[error("TOPUP_ERR: stratum '{stratum}' has {have} of {target} items and its pool is exhausted")]
    TopUpExhausted {
        stratum: String,
        have: usize,
        target: usize,
    },

    #[error("DIV_C_ERR: stratum '{stratum}' has {clusters} clusters, minimum is {min}")]
    TooFewClusters {
        stratum: String,
        clusters: usize,
        min: usize,
    },

    #[error("DIV_H_ERR: stratum '{stratum}' entropy {entropy:.4} is below minimum {min:.4}")]
    EntropyTooLow {
        stratum: String,
        entropy: f64,
        min: f64,
    },

    #[error("BAND_MIX_ERR: band {band} has {count} items, target {target} +/- {tolerance}")]
    BandMix {
        band: String,
        count: usize,
        target: usize,
        tolerance: usize,
    },

    #[error("SPLIT_ERR: {0}")]
    Split(String),

    #[error("LOCK_ERR: {} issue(s), first: {}", .issues.len(), first_issue(.issues))]
    Lock { issues: Vec<LockIssue> },
}

fn first_issue(issues: &[LockIssue]) -> String {
    issues
        .first()
        .map(|i| i.to_string())
        .unwrap_or_else(|| "none".to_string())
}

impl CurationError {
    /// Returns the operator-facing code for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            CurationError::TopUpExhausted { .. } => ErrorCode::TopUpErr,
            CurationError::TooFewClusters { .. } => ErrorCode::DivCErr,
            CurationError::EntropyTooLow { .. } => ErrorCode::DivHErr,
            CurationError::BandMix { .. } => ErrorCode::BandMixErr,
            CurationError::Split(_) => ErrorCode::SplitErr,
            CurationError::Lock { .. } => ErrorCode::LockErr,
        }
    }
}

/// Errors that can occur while loading candidate records.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Line {line}: invalid candidate record: {source}")]
    InvalidRecord {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Duplicate candidate id '{0}'")]
    DuplicateId(String),

    #[error("Candidate '{id}' uses unconfigured locale '{locale}'")]
    UnknownLocale { id: String, locale: String },

    #[error("Candidate '{id}' has an empty identifier or text")]
    EmptyField { id: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while writing or reading reports and artifacts.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Artifact '{0}' not found")]
    MissingArtifact(String),

    #[error("Item '{0}' has no split assignment")]
    Unassigned(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
