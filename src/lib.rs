//! golden-forge: curation and integrity engine for stratified golden datasets.
//!
//! This library takes an oversubscribed pool of validated candidate specs and
//! turns it into a fixed-size dataset (R items per stratum) with guaranteed
//! near-duplicate removal, per-stratum diversity, a controlled length-band
//! mix, a stratified split and a tamper-evident lockfile. Every output is a
//! pure function of the input and the run seed.

// Core modules
pub mod bands;
pub mod cli;
pub mod diversity;
pub mod error;
pub mod export;
pub mod integrity;
pub mod metrics;
pub mod pipeline;
pub mod split;
pub mod storage;

// Re-export commonly used error types
pub use error::{CurationError, ErrorCode, ExportError, LockIssue, StoreError};
