//! Candidate storage.
//!
//! This module holds the record model every curation stage works on and the
//! store that loads it.
//!
//! # Overview
//!
//! The storage layer consists of:
//! - **Records**: strata, slot identifiers and validated candidate records
//! - **Candidates**: the ordered, de-duplicated-by-id record set loaded from JSONL
//!
//! # Usage
//!
//! ```rust,ignore
//! use golden_forge::storage::{CandidateStore, StoreOptions};
//!
//! let (store, summary) = CandidateStore::load("candidates.jsonl", &StoreOptions::default()).await?;
//! println!("{} candidates, {} excluded", summary.loaded, summary.excluded_status);
//!
//! for record in store.records() {
//!     println!("{}: {}", record.stratum_key(), record.candidate_id);
//! }
//! ```

pub mod candidates;
pub mod record;

// Re-export main types for convenience
pub use candidates::{Admission, CandidateStore, LoadSummary, StoreOptions};
pub use record::{
    by_order_key, canonical_order, Archetype, CandidateInput, CandidateRecord, Complexity,
    RecordStatus, Stratum, DEFAULT_PLATFORM,
};
