//! Similarity, deduplication, top-up and diversity scoring for golden specs.
//!
//! This module holds every stage that reasons about how alike two specs are.
//!
//! # Overview
//!
//! A golden dataset is only useful if its items are genuinely different:
//! - **Near-duplicates** make two slots measure the same thing twice
//! - **Collapsed strata** (every blog spec says the same) hide regressions
//! - **Quota gaps** left by dedup break the stratified design
//!
//! The components, in pipeline order:
//!
//! 1. **Text** - Normalization, tokenization and word shingles
//! 2. **MinHash** - Seeded signatures, LSH banding, near-duplicate groups
//! 3. **Dedup** - Deterministic keep/drop per group, surplus trimming
//! 4. **Top-up** - Refills strata from the pool without new near-duplicates
//! 5. **TF-IDF / Clustering / Metrics** - Per-stratum cluster entropy checks
//!
//! # Usage
//!
//! ## Deduplicating Candidates
//!
//! ```rust,ignore
//! use golden_forge::diversity::{DedupController, SimilarityConfig};
//!
//! let controller = DedupController::new(SimilarityConfig::default(), 5, seed);
//! let outcome = controller.dedup(store.records());
//! println!("Kept {} of {}", outcome.report.kept_total, outcome.report.candidates_total);
//! ```
//!
//! ## Measuring Diversity
//!
//! ```rust,ignore
//! use golden_forge::diversity::{DiversityConfig, DiversityEngine};
//!
//! let report = DiversityEngine::new(DiversityConfig::default(), seed).score(&items);
//! report.check(enforce)?;
//! ```
//!
//! # Similarity Approach
//!
//! Near-duplicate detection uses MinHash over word 3-gram shingles, so it is
//! sensitive to shared phrasing. Diversity uses TF-IDF cosine similarity over
//! unigrams and bigrams, so it is sensitive to shared topic vocabulary. No
//! learned embedding model is involved.

pub mod clustering;
pub mod dedup;
pub mod engine;
pub mod metrics;
pub mod minhash;
pub mod text;
pub mod tfidf;
pub mod topup;

// Re-export main types for convenience
pub use clustering::{kmeans_clusters, threshold_clusters, ClusteringMethod};
pub use dedup::{
    DedupController, DedupOutcome, DedupReport, DropDecision, DropReason, GroupSummary,
    TrimDecision, DEFAULT_REPLICATION,
};
pub use engine::{
    ArchetypeBalance, DiversityConfig, DiversityEngine, DiversityReport, StratumDiversity,
};
pub use metrics::{gini_coefficient, normalized_entropy, shannon_entropy};
pub use minhash::{
    estimate_similarity, MinHasher, NearDuplicateGroup, Signature, SimilarityConfig,
    SimilarityIndex, UnionFind,
};
pub use text::{count_tokens, normalize_text, shingles, tokenize};
pub use tfidf::{pairwise_cosine_similarity, TfidfVectorizer};
pub use topup::{
    finalize, PoolSource, StratumTopUp, TopUpController, TopUpEntry, TopUpFailure, TopUpOutcome,
    TopUpReason, TopUpResult, TopUpTrace,
};
