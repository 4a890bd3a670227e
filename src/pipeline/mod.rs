//! Pipeline orchestration for a curation run.
//!
//! This module turns an oversubscribed candidate pool into the final
//! stratified dataset and its reports.
//!
//! # Architecture
//!
//! - **Config**: Seed, stratum grid and stage parameters (YAML + environment)
//! - **Runner**: Executes the stages in order and collects their reports
//!
//! # Pipeline Flow
//!
//! 1. **Dedup**: MinHash near-duplicate groups, keep/drop, surplus trim to R
//! 2. **Top-Up**: Refill short strata from the pool and reserve
//! 3. **Diversity**: TF-IDF clustering and entropy per stratum
//! 4. **Bands**: Global SHORT/STANDARD/EXTENDED mix
//! 5. **Split**: Deterministic 3/1/1 per stratum
//! 6. **Package**: Split artifacts, then the lockfile over all locked outputs
//!
//! # Example
//!
//! ```rust,ignore
//! use golden_forge::pipeline::{CurationConfig, CurationPipeline};
//!
//! let config = CurationConfig::new().with_seed(2025).with_enforce(true);
//! let pipeline = CurationPipeline::new(config)?;
//!
//! match pipeline.run(&store, &reserve) {
//!     Ok(outcome) => write_outputs(&out_dir, &outcome.render()?).await?,
//!     Err(failure) => {
//!         write_outputs(&out_dir, &failure.reports.render()?).await?;
//!         return Err(failure.error.into());
//!     }
//! }
//! ```

pub mod config;
pub mod runner;

// Re-export main types for convenience
pub use config::{ConfigError, CurationConfig, DEFAULT_SEED};
pub use runner::{
    CurationPipeline, RunOutcome, StageFailure, StageReports, STAGE_BANDS, STAGE_DEDUP,
    STAGE_DIVERSITY, STAGE_PACKAGE, STAGE_SPLIT, STAGE_TOP_UP,
};
