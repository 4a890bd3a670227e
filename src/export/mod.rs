//! Export module for curation outputs.
//!
//! Provides the canonical JSON writer, the split packager and the relative
//! paths of every file a run writes under its output directory.

pub mod canonical;
pub mod package;

pub use canonical::{
    from_jsonl, read_json, round_float, to_canonical_json, to_canonical_jsonl, write_bytes,
    write_outputs,
};
pub use package::{Package, PackagedItem};

pub const DEDUP_REPORT: &str = "reports/dedup_report.json";
pub const TOP_UP_TRACE: &str = "reports/top_up_trace.json";
pub const DIVERSITY_REPORT: &str = "reports/diversity_report.json";
pub const BAND_REPORT: &str = "reports/band_report.json";
pub const SPLITS_FILE: &str = "splits.json";
pub const GOLDEN_ARTIFACT: &str = "artifacts/golden.jsonl";

/// Intermediate record sets; never locked.
pub const DEDUPED_STAGE: &str = "stages/deduped.jsonl";
pub const TOPPED_STAGE: &str = "stages/topped.jsonl";

/// Relative path of the `{name}.jsonl` artifact.
pub fn artifact_path(name: &str) -> String {
    format!("artifacts/{}.jsonl", name)
}
