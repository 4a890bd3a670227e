//! End-to-end curation runs over generated candidate pools.

mod common;

use std::collections::{BTreeMap, HashMap};

use golden_forge::bands::Band;
use golden_forge::diversity::{
    estimate_similarity, DiversityConfig, DropReason, MinHasher, SimilarityConfig,
};
use golden_forge::error::{ErrorCode, LockIssue};
use golden_forge::export::{
    write_outputs, BAND_REPORT, DEDUP_REPORT, DIVERSITY_REPORT, SPLITS_FILE, TOP_UP_TRACE,
};
use golden_forge::integrity::{collect_locked_files, derive_seed, verify_lock, LOCKFILE_NAME};
use golden_forge::pipeline::{
    CurationConfig, CurationPipeline, RunOutcome, StageFailure, STAGE_BANDS, STAGE_DIVERSITY,
    STAGE_TOP_UP,
};
use golden_forge::split::SplitLabel;

fn run(lines: &[serde_json::Value], config: CurationConfig) -> RunOutcome {
    let store = common::store(lines);
    CurationPipeline::new(config)
        .unwrap()
        .run(&store, &[])
        .unwrap_or_else(|f| panic!("run failed: {}", f))
}

fn enforcing() -> CurationConfig {
    CurationConfig::default().with_seed(2025).with_enforce(true)
}

fn run_failing(lines: &[serde_json::Value], config: CurationConfig) -> StageFailure {
    let store = common::store(lines);
    match CurationPipeline::new(config).unwrap().run(&store, &[]) {
        Ok(_) => panic!("run was expected to fail"),
        Err(failure) => failure,
    }
}

/// Asserts the failure rendered reports up to `last` and nothing releasable.
fn assert_halted_before_split(failure: &StageFailure, last: &str) {
    let rendered = failure.reports.render().unwrap();
    assert!(rendered.contains_key(DEDUP_REPORT));
    assert!(rendered.contains_key(TOP_UP_TRACE));
    assert!(rendered.contains_key(last));
    assert!(!rendered.contains_key(SPLITS_FILE));
    assert!(!rendered.contains_key(LOCKFILE_NAME));
    assert!(!rendered.keys().any(|name| name.starts_with("artifacts/")));
}

fn all_standard_pool(seed: u64) -> Vec<serde_json::Value> {
    common::candidate_lines_with(seed, |_| 700)
}

#[test]
fn test_same_seed_gives_identical_bytes() {
    let lines = common::candidate_lines(1);
    let a = run(&lines, enforcing()).render().unwrap();
    let b = run(&lines, enforcing()).render().unwrap();
    assert_eq!(a.keys().collect::<Vec<_>>(), b.keys().collect::<Vec<_>>());
    for (name, bytes) in &a {
        assert_eq!(bytes, &b[name], "{} differs between runs", name);
    }
    assert!(a.contains_key(LOCKFILE_NAME));
}

#[test]
fn test_input_order_does_not_matter() {
    let lines = common::candidate_lines(2);
    let mut reversed = lines.clone();
    reversed.reverse();
    let a = run(&lines, enforcing()).render().unwrap();
    let b = run(&reversed, enforcing()).render().unwrap();
    assert_eq!(a[LOCKFILE_NAME], b[LOCKFILE_NAME]);
}

#[test]
fn test_different_seed_changes_split() {
    let lines = common::candidate_lines(3);
    let a = run(&lines, enforcing().with_seed(1));
    let b = run(&lines, enforcing().with_seed(2));
    assert_ne!(a.splits.digest, b.splits.digest);
}

#[test]
fn test_quota_and_split_proportions() {
    let outcome = run(&common::candidate_lines(4), enforcing());
    assert_eq!(outcome.items().len(), 70);

    let mut per_stratum: BTreeMap<String, usize> = BTreeMap::new();
    for item in outcome.items() {
        *per_stratum.entry(item.stratum_key()).or_insert(0) += 1;
    }
    assert_eq!(per_stratum.len(), 14);
    assert!(per_stratum.values().all(|&n| n == 5));

    assert_eq!(outcome.splits.ids(SplitLabel::Train).len(), 42);
    assert_eq!(outcome.splits.ids(SplitLabel::Val).len(), 14);
    assert_eq!(outcome.splits.ids(SplitLabel::Test).len(), 14);
    for counts in outcome.splits.per_stratum.values() {
        assert_eq!(counts[&SplitLabel::Train], 3);
        assert_eq!(counts[&SplitLabel::Val], 1);
        assert_eq!(counts[&SplitLabel::Test], 1);
    }

    let seqs: Vec<u32> = outcome.items().iter().map(|r| r.seq).collect();
    assert_eq!(seqs, (1..=70).collect::<Vec<u32>>());
}

#[test]
fn test_band_mix_within_tolerance() {
    let outcome = run(&common::candidate_lines(5), enforcing());
    let bands = outcome.reports.bands.as_ref().unwrap();
    assert!(bands.pass);
    assert_eq!(bands.count(Band::Short), 14);
    assert_eq!(bands.count(Band::Standard), 42);
    assert_eq!(bands.count(Band::Extended), 14);
}

#[test]
fn test_blog_scenario_drop_trim_and_no_top_up() {
    let mut lines = common::candidate_lines(6);
    common::duplicate(&mut lines, "blog_MVP_en", 2, 5);
    let outcome = run(&lines, enforcing());

    let dedup = outcome.reports.dedup.as_ref().unwrap();
    let drop = dedup
        .drops
        .iter()
        .find(|d| d.stratum == "blog_MVP_en")
        .expect("blog drop");
    assert_eq!(drop.dropped_id, common::candidate_id("blog_MVP_en", 5));
    assert_eq!(drop.kept_id, common::candidate_id("blog_MVP_en", 2));
    assert_eq!(drop.reason, DropReason::DedupDrop);
    assert!(drop.similarity >= 0.85);

    let blog_sources: Vec<String> = outcome
        .items()
        .iter()
        .filter(|r| r.stratum_key() == "blog_MVP_en")
        .map(|r| r.candidate_id.clone())
        .collect();
    let expected: Vec<String> = [1, 2, 3, 4, 6]
        .iter()
        .map(|&s| common::candidate_id("blog_MVP_en", s))
        .collect();
    assert_eq!(blog_sources, expected);

    let trace = outcome.reports.top_up.as_ref().unwrap();
    assert_eq!(trace.strata["blog_MVP_en"].added, 0);
    assert_eq!(trace.added(), 0);
}

#[test]
fn test_dedup_soundness() {
    let mut lines = common::candidate_lines(7);
    common::duplicate(&mut lines, "notes_Pro_en", 1, 3);
    common::duplicate(&mut lines, "store_MVP_en", 4, 2);
    let config = enforcing();
    let outcome = run(&lines, config.clone());

    let hasher = MinHasher::from_config(
        &SimilarityConfig::default(),
        derive_seed(config.seed, "similarity"),
    );
    let signatures: HashMap<String, Vec<u64>> = common::store(&lines)
        .records()
        .iter()
        .map(|r| (r.candidate_id.clone(), hasher.signature(&r.spec)))
        .collect();

    let kept: Vec<&str> = outcome
        .items()
        .iter()
        .map(|r| r.candidate_id.as_str())
        .collect();
    for (i, a) in kept.iter().enumerate() {
        for b in &kept[i + 1..] {
            let sim = estimate_similarity(&signatures[*a], &signatures[*b]);
            assert!(sim < 0.85, "{} and {} are near-duplicates ({})", a, b, sim);
        }
    }

    let dedup = outcome.reports.dedup.as_ref().unwrap();
    assert_eq!(dedup.drops.len(), 2);
    for drop in &dedup.drops {
        let sim = estimate_similarity(
            &signatures[&drop.dropped_id],
            &signatures[&drop.kept_id],
        );
        assert!(sim >= 0.85);
    }
}

#[test]
fn test_exhausted_pool_halts_before_split() {
    let lines = common::truncate_stratum(common::candidate_lines(8), "chat_Pro_en", 4);
    let store = common::store(&lines);
    let failure = CurationPipeline::new(enforcing())
        .unwrap()
        .run(&store, &[])
        .unwrap_err();

    assert_eq!(failure.stage, STAGE_TOP_UP);
    assert_eq!(failure.error.code(), ErrorCode::TopUpErr);
    assert!(failure.error.to_string().contains("chat_Pro_en"));
    assert!(failure.reports.diversity.is_none());
    assert!(failure.reports.bands.is_none());

    let rendered = failure.reports.render().unwrap();
    assert!(rendered.contains_key(DEDUP_REPORT));
    assert!(rendered.contains_key(TOP_UP_TRACE));
    assert!(!rendered.contains_key(SPLITS_FILE));
    assert!(!rendered.contains_key(LOCKFILE_NAME));
}

#[test]
fn test_reserve_pool_restores_quota() {
    let all = common::candidate_lines(9);
    let lines = common::truncate_stratum(all.clone(), "chat_Pro_en", 4);
    let reserve_lines: Vec<serde_json::Value> = all
        .into_iter()
        .filter(|l| l["id"] == common::candidate_id("chat_Pro_en", 6))
        .collect();

    let store = common::store(&lines);
    let reserve = common::store(&reserve_lines).into_records();
    let outcome = CurationPipeline::new(enforcing())
        .unwrap()
        .run(&store, &reserve)
        .unwrap_or_else(|f| panic!("run failed: {}", f));

    assert_eq!(outcome.items().len(), 70);
    let trace = outcome.reports.top_up.as_ref().unwrap();
    assert_eq!(trace.strata["chat_Pro_en"].added, 1);
}

#[tokio::test]
async fn test_lock_detects_single_byte_change() {
    let outcome = run(&common::candidate_lines(10), enforcing());
    let dir = tempfile::tempdir().unwrap();
    write_outputs(dir.path(), &outcome.render().unwrap())
        .await
        .unwrap();

    let lock_bytes = tokio::fs::read(dir.path().join(LOCKFILE_NAME)).await.unwrap();
    let files = collect_locked_files(dir.path()).await.unwrap();
    assert!(verify_lock(&lock_bytes, &files).is_ok());

    let target = dir.path().join("artifacts/train.jsonl");
    let mut bytes = tokio::fs::read(&target).await.unwrap();
    bytes[10] ^= 0x01;
    tokio::fs::write(&target, &bytes).await.unwrap();

    let files = collect_locked_files(dir.path()).await.unwrap();
    let err = verify_lock(&lock_bytes, &files).unwrap_err();
    assert_eq!(err.code(), ErrorCode::LockErr);
    match err {
        golden_forge::CurationError::Lock { issues } => {
            assert!(issues.iter().any(|i| matches!(
                i,
                LockIssue::DigestMismatch { name, .. } if name == "artifacts/train.jsonl"
            )));
        }
        other => panic!("unexpected error {}", other),
    }
}

#[test]
fn test_single_cluster_stratum_fails_cluster_count() {
    let mut lines = common::candidate_lines(11);
    common::collapse_stratum(&mut lines, "notes_MVP_en", &[1, 2, 3, 4, 5, 6, 7], 111);

    let failure = run_failing(&lines, enforcing());
    assert_eq!(failure.stage, STAGE_DIVERSITY);
    assert_eq!(failure.error.code(), ErrorCode::DivCErr);
    assert!(failure.error.to_string().contains("notes_MVP_en"));

    let dedup = failure.reports.dedup.as_ref().unwrap();
    assert!(dedup.drops.iter().all(|d| d.stratum != "notes_MVP_en"));
    let diversity = failure.reports.diversity.as_ref().unwrap();
    let stratum = &diversity.strata["notes_MVP_en"];
    assert_eq!(stratum.cluster_count, 1);
    assert!(!stratum.clusters_pass);
    assert!(failure.reports.bands.is_none());
    assert_halted_before_split(&failure, DIVERSITY_REPORT);
}

#[test]
fn test_diversity_failure_is_advisory_without_enforce() {
    let mut lines = common::candidate_lines(12);
    common::collapse_stratum(&mut lines, "notes_MVP_en", &[1, 2, 3, 4, 5, 6, 7], 112);

    let outcome = run(&lines, enforcing().with_enforce(false));
    let diversity = outcome.reports.diversity.as_ref().unwrap();
    assert!(!diversity.pass);
    assert_eq!(outcome.items().len(), 70);
    assert!(outcome.render().unwrap().contains_key(LOCKFILE_NAME));
}

#[test]
fn test_skewed_clusters_fail_entropy() {
    let mut lines = common::candidate_lines(13);
    common::collapse_stratum(&mut lines, "store_Pro_en", &[1, 2, 3, 4], 113);
    let config = enforcing().with_diversity(DiversityConfig {
        min_entropy: 0.6,
        ..DiversityConfig::default()
    });

    let failure = run_failing(&lines, config);
    assert_eq!(failure.stage, STAGE_DIVERSITY);
    assert_eq!(failure.error.code(), ErrorCode::DivHErr);

    let diversity = failure.reports.diversity.as_ref().unwrap();
    let stratum = &diversity.strata["store_Pro_en"];
    assert_eq!(stratum.cluster_count, 2);
    assert!(stratum.clusters_pass);
    assert!(!stratum.entropy_pass);
    assert!(stratum.entropy < 0.6);
    assert_halted_before_split(&failure, DIVERSITY_REPORT);
}

#[test]
fn test_all_standard_pool_fails_band_mix() {
    let failure = run_failing(&all_standard_pool(14), enforcing());
    assert_eq!(failure.stage, STAGE_BANDS);
    assert_eq!(failure.error.code(), ErrorCode::BandMixErr);

    let diversity = failure.reports.diversity.as_ref().unwrap();
    assert!(diversity.pass);
    let bands = failure.reports.bands.as_ref().unwrap();
    assert!(!bands.pass);
    assert_eq!(bands.count(Band::Short), 0);
    assert_eq!(bands.count(Band::Standard), 70);
    assert_halted_before_split(&failure, BAND_REPORT);
}
