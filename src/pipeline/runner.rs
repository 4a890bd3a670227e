//! Curation pipeline runner.
//!
//! Chains the stages in dependency order:
//!
//! dedup -> top-up -> diversity -> bands -> split -> package
//!
//! Every stage is a synchronous, pure function of its input set, the
//! configuration and its own sub-seed. A failing stage halts the run; the
//! reports built so far (including the failing stage's own) travel with the
//! error so they can still be written.

use std::collections::BTreeMap;
use std::time::Instant;

use tracing::{error, info};

use crate::bands::{Band, BandClassifier, BandReport};
use crate::diversity::{
    DedupController, DedupOutcome, DedupReport, DiversityEngine, DiversityReport, TopUpController,
    TopUpFailure, TopUpOutcome, TopUpResult, TopUpTrace,
};
use crate::error::{CurationError, ExportError};
use crate::export::{
    to_canonical_json, to_canonical_jsonl, Package, BAND_REPORT, DEDUPED_STAGE, DEDUP_REPORT,
    DIVERSITY_REPORT, SPLITS_FILE, TOPPED_STAGE, TOP_UP_TRACE,
};
use crate::integrity::{derive_seed, Lockfile, LOCKFILE_NAME};
use crate::metrics::MetricsCollector;
use crate::split::{Splits, Splitter};
use crate::storage::{CandidateRecord, CandidateStore};

use super::config::{ConfigError, CurationConfig};

/// Stage names, also used as sub-seed labels and metric labels.
pub const STAGE_DEDUP: &str = "dedup";
pub const STAGE_TOP_UP: &str = "top_up";
pub const STAGE_DIVERSITY: &str = "diversity";
pub const STAGE_BANDS: &str = "bands";
pub const STAGE_SPLIT: &str = "split";
pub const STAGE_PACKAGE: &str = "package";

/// Sub-seed label of the MinHash family, shared by dedup and top-up.
const SIMILARITY_SEED: &str = "similarity";

/// Reports and record sets produced by the stages that have run.
#[derive(Debug, Clone, Default)]
pub struct StageReports {
    pub dedup: Option<DedupReport>,
    /// Dedup survivors (`stages/deduped.jsonl`).
    pub deduped: Option<Vec<CandidateRecord>>,
    pub top_up: Option<TopUpTrace>,
    /// Final items (`stages/topped.jsonl`).
    pub topped: Option<Vec<CandidateRecord>>,
    pub diversity: Option<DiversityReport>,
    pub bands: Option<BandReport>,
}

impl StageReports {
    /// Renders every available report and stage file as
    /// `relative path -> bytes`.
    pub fn render(&self) -> Result<BTreeMap<String, Vec<u8>>, ExportError> {
        let mut out = BTreeMap::new();
        if let Some(report) = &self.dedup {
            out.insert(DEDUP_REPORT.to_string(), to_canonical_json(report)?);
        }
        if let Some(records) = &self.deduped {
            out.insert(DEDUPED_STAGE.to_string(), to_canonical_jsonl(records)?);
        }
        if let Some(trace) = &self.top_up {
            out.insert(TOP_UP_TRACE.to_string(), to_canonical_json(trace)?);
        }
        if let Some(records) = &self.topped {
            out.insert(TOPPED_STAGE.to_string(), to_canonical_jsonl(records)?);
        }
        if let Some(report) = &self.diversity {
            out.insert(DIVERSITY_REPORT.to_string(), to_canonical_json(report)?);
        }
        if let Some(report) = &self.bands {
            out.insert(BAND_REPORT.to_string(), to_canonical_json(report)?);
        }
        Ok(out)
    }
}

/// A halted run: the failure plus everything produced before it.
#[derive(Debug)]
pub struct StageFailure {
    pub stage: &'static str,
    pub error: CurationError,
    pub reports: StageReports,
}

impl std::fmt::Display for StageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stage '{}' failed: {}", self.stage, self.error)
    }
}

/// A completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub reports: StageReports,
    pub splits: Splits,
    pub package: Package,
}

impl RunOutcome {
    /// Final items in canonical order.
    pub fn items(&self) -> &[CandidateRecord] {
        self.reports.topped.as_deref().unwrap_or(&[])
    }

    /// Renders every output file, including the lockfile over the locked
    /// subset.
    pub fn render(&self) -> Result<BTreeMap<String, Vec<u8>>, ExportError> {
        let mut out = self.reports.render()?;
        out.insert(SPLITS_FILE.to_string(), to_canonical_json(&self.splits)?);
        out.extend(self.package.render()?);

        let lockfile = Lockfile::lock(&out);
        out.insert(LOCKFILE_NAME.to_string(), to_canonical_json(&lockfile)?);
        Ok(out)
    }
}

/// Runs curation stages over a candidate store.
#[derive(Debug, Clone)]
pub struct CurationPipeline {
    config: CurationConfig,
    metrics: MetricsCollector,
}

impl CurationPipeline {
    /// Creates a pipeline after validating `config`.
    pub fn new(config: CurationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            metrics: MetricsCollector::new(),
        })
    }

    pub fn config(&self) -> &CurationConfig {
        &self.config
    }

    fn similarity_seed(&self) -> u64 {
        derive_seed(self.config.seed, SIMILARITY_SEED)
    }

    fn dedup_controller(&self) -> DedupController {
        DedupController::new(
            self.config.similarity.clone(),
            self.config.replication,
            self.similarity_seed(),
        )
    }

    /// Near-duplicate removal and surplus trimming.
    pub fn dedup(&self, candidates: &[CandidateRecord]) -> DedupOutcome {
        let started = Instant::now();
        let outcome = self.dedup_controller().dedup(candidates);

        let trimmed = outcome.report.surplus.len();
        self.metrics
            .record_stage_records(STAGE_DEDUP, "kept", outcome.kept.len());
        self.metrics
            .record_stage_records(STAGE_DEDUP, "dropped", outcome.report.drops.len());
        self.metrics
            .record_stage_records(STAGE_DEDUP, "trimmed", trimmed);
        self.metrics
            .record_stage_duration(STAGE_DEDUP, started.elapsed().as_secs_f64());
        outcome
    }

    /// Quota restoration from `pool`, then `reserve`, followed by
    /// finalisation of ids.
    pub fn top_up(
        &self,
        kept: &[CandidateRecord],
        pool: &[CandidateRecord],
        reserve: &[CandidateRecord],
    ) -> Result<TopUpResult, TopUpFailure> {
        let started = Instant::now();
        let controller = TopUpController::new(
            self.dedup_controller().hasher().clone(),
            self.config.similarity.threshold,
            self.config.replication,
            self.config.strata(),
        );
        let result = controller.top_up(kept, pool, reserve);

        let trace = match &result {
            Ok(done) => &done.trace,
            Err(failure) => &failure.trace,
        };
        for (outcome, label) in [
            (TopUpOutcome::Accepted, "accepted"),
            (TopUpOutcome::Rejected, "rejected"),
            (TopUpOutcome::Skipped, "skipped"),
        ] {
            let count = trace.entries.iter().filter(|e| e.outcome == outcome).count();
            self.metrics
                .record_stage_records(STAGE_TOP_UP, label, count);
        }
        self.metrics
            .record_stage_duration(STAGE_TOP_UP, started.elapsed().as_secs_f64());
        result
    }

    /// TF-IDF clustering and entropy per stratum. The report is returned
    /// even when the check fails.
    pub fn diversity(
        &self,
        items: &[CandidateRecord],
    ) -> (DiversityReport, Result<(), CurationError>) {
        let started = Instant::now();
        let engine = DiversityEngine::new(
            self.config.diversity.clone(),
            derive_seed(self.config.seed, STAGE_DIVERSITY),
        );
        let report = engine.score(items);
        for (stratum, scores) in &report.strata {
            self.metrics.set_stratum_entropy(stratum, scores.entropy);
        }
        self.metrics
            .record_stage_duration(STAGE_DIVERSITY, started.elapsed().as_secs_f64());
        let check = report.check(self.config.enforce);
        (report, check)
    }

    /// Global band mix. The report is returned even when the check fails.
    pub fn bands(&self, items: &[CandidateRecord]) -> (BandReport, Result<(), CurationError>) {
        let started = Instant::now();
        let report = BandClassifier::new(self.config.bands.clone()).verify(items);
        for band in Band::ALL {
            self.metrics.set_band_count(band.as_str(), report.count(band));
        }
        self.metrics
            .record_stage_duration(STAGE_BANDS, started.elapsed().as_secs_f64());
        let check = report.check(self.config.enforce);
        (report, check)
    }

    /// Stratified train/val/test assignment.
    pub fn split(&self, items: &[CandidateRecord]) -> Result<Splits, CurationError> {
        let started = Instant::now();
        let splitter = Splitter::new(
            self.config.split,
            self.config.replication,
            self.config.strata(),
            derive_seed(self.config.seed, STAGE_SPLIT),
        );
        let result = splitter.split(items);
        self.metrics
            .record_stage_duration(STAGE_SPLIT, started.elapsed().as_secs_f64());
        result
    }

    /// Runs every stage over `store`, using the store itself as the top-up
    /// pool and `reserve` as the fallback pool.
    pub fn run(
        &self,
        store: &CandidateStore,
        reserve: &[CandidateRecord],
    ) -> Result<RunOutcome, StageFailure> {
        let started = Instant::now();
        info!(
            seed = self.config.seed,
            candidates = store.len(),
            reserve = reserve.len(),
            strata = self.config.strata().len(),
            replication = self.config.replication,
            "Starting curation run"
        );

        let mut reports = StageReports::default();

        let deduped = self.dedup(store.records());
        reports.dedup = Some(deduped.report);
        reports.deduped = Some(deduped.kept.clone());

        let topped = match self.top_up(&deduped.kept, store.records(), reserve) {
            Ok(done) => done,
            Err(failure) => {
                reports.top_up = Some(failure.trace);
                return Err(self.fail(STAGE_TOP_UP, failure.error, reports));
            }
        };
        reports.top_up = Some(topped.trace);
        let items = topped.records;
        reports.topped = Some(items.clone());

        let (diversity, check) = self.diversity(&items);
        reports.diversity = Some(diversity);
        if let Err(e) = check {
            return Err(self.fail(STAGE_DIVERSITY, e, reports));
        }

        let (bands, check) = self.bands(&items);
        reports.bands = Some(bands);
        if let Err(e) = check {
            return Err(self.fail(STAGE_BANDS, e, reports));
        }

        let splits = match self.split(&items) {
            Ok(splits) => splits,
            Err(e) => return Err(self.fail(STAGE_SPLIT, e, reports)),
        };

        let package = match Package::build(&items, &splits) {
            Ok(package) => package,
            Err(e) => {
                return Err(self.fail(
                    STAGE_PACKAGE,
                    CurationError::Split(e.to_string()),
                    reports,
                ))
            }
        };

        info!(
            items = items.len(),
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Curation run complete"
        );
        Ok(RunOutcome {
            reports,
            splits,
            package,
        })
    }

    fn fail(
        &self,
        stage: &'static str,
        error: CurationError,
        reports: StageReports,
    ) -> StageFailure {
        let code = error.code();
        error!(stage, code = %code, error = %error, "Curation stage failed");
        self.metrics.record_failure(stage, code.as_str());
        StageFailure {
            stage,
            error,
            reports,
        }
    }
}
