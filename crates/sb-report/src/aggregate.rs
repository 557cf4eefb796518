//! Run aggregation: counts, timing comparison, grouping and artifact extremes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;
use uuid::Uuid;

use sb_types::{truncate_chars, TrialOutcome, TrialState};

use crate::artifact::{ArtifactMetrics, ArtifactStats, SizeExtremes};
use crate::grouping::{Category, GroupingRules};

/// Error text kept per failure in the summary. The outcome keeps the full text.
pub const FAILURE_DETAIL_CHARS: usize = 500;

/// `sequential / elapsed`, only when the parallel run was strictly faster.
pub fn speedup(sequential_seconds: f64, elapsed_seconds: f64) -> Option<f64> {
    (elapsed_seconds > 0.0 && elapsed_seconds < sequential_seconds)
        .then(|| sequential_seconds / elapsed_seconds)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureSummary {
    pub name: String,
    pub state: TrialState,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub launch_errors: usize,
    pub failures: Vec<FailureSummary>,
    /// Sum of per-trial durations: what a one-worker run would have taken.
    pub sequential_seconds: f64,
    pub elapsed_seconds: f64,
    pub speedup: Option<f64>,
}

impl RunSummary {
    pub fn compute(outcomes: &[TrialOutcome], elapsed_seconds: f64) -> Self {
        let count = |state: TrialState| outcomes.iter().filter(|o| o.state() == state).count();

        let failures = outcomes
            .iter()
            .filter(|o| !o.succeeded())
            .map(|o| FailureSummary {
                name: o.name().to_string(),
                state: o.state(),
                error: truncate_chars(o.error_detail().unwrap_or("Unknown error"), FAILURE_DETAIL_CHARS)
                    .to_string(),
            })
            .collect();

        let sequential_seconds: f64 = outcomes.iter().map(|o| o.duration_seconds()).sum();

        Self {
            total: outcomes.len(),
            succeeded: count(TrialState::Succeeded),
            failed: count(TrialState::Failed),
            timed_out: count(TrialState::TimedOut),
            launch_errors: count(TrialState::LaunchError),
            failures,
            sequential_seconds,
            elapsed_seconds,
            speedup: speedup(sequential_seconds, elapsed_seconds),
        }
    }

    pub fn failure_count(&self) -> usize {
        self.total - self.succeeded
    }
}

/// Grouped view over a set of artifacts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactComparison {
    pub artifacts: Vec<ArtifactMetrics>,
    pub categories: Vec<Category>,
    pub stats: Option<ArtifactStats>,
    pub extremes: Option<SizeExtremes>,
}

impl ArtifactComparison {
    pub fn new(artifacts: Vec<ArtifactMetrics>, rules: &GroupingRules) -> Self {
        let categories = rules.group(artifacts.iter().map(|a| a.name.as_str()));
        let stats = ArtifactStats::compute(&artifacts);
        let extremes = SizeExtremes::compute(&artifacts);
        Self {
            artifacts,
            categories,
            stats,
            extremes,
        }
    }

    pub fn get(&self, name: &str) -> Option<&ArtifactMetrics> {
        self.artifacts.iter().find(|a| a.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

/// Facts about the run that the outcomes themselves do not carry.
#[derive(Debug, Clone, PartialEq)]
pub struct RunContext {
    pub tool: PathBuf,
    pub dataset: PathBuf,
    pub worker_count: usize,
    pub elapsed_seconds: f64,
}

/// Everything written out after a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub tool: PathBuf,
    pub dataset: PathBuf,
    pub worker_count: usize,
    pub summary: RunSummary,
    pub outcomes: Vec<TrialOutcome>,
    /// Every trial name, by category.
    pub categories: Vec<Category>,
    pub comparison: ArtifactComparison,
}

impl RunReport {
    pub fn outcome(&self, name: &str) -> Option<&TrialOutcome> {
        self.outcomes.iter().find(|o| o.name() == name)
    }
}

/// Stateless; one instance can aggregate any number of runs.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    rules: GroupingRules,
}

impl Aggregator {
    pub fn new(rules: GroupingRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &GroupingRules {
        &self.rules
    }

    /// Build the report. Artifacts whose name does not belong to a succeeded
    /// outcome are ignored.
    pub fn aggregate(
        &self,
        outcomes: Vec<TrialOutcome>,
        artifacts: Vec<ArtifactMetrics>,
        context: RunContext,
    ) -> RunReport {
        let summary = RunSummary::compute(&outcomes, context.elapsed_seconds);
        let categories = self.rules.group(outcomes.iter().map(|o| o.name()));

        let artifacts: Vec<ArtifactMetrics> = artifacts
            .into_iter()
            .filter(|a| outcomes.iter().any(|o| o.succeeded() && o.name() == a.name))
            .collect();
        let comparison = ArtifactComparison::new(artifacts, &self.rules);

        debug!(
            total = summary.total,
            succeeded = summary.succeeded,
            artifacts = comparison.artifacts.len(),
            "aggregated run"
        );

        RunReport {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            tool: context.tool,
            dataset: context.dataset,
            worker_count: context.worker_count,
            summary,
            outcomes,
            categories,
            comparison,
        }
    }

    /// Comparison over artifacts found on disk, without run outcomes.
    pub fn compare(&self, artifacts: Vec<ArtifactMetrics>) -> ArtifactComparison {
        ArtifactComparison::new(artifacts, &self.rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sb_types::{DeviceSlot, TrialFailure, TrialSpec};

    fn ok(name: &str, secs: f64) -> TrialOutcome {
        TrialOutcome::success(
            TrialSpec::new(name, "").unwrap(),
            DeviceSlot(0),
            secs,
            format!("out/{name}.ply").into(),
        )
    }

    fn failed(name: &str, failure: TrialFailure) -> TrialOutcome {
        TrialOutcome::failure(
            TrialSpec::new(name, "").unwrap(),
            DeviceSlot(1),
            0.5,
            format!("out/{name}.ply").into(),
            failure,
        )
    }

    fn artifact(name: &str, size_bytes: u64) -> ArtifactMetrics {
        ArtifactMetrics {
            name: name.into(),
            path: format!("out/{name}.ply").into(),
            size_bytes,
            point_count: size_bytes / 10,
        }
    }

    fn context(elapsed_seconds: f64) -> RunContext {
        RunContext {
            tool: "./opensplat".into(),
            dataset: "./banana".into(),
            worker_count: 2,
            elapsed_seconds,
        }
    }

    #[test]
    fn speedup_only_when_faster() {
        assert_eq!(speedup(3.0, 2.0), Some(1.5));
        assert_eq!(speedup(3.0, 3.0), None);
        assert_eq!(speedup(3.0, 4.0), None);
        assert_eq!(speedup(0.0, 0.0), None);
    }

    #[test]
    fn three_trials_on_two_workers() {
        let outcomes = vec![ok("a", 1.0), ok("b", 1.0), ok("c", 1.0)];
        let summary = RunSummary::compute(&outcomes, 2.0);
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.failure_count(), 0);
        assert_eq!(summary.sequential_seconds, 3.0);
        assert_eq!(summary.speedup, Some(1.5));
    }

    #[test]
    fn failures_are_counted_by_kind_and_truncated() {
        let long = "x".repeat(FAILURE_DETAIL_CHARS + 100);
        let outcomes = vec![
            ok("baseline", 2.0),
            failed("sh_1", TrialFailure::Timeout),
            failed("sh_2", TrialFailure::Launch("no such file".into())),
            failed(
                "sh_3",
                TrialFailure::Process {
                    code: Some(1),
                    stderr: long.clone(),
                },
            ),
        ];
        let summary = RunSummary::compute(&outcomes, 10.0);

        assert_eq!(summary.total, 4);
        assert_eq!(summary.timed_out, 1);
        assert_eq!(summary.launch_errors, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failure_count(), 3);
        assert!(summary.speedup.is_none());

        let names: Vec<&str> = summary.failures.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["sh_1", "sh_2", "sh_3"]);
        assert_eq!(summary.failures[0].error, "Timeout");
        assert_eq!(summary.failures[2].error.chars().count(), FAILURE_DETAIL_CHARS);
        assert_eq!(outcomes[3].error_detail(), Some(long.as_str()));
    }

    #[test]
    fn report_keeps_every_outcome() {
        let outcomes = vec![
            ok("baseline", 4.0),
            ok("scale_2", 2.0),
            failed("scale_4", TrialFailure::Timeout),
            ok("custom", 1.0),
        ];
        let artifacts = vec![
            artifact("baseline", 4000),
            artifact("scale_2", 1000),
            artifact("scale_4", 10),
            artifact("custom", 2000),
        ];

        let report = Aggregator::default().aggregate(outcomes, artifacts, context(5.0));

        assert_eq!(report.outcomes.len(), 4);
        assert!(!report.outcome("scale_4").unwrap().succeeded());
        assert_eq!(report.summary.speedup, Some(7.5 / 5.0));

        let category_names: Vec<&str> = report.categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(category_names, vec!["resolution", "presets", "other"]);
        let members: usize = report.categories.iter().map(|c| c.members.len()).sum();
        assert_eq!(members, 4);

        // The failed trial's leftover file is not compared.
        assert!(report.comparison.get("scale_4").is_none());
        let extremes = report.comparison.extremes.as_ref().unwrap();
        assert_eq!(extremes.largest, "baseline");
        assert_eq!(extremes.smallest, "scale_2");
        assert_eq!(extremes.ratio, Some(4.0));
    }

    #[test]
    fn report_serializes_run_metadata() {
        let report = Aggregator::default().aggregate(vec![ok("a", 1.0)], Vec::new(), context(1.0));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["worker_count"], 2);
        assert_eq!(json["outcomes"][0]["spec"]["name"], "a");
        assert!(json["run_id"].is_string());
        assert!(json["comparison"]["extremes"].is_null());
    }
}
