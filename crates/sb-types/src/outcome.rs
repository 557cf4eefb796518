//! Trial outcomes and per-trial lifecycle state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::errors::TrialFailure;
use crate::trial::TrialSpec;

/// Logical compute-device index in `[0, pool_size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceSlot(pub usize);

impl DeviceSlot {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for DeviceSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of one trial inside a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialState {
    Pending,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    LaunchError,
}

impl TrialState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::LaunchError => "launch_error",
        }
    }
}

impl fmt::Display for TrialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&TrialFailure> for TrialState {
    fn from(failure: &TrialFailure) -> Self {
        match failure {
            TrialFailure::Launch(_) => Self::LaunchError,
            TrialFailure::Timeout => Self::TimedOut,
            TrialFailure::Process { .. } | TrialFailure::Internal(_) => Self::Failed,
        }
    }
}

/// Terminal record of a single trial. Exactly one exists per submitted spec.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialOutcome {
    spec: TrialSpec,
    state: TrialState,
    succeeded: bool,
    duration_seconds: f64,
    artifact_path: PathBuf,
    device_slot: DeviceSlot,
    error_detail: Option<String>,
}

impl TrialOutcome {
    pub fn success(
        spec: TrialSpec,
        device_slot: DeviceSlot,
        duration_seconds: f64,
        artifact_path: PathBuf,
    ) -> Self {
        Self {
            spec,
            state: TrialState::Succeeded,
            succeeded: true,
            duration_seconds,
            artifact_path,
            device_slot,
            error_detail: None,
        }
    }

    pub fn failure(
        spec: TrialSpec,
        device_slot: DeviceSlot,
        duration_seconds: f64,
        artifact_path: PathBuf,
        failure: TrialFailure,
    ) -> Self {
        let detail = match &failure {
            TrialFailure::Process { stderr, .. } if stderr.trim().is_empty() => {
                "Unknown error".to_string()
            }
            other => other.to_string(),
        };
        Self {
            spec,
            state: TrialState::from(&failure),
            succeeded: false,
            duration_seconds,
            artifact_path,
            device_slot,
            error_detail: Some(detail),
        }
    }

    pub fn spec(&self) -> &TrialSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        self.spec.name()
    }

    pub fn state(&self) -> TrialState {
        self.state
    }

    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    pub fn device_slot(&self) -> DeviceSlot {
        self.device_slot
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }
}

/// Longest prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> TrialSpec {
        TrialSpec::new("baseline", "").unwrap()
    }

    #[test]
    fn success_has_no_error() {
        let outcome = TrialOutcome::success(spec(), DeviceSlot(1), 2.5, "out/baseline.ply".into());
        assert!(outcome.succeeded());
        assert_eq!(outcome.state(), TrialState::Succeeded);
        assert!(outcome.error_detail().is_none());
        assert_eq!(outcome.device_slot().index(), 1);
    }

    #[test]
    fn failure_maps_taxonomy_to_state() {
        let cases = [
            (TrialFailure::Timeout, TrialState::TimedOut, "Timeout"),
            (
                TrialFailure::Launch("No such file or directory".into()),
                TrialState::LaunchError,
                "No such file or directory",
            ),
            (
                TrialFailure::Process {
                    code: Some(2),
                    stderr: "CUDA out of memory".into(),
                },
                TrialState::Failed,
                "CUDA out of memory",
            ),
            (
                TrialFailure::Process {
                    code: Some(1),
                    stderr: "  ".into(),
                },
                TrialState::Failed,
                "Unknown error",
            ),
        ];

        for (failure, state, detail) in cases {
            let outcome = TrialOutcome::failure(spec(), DeviceSlot(0), 1.0, PathBuf::new(), failure);
            assert!(!outcome.succeeded());
            assert!(outcome.state().is_terminal());
            assert_eq!(outcome.state(), state);
            assert_eq!(outcome.error_detail(), Some(detail));
        }
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("ab", 3), "ab");
        assert_eq!(truncate_chars("显存不足错误", 2), "显存");
    }
}
