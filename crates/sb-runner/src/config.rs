//! Runner configuration shared by the scheduler and the process executor.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use sb_types::{config_error, BenchResult};

/// How trials are mapped onto compute devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceAssignment {
    /// Trial `i` runs on slot `i mod worker_count`, fixed before submission.
    #[default]
    RoundRobin,
    /// Each worker owns one slot for its lifetime, so no two running trials
    /// ever share a device.
    PerWorker,
}

/// Configuration for a benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Reconstruction tool executable.
    pub tool_path: PathBuf,

    /// Input dataset handed to the tool as its final argument.
    pub dataset_path: PathBuf,

    /// Directory receiving artifacts and the report.
    pub output_dir: PathBuf,

    /// Number of trials allowed to run at once (also the device pool size).
    pub worker_count: usize,

    /// Wall-clock budget per trial, in seconds.
    pub trial_timeout_secs: u64,

    /// Environment variable restricting the child to one device.
    pub device_env_var: String,

    /// Artifact file extension, without the dot.
    pub artifact_extension: String,

    /// Upper bound on captured stderr kept per trial.
    pub max_error_bytes: usize,

    pub device_assignment: DeviceAssignment,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            tool_path: PathBuf::from("./opensplat"),
            dataset_path: PathBuf::from("./banana"),
            output_dir: PathBuf::from("./output"),
            worker_count: 1,
            trial_timeout_secs: 3600,
            device_env_var: "CUDA_VISIBLE_DEVICES".to_string(),
            artifact_extension: "ply".to_string(),
            max_error_bytes: 4096,
            device_assignment: DeviceAssignment::RoundRobin,
        }
    }
}

impl RunnerConfig {
    pub fn new(tool_path: impl Into<PathBuf>, dataset_path: impl Into<PathBuf>) -> Self {
        Self {
            tool_path: tool_path.into(),
            dataset_path: dataset_path.into(),
            ..Self::default()
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_workers(mut self, n: usize) -> Self {
        self.worker_count = n;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.trial_timeout_secs = secs;
        self
    }

    pub fn with_device_assignment(mut self, assignment: DeviceAssignment) -> Self {
        self.device_assignment = assignment;
        self
    }

    pub fn with_max_error_bytes(mut self, n: usize) -> Self {
        self.max_error_bytes = n;
        self
    }

    pub fn trial_timeout(&self) -> Duration {
        Duration::from_secs(self.trial_timeout_secs)
    }

    /// `{output_dir}/{name}.{extension}`
    pub fn artifact_path(&self, trial_name: &str) -> PathBuf {
        self.output_dir
            .join(format!("{trial_name}.{}", self.artifact_extension))
    }

    pub fn report_path(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }

    /// Checks that must pass before any trial is scheduled.
    pub fn validate(&self) -> BenchResult<()> {
        if self.worker_count == 0 {
            return Err(config_error!("worker_count must be at least 1"));
        }
        if self.trial_timeout_secs == 0 {
            return Err(config_error!("trial timeout must be positive"));
        }
        if self.device_env_var.trim().is_empty() || self.device_env_var.contains('=') {
            return Err(config_error!(
                "invalid device environment variable: {:?}",
                self.device_env_var
            ));
        }
        if self.artifact_extension.is_empty() {
            return Err(config_error!("artifact extension must not be empty"));
        }
        Ok(())
    }

    /// Create the output directory (and parents) if missing.
    pub fn prepare_output_dir(&self) -> BenchResult<&Path> {
        std::fs::create_dir_all(&self.output_dir).map_err(|e| {
            config_error!(
                "cannot create output directory {}: {e}",
                self.output_dir.display()
            )
        })?;
        Ok(&self.output_dir)
    }
}
