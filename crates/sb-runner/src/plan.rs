//! Test plans: ordered, name-unique lists of trial specifications.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use sb_types::{validation_error, BenchResult, PlanError, TrialSpec};

/// An ordered set of trials with unique names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<TrialSpec>", into = "Vec<TrialSpec>")]
pub struct TestPlan {
    specs: Vec<TrialSpec>,
}

impl TryFrom<Vec<TrialSpec>> for TestPlan {
    type Error = PlanError;

    fn try_from(specs: Vec<TrialSpec>) -> Result<Self, Self::Error> {
        Self::new(specs)
    }
}

impl From<TestPlan> for Vec<TrialSpec> {
    fn from(plan: TestPlan) -> Self {
        plan.specs
    }
}

impl TestPlan {
    pub fn new(specs: Vec<TrialSpec>) -> Result<Self, PlanError> {
        let mut seen = HashSet::new();
        for spec in &specs {
            if !seen.insert(spec.name()) {
                return Err(PlanError::DuplicateTrial {
                    name: spec.name().to_string(),
                });
            }
        }
        Ok(Self { specs })
    }

    /// Load a plan from a JSON array of `{name, description, parameters}`.
    pub fn from_path(path: &Path) -> BenchResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let plan: Self = serde_json::from_str(&text)?;
        if plan.is_empty() {
            return Err(validation_error!("plan {} contains no trials", path.display()));
        }
        Ok(plan)
    }

    /// Resolve a built-in plan name, or else treat the argument as a file path.
    pub fn resolve(name_or_path: &str) -> BenchResult<Self> {
        match name_or_path {
            "full" => Ok(Self::full()?),
            "quick" => Ok(Self::quick()?),
            other => Self::from_path(Path::new(other)),
        }
    }

    pub fn specs(&self) -> &[TrialSpec] {
        &self.specs
    }

    pub fn into_specs(self) -> Vec<TrialSpec> {
        self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.specs.iter().map(|s| s.name()).collect()
    }

    /// Keep only the named trials, in plan order.
    pub fn filter<S: AsRef<str>>(&self, names: &[S]) -> Result<Self, PlanError> {
        let wanted: HashSet<&str> = names.iter().map(|n| n.as_ref().trim()).collect();
        let specs: Vec<TrialSpec> = self
            .specs
            .iter()
            .filter(|s| wanted.contains(s.name()))
            .cloned()
            .collect();

        if specs.is_empty() {
            return Err(PlanError::NoMatch {
                requested: names
                    .iter()
                    .map(|n| n.as_ref().trim())
                    .collect::<Vec<_>>()
                    .join(","),
                available: self.names().join(", "),
            });
        }
        Ok(Self { specs })
    }

    /// Single-factor sweeps around a 1000-iteration baseline, plus one preset.
    pub fn full() -> Result<Self, PlanError> {
        let mut specs = vec![TrialSpec::new("baseline", "Baseline, 1000 iterations")?
            .param("num-iters", 1000)?];

        let sweeps: [(&str, &str, &[(&str, &str)]); 6] = [
            (
                "scale",
                "downscale-factor",
                &[
                    ("1", "Full resolution (high quality, slow)"),
                    ("2", "Half resolution (balanced)"),
                    ("4", "Quarter resolution (fast preview)"),
                ],
            ),
            (
                "sh",
                "sh-degree",
                &[
                    ("1", "SH degree 1 (basic lighting, fastest)"),
                    ("2", "SH degree 2 (moderate lighting)"),
                    ("3", "SH degree 3 (default, full lighting)"),
                ],
            ),
            (
                "ssim",
                "ssim-weight",
                &[
                    ("0", "SSIM weight 0 (pure L1 loss)"),
                    ("0.2", "SSIM weight 0.2 (default balance)"),
                    ("0.5", "SSIM weight 0.5 (favours structure)"),
                ],
            ),
            (
                "refine",
                "refine-every",
                &[
                    ("50", "Refine every 50 steps (more gaussians)"),
                    ("100", "Refine every 100 steps (default)"),
                    ("200", "Refine every 200 steps (fewer gaussians)"),
                ],
            ),
            (
                "grad",
                "densify-grad-thresh",
                &[
                    ("0.0001", "Gradient threshold 0.0001 (more splits)"),
                    ("0.0002", "Gradient threshold 0.0002 (default)"),
                    ("0.0004", "Gradient threshold 0.0004 (fewer splits)"),
                ],
            ),
            (
                "size",
                "densify-size-thresh",
                &[
                    ("0.005", "Size threshold 0.005 (more clones)"),
                    ("0.01", "Size threshold 0.01 (default)"),
                    ("0.02", "Size threshold 0.02 (more splits)"),
                ],
            ),
        ];

        for (prefix, flag, points) in sweeps {
            for (value, description) in points {
                specs.push(
                    TrialSpec::new(format!("{prefix}_{value}"), *description)?
                        .param(flag, *value)?
                        .param("num-iters", 1000)?,
                );
            }
        }

        specs.push(
            TrialSpec::new("fast_preview", "Fast preview (trades quality for speed)")?
                .param("downscale-factor", 4)?
                .param("num-iters", 1000)?
                .param("sh-degree", 1)?
                .param("refine-every", 200)?,
        );

        Self::new(specs)
    }

    /// Seven core configurations for a quick sanity pass.
    pub fn quick() -> Result<Self, PlanError> {
        Self::new(vec![
            TrialSpec::new("baseline", "Tool defaults")?,
            TrialSpec::new("fast", "Fast preview (scale=4, iters=5000)")?
                .param("downscale-factor", 4)?
                .param("num-iters", 5000)?,
            TrialSpec::new("high_res", "High resolution (scale=1, iters=15000)")?
                .param("downscale-factor", 1)?
                .param("num-iters", 15000)?,
            TrialSpec::new("sh1", "Simple lighting (sh-degree=1)")?
                .param("sh-degree", 1)?
                .param("num-iters", 10000)?,
            TrialSpec::new("ssim_high", "Structure emphasis (ssim-weight=0.5)")?
                .param("ssim-weight", 0.5)?
                .param("num-iters", 10000)?,
            TrialSpec::new("frequent_refine", "Frequent refinement (refine-every=50)")?
                .param("refine-every", 50)?
                .param("num-iters", 10000)?,
            TrialSpec::new("sensitive_grad", "Sensitive gradient (grad-thresh=0.0001)")?
                .param("densify-grad-thresh", 0.0001)?
                .param("num-iters", 10000)?,
        ])
    }
}
