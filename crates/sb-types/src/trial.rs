//! Trial specifications: one named parameter configuration per trial.

use serde::{Deserialize, Serialize};

use crate::errors::PlanError;
use crate::params::{ParameterSet, ParameterValue};

/// Immutable description of one experiment.
///
/// The name doubles as the artifact filename stem and the report key, so it
/// must be non-empty and free of path separators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTrialSpec")]
pub struct TrialSpec {
    name: String,
    description: String,
    parameters: ParameterSet,
}

#[derive(Deserialize)]
struct RawTrialSpec {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    parameters: ParameterSet,
}

impl TryFrom<RawTrialSpec> for TrialSpec {
    type Error = PlanError;

    fn try_from(raw: RawTrialSpec) -> Result<Self, Self::Error> {
        Self::with_parameters(raw.name, raw.description, raw.parameters)
    }
}

impl TrialSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Result<Self, PlanError> {
        Self::with_parameters(name, description, ParameterSet::new())
    }

    pub fn with_parameters(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ParameterSet,
    ) -> Result<Self, PlanError> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            description: description.into(),
            parameters,
        })
    }

    /// Add one option; consumes and returns the spec so plans read as a chain.
    pub fn param(mut self, flag: &str, value: impl Into<ParameterValue>) -> Result<Self, PlanError> {
        self.parameters.insert(flag, value)?;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }
}

fn validate_name(name: &str) -> Result<(), PlanError> {
    let invalid = |reason| PlanError::InvalidName {
        name: name.to_string(),
        reason,
    };

    if name.trim().is_empty() {
        return Err(invalid("name is empty"));
    }
    if name == "." || name == ".." {
        return Err(invalid("name is a relative path component"));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(invalid("name contains a path separator"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::TrialOption;

    #[test]
    fn chained_construction() {
        let spec = TrialSpec::new("scale_2", "half resolution")
            .and_then(|s| s.param("downscale-factor", 2))
            .and_then(|s| s.param("num-iters", 1000))
            .unwrap();

        assert_eq!(spec.name(), "scale_2");
        assert_eq!(spec.description(), "half resolution");
        assert_eq!(spec.parameters().len(), 2);
        assert_eq!(
            spec.parameters().get(TrialOption::NumIters),
            Some(&ParameterValue::Int(1000))
        );
    }

    #[test]
    fn rejects_path_like_names() {
        for bad in ["", "  ", "..", "a/b", "a\\b"] {
            assert!(
                matches!(TrialSpec::new(bad, ""), Err(PlanError::InvalidName { .. })),
                "{bad:?} should be rejected"
            );
        }
        assert!(TrialSpec::new("grad_0.0001", "").is_ok());
    }

    #[test]
    fn deserialize_validates() {
        let spec: TrialSpec = serde_json::from_str(
            r#"{"name": "sh_1", "description": "SH degree 1", "parameters": {"sh-degree": 1}}"#,
        )
        .unwrap();
        assert_eq!(spec.parameters().render(), "--sh-degree 1");

        let bad = serde_json::from_str::<TrialSpec>(r#"{"name": "x/y"}"#);
        assert!(bad.is_err());
    }
}
