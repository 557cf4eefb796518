//! Typed command-line options for the reconstruction tool.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::errors::PlanError;

/// Value kind an option accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Int,
    Float,
    Text,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Int => "integer",
            Self::Float => "float",
            Self::Text => "text",
        }
    }
}

/// Options the reconstruction tool recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrialOption {
    NumIters,
    DownscaleFactor,
    ShDegree,
    SsimWeight,
    RefineEvery,
    DensifyGradThresh,
    DensifySizeThresh,
    ValImage,
}

impl TrialOption {
    pub const ALL: [TrialOption; 8] = [
        Self::NumIters,
        Self::DownscaleFactor,
        Self::ShDegree,
        Self::SsimWeight,
        Self::RefineEvery,
        Self::DensifyGradThresh,
        Self::DensifySizeThresh,
        Self::ValImage,
    ];

    /// Flag name without the leading dashes.
    pub fn flag(&self) -> &'static str {
        match self {
            Self::NumIters => "num-iters",
            Self::DownscaleFactor => "downscale-factor",
            Self::ShDegree => "sh-degree",
            Self::SsimWeight => "ssim-weight",
            Self::RefineEvery => "refine-every",
            Self::DensifyGradThresh => "densify-grad-thresh",
            Self::DensifySizeThresh => "densify-size-thresh",
            Self::ValImage => "val-image",
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Self::NumIters | Self::ShDegree | Self::RefineEvery => ValueKind::Int,
            Self::DownscaleFactor
            | Self::SsimWeight
            | Self::DensifyGradThresh
            | Self::DensifySizeThresh => ValueKind::Float,
            Self::ValImage => ValueKind::Text,
        }
    }
}

impl fmt::Display for TrialOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.flag())
    }
}

impl FromStr for TrialOption {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let flag = s.trim().trim_start_matches("--");
        Self::ALL
            .iter()
            .copied()
            .find(|opt| opt.flag() == flag)
            .ok_or_else(|| PlanError::UnknownOption {
                name: s.to_string(),
            })
    }
}

/// A concrete option value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParameterValue {
    /// Check (and where lossless, convert) the value for an option's kind.
    ///
    /// Integers widen to floats, and text that parses as the expected kind is
    /// accepted so plans written with string values still load.
    pub fn coerce(self, option: TrialOption) -> Result<Self, PlanError> {
        let wrong_kind = |actual: &ParameterValue| PlanError::WrongKind {
            option: option.flag().to_string(),
            expected: option.kind().as_str(),
            actual: actual.to_string(),
        };

        match (option.kind(), self) {
            (ValueKind::Int, v @ Self::Int(_)) => Ok(v),
            (ValueKind::Float, v @ Self::Float(_)) => Ok(v),
            (ValueKind::Float, Self::Int(i)) => Ok(Self::Float(i as f64)),
            (ValueKind::Text, v @ Self::Text(_)) => Ok(v),
            (ValueKind::Int, Self::Text(s)) => s
                .trim()
                .parse::<i64>()
                .map(Self::Int)
                .map_err(|_| wrong_kind(&Self::Text(s))),
            (ValueKind::Float, Self::Text(s)) => match s.trim().parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(Self::Float(f)),
                _ => Err(wrong_kind(&Self::Text(s))),
            },
            (_, other) => Err(wrong_kind(&other)),
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for ParameterValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Ordered, validated option set for one trial.
///
/// Insertion order is the order flags appear on the command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    entries: Vec<(TrialOption, ParameterValue)>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an option by flag name, rejecting unknown names, wrong kinds and repeats.
    pub fn insert(
        &mut self,
        name: &str,
        value: impl Into<ParameterValue>,
    ) -> Result<(), PlanError> {
        let option: TrialOption = name.parse()?;
        self.insert_option(option, value)
    }

    pub fn insert_option(
        &mut self,
        option: TrialOption,
        value: impl Into<ParameterValue>,
    ) -> Result<(), PlanError> {
        if self.get(option).is_some() {
            return Err(PlanError::DuplicateOption {
                option: option.flag().to_string(),
            });
        }
        let value = value.into().coerce(option)?;
        self.entries.push((option, value));
        Ok(())
    }

    pub fn get(&self, option: TrialOption) -> Option<&ParameterValue> {
        self.entries
            .iter()
            .find(|(opt, _)| *opt == option)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TrialOption, &ParameterValue)> {
        self.entries.iter().map(|(opt, v)| (*opt, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flag/value pairs in insertion order: `["--num-iters", "1000", ...]`.
    pub fn to_args(&self) -> Vec<String> {
        self.entries
            .iter()
            .flat_map(|(opt, v)| [format!("--{}", opt.flag()), v.to_string()])
            .collect()
    }

    /// Space-joined form of [`ParameterSet::to_args`].
    pub fn render(&self) -> String {
        self.to_args().join(" ")
    }
}

impl Serialize for ParameterSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (opt, value) in &self.entries {
            map.serialize_entry(opt.flag(), value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ParameterSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SetVisitor;

        impl<'de> Visitor<'de> for SetVisitor {
            type Value = ParameterSet;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of option flag to value")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<ParameterSet, A::Error> {
                let mut set = ParameterSet::new();
                while let Some((name, value)) = access.next_entry::<String, ParameterValue>()? {
                    set.insert(&name, value).map_err(serde::de::Error::custom)?;
                }
                Ok(set)
            }
        }

        deserializer.deserialize_map(SetVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_round_trip_through_from_str() {
        for opt in TrialOption::ALL {
            assert_eq!(opt.flag().parse::<TrialOption>().unwrap(), opt);
        }
        assert_eq!(
            "--sh-degree".parse::<TrialOption>().unwrap(),
            TrialOption::ShDegree
        );
    }

    #[test]
    fn unknown_option_rejected_at_insert() {
        let mut set = ParameterSet::new();
        let err = set.insert("learning-rate", 0.1).unwrap_err();
        assert_eq!(
            err,
            PlanError::UnknownOption {
                name: "learning-rate".into()
            }
        );
        assert!(set.is_empty());
    }

    #[test]
    fn kinds_are_checked_and_widened() {
        let mut set = ParameterSet::new();
        set.insert("downscale-factor", 2).unwrap();
        assert_eq!(
            set.get(TrialOption::DownscaleFactor),
            Some(&ParameterValue::Float(2.0))
        );

        set.insert("num-iters", "1000").unwrap();
        assert_eq!(set.get(TrialOption::NumIters), Some(&ParameterValue::Int(1000)));

        assert!(matches!(
            set.insert("sh-degree", 1.5),
            Err(PlanError::WrongKind { .. })
        ));
        assert!(matches!(
            set.insert("ssim-weight", "heavy"),
            Err(PlanError::WrongKind { .. })
        ));
    }

    #[test]
    fn duplicates_rejected() {
        let mut set = ParameterSet::new();
        set.insert("num-iters", 1000).unwrap();
        assert!(matches!(
            set.insert("--num-iters", 2000),
            Err(PlanError::DuplicateOption { .. })
        ));
    }

    #[test]
    fn args_keep_insertion_order() {
        let mut set = ParameterSet::new();
        set.insert("sh-degree", 1).unwrap();
        set.insert("num-iters", 1000).unwrap();
        set.insert("ssim-weight", 0.2).unwrap();
        set.insert("densify-grad-thresh", 0.0001).unwrap();

        assert_eq!(
            set.to_args(),
            vec![
                "--sh-degree",
                "1",
                "--num-iters",
                "1000",
                "--ssim-weight",
                "0.2",
                "--densify-grad-thresh",
                "0.0001",
            ]
        );
    }

    #[test]
    fn json_keeps_order_and_validates() {
        let set: ParameterSet =
            serde_json::from_str(r#"{"refine-every": 50, "num-iters": "1000"}"#).unwrap();
        assert_eq!(set.render(), "--refine-every 50 --num-iters 1000");

        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"{"refine-every":50,"num-iters":1000}"#);

        let bad = serde_json::from_str::<ParameterSet>(r#"{"bogus": 1}"#);
        assert!(bad.is_err());
    }
}
