//! Presentation grouping of trials by naming convention.

use serde::{Deserialize, Serialize};

/// Name of the category collecting everything no rule matched.
pub const CATCH_ALL: &str = "other";

/// How a rule recognises its members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Matcher {
    /// Names starting with the given prefix.
    Prefix(String),
    /// An explicit list of names.
    Names(Vec<String>),
}

impl Matcher {
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Prefix(prefix) => name.starts_with(prefix.as_str()),
            Self::Names(names) => names.iter().any(|n| n == name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupingRule {
    pub category: String,
    pub matcher: Matcher,
}

/// One presentation category and the names assigned to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub members: Vec<String>,
}

/// Ordered rules; the first matching rule wins, the rest fall into [`CATCH_ALL`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupingRules {
    pub rules: Vec<GroupingRule>,
}

impl GroupingRules {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn prefix(mut self, category: impl Into<String>, prefix: impl Into<String>) -> Self {
        self.rules.push(GroupingRule {
            category: category.into(),
            matcher: Matcher::Prefix(prefix.into()),
        });
        self
    }

    pub fn names<S: Into<String>>(
        mut self,
        category: impl Into<String>,
        names: impl IntoIterator<Item = S>,
    ) -> Self {
        self.rules.push(GroupingRule {
            category: category.into(),
            matcher: Matcher::Names(names.into_iter().map(Into::into).collect()),
        });
        self
    }

    /// Category a single name belongs to.
    pub fn category_of(&self, name: &str) -> &str {
        self.rules
            .iter()
            .find(|r| r.matcher.matches(name))
            .map(|r| r.category.as_str())
            .unwrap_or(CATCH_ALL)
    }

    /// Partition `names` into categories, in rule order with the catch-all
    /// last. Every name lands in exactly one category; empty categories are
    /// left out. Rules sharing a category name share one bucket.
    pub fn group<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Vec<Category> {
        let mut categories: Vec<Category> = Vec::new();
        for rule in &self.rules {
            if !categories.iter().any(|c| c.name == rule.category) {
                categories.push(Category {
                    name: rule.category.clone(),
                    members: Vec::new(),
                });
            }
        }
        categories.push(Category {
            name: CATCH_ALL.to_string(),
            members: Vec::new(),
        });

        for name in names {
            let target = self.category_of(name);
            if let Some(category) = categories.iter_mut().find(|c| c.name == target) {
                category.members.push(name.to_string());
            }
        }

        categories.retain(|c| !c.members.is_empty());
        categories
    }
}

impl Default for GroupingRules {
    /// Categories for the built-in parameter sweeps.
    fn default() -> Self {
        Self::new()
            .prefix("iterations", "iters_")
            .prefix("resolution", "scale_")
            .prefix("spherical harmonics", "sh_")
            .prefix("ssim weight", "ssim_")
            .prefix("refinement", "refine_")
            .prefix("gradient threshold", "grad_")
            .prefix("size threshold", "size_")
            .names("presets", ["baseline", "fast_preview", "quality"])
    }
}
