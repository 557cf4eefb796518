//! # sb-report
//!
//! Turns trial outcomes and the artifacts they left behind into a run report.
//!
//! PLY header inspection and directory analysis live in [`artifact`], name
//! based categories in [`grouping`], summary statistics in [`aggregate`] and
//! the JSON / Markdown / text writers in [`render`].

pub mod aggregate;
pub mod artifact;
pub mod grouping;
pub mod render;

pub use aggregate::{
    speedup, Aggregator, ArtifactComparison, FailureSummary, RunContext, RunReport, RunSummary,
    FAILURE_DETAIL_CHARS,
};
pub use artifact::{
    analyze_directory, parse_vertex_count, read_vertex_count, ArtifactMetrics, ArtifactStats,
    SizeExtremes, HEADER_BYTE_BUDGET,
};
pub use grouping::{Category, GroupingRule, GroupingRules, Matcher, CATCH_ALL};
