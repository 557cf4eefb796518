//! Report writers: pretty JSON, Markdown, and the plain-text artifact comparison.

use std::fs;
use std::path::Path;

use sb_types::BenchResult;

use crate::aggregate::{ArtifactComparison, RunReport};
use crate::artifact::ArtifactMetrics;

const RULE_WIDTH: usize = 70;

fn ensure_parent(path: &Path) -> BenchResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Markdown-safe table cell.
fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace("\r\n", "<br>").replace('\n', "<br>")
}

fn members_by_size<'a>(
    comparison: &'a ArtifactComparison,
    members: &[String],
) -> Vec<&'a ArtifactMetrics> {
    let mut found: Vec<&ArtifactMetrics> =
        members.iter().filter_map(|m| comparison.get(m)).collect();
    found.sort_by_key(|a| a.size_bytes);
    found
}

impl RunReport {
    pub fn write_json(&self, path: &Path) -> BenchResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        ensure_parent(path)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn write_markdown(&self, path: &Path) -> BenchResult<()> {
        ensure_parent(path)?;
        fs::write(path, self.render_markdown())?;
        Ok(())
    }

    pub fn render_markdown(&self) -> String {
        let s = &self.summary;
        let mut out = String::new();
        out.push_str("# OpenSplat parameter benchmark\n\n");
        out.push_str(&format!("- Run: `{}`\n", self.run_id));
        out.push_str(&format!("- Generated: {}\n", self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")));
        out.push_str(&format!("- Tool: `{}`\n", self.tool.display()));
        out.push_str(&format!("- Dataset: `{}`\n", self.dataset.display()));
        out.push_str(&format!("- Workers: {}\n", self.worker_count));
        out.push_str(&format!("- Trials: {} ({} succeeded, {} failed)\n", s.total, s.succeeded, s.failure_count()));
        out.push_str(&format!("- Sequential estimate: {:.1} s\n", s.sequential_seconds));
        out.push_str(&format!("- Elapsed: {:.1} s\n", s.elapsed_seconds));
        if let Some(speedup) = s.speedup {
            out.push_str(&format!("- Speedup: {speedup:.2}x\n"));
        }

        out.push_str("\n## Results\n\n");
        out.push_str("| Trial | Description | Status | GPU | Duration (s) | Size (MB) | Points | Parameters |\n");
        out.push_str("|---|---|---|---|---|---|---|---|\n");
        for outcome in &self.outcomes {
            let artifact = self.comparison.get(outcome.name());
            let params = outcome.spec().parameters().render();
            out.push_str(&format!(
                "| {} | {} | {} | {} | {:.1} | {} | {} | {} |\n",
                cell(outcome.name()),
                cell(outcome.spec().description()),
                if outcome.succeeded() { "✅" } else { "❌" },
                outcome.device_slot(),
                outcome.duration_seconds(),
                artifact.map(|a| format!("{:.2}", a.size_mb())).unwrap_or_else(|| "-".into()),
                artifact.map(|a| a.point_count.to_string()).unwrap_or_else(|| "-".into()),
                if params.is_empty() { "(defaults)".to_string() } else { cell(&params) },
            ));
        }

        if !s.failures.is_empty() {
            out.push_str("\n## Failures\n\n");
            for failure in &s.failures {
                out.push_str(&format!("### {} ({})\n\n", failure.name, failure.state));
                out.push_str(&format!("```\n{}\n```\n\n", failure.error.trim_end()));
            }
        }

        out.push_str("\n## Categories\n\n");
        for category in &self.categories {
            out.push_str(&format!("- **{}**: {}\n", category.name, category.members.join(", ")));
        }

        let comparison = &self.comparison;
        if !comparison.is_empty() {
            out.push_str("\n## Artifacts\n");
            for category in &comparison.categories {
                out.push_str(&format!("\n### {}\n\n", category.name));
                out.push_str("| Trial | Size (MB) | Points | MB / 10k points |\n");
                out.push_str("|---|---|---|---|\n");
                for a in members_by_size(comparison, &category.members) {
                    out.push_str(&format!(
                        "| {} | {:.2} | {} | {:.3} |\n",
                        cell(&a.name),
                        a.size_mb(),
                        a.point_count,
                        a.mb_per_10k_points()
                    ));
                }
            }
        }

        if let Some(ext) = &comparison.extremes {
            out.push_str("\n## Extremes\n\n");
            out.push_str(&format!("- Largest: {} ({} bytes)\n", ext.largest, ext.largest_bytes));
            out.push_str(&format!("- Smallest: {} ({} bytes)\n", ext.smallest, ext.smallest_bytes));
            match ext.ratio {
                Some(ratio) => out.push_str(&format!("- Ratio: {ratio:.1}x\n")),
                None => out.push_str("- Ratio: n/a (smallest artifact is empty)\n"),
            }
        }

        out
    }
}

impl ArtifactComparison {
    /// Console rendering used by the `analyze` command.
    pub fn render_text(&self) -> String {
        let rule = "=".repeat(RULE_WIDTH);
        let mut out = String::new();
        out.push_str(&format!("\n{rule}\nArtifact comparison\n{rule}\n"));

        for category in &self.categories {
            out.push_str(&format!("\n[{}]\n", category.name));
            out.push_str(&format!(
                "{:<20} {:>12} {:>15} {:>15}\n",
                "name", "size", "points", "MB/10k pts"
            ));
            out.push_str(&"-".repeat(RULE_WIDTH));
            out.push('\n');
            for a in members_by_size(self, &category.members) {
                out.push_str(&format!(
                    "{:<20} {:>9.2} MB {:>15} {:>15.3}\n",
                    a.name,
                    a.size_mb(),
                    a.point_count,
                    a.mb_per_10k_points()
                ));
            }
        }

        if let Some(stats) = &self.stats {
            let mb = |bytes: f64| bytes / (1024.0 * 1024.0);
            out.push_str(&format!("\n{rule}\nOverall\n{rule}\n"));
            out.push_str(&format!("artifacts: {}\n", stats.count));
            out.push_str(&format!(
                "size: {:.2} - {:.2} MB (mean {:.2} MB)\n",
                mb(stats.min_size_bytes as f64),
                mb(stats.max_size_bytes as f64),
                mb(stats.mean_size_bytes)
            ));
            if let (Some(min), Some(max), Some(mean)) =
                (stats.min_points, stats.max_points, stats.mean_points)
            {
                out.push_str(&format!("points: {min} - {max} (mean {mean:.0})\n"));
            }
        }

        if let Some(ext) = &self.extremes {
            out.push_str(&format!("\n{rule}\nExtremes\n{rule}\n"));
            out.push_str(&format!("largest: {} ({} bytes)\n", ext.largest, ext.largest_bytes));
            out.push_str(&format!("smallest: {} ({} bytes)\n", ext.smallest, ext.smallest_bytes));
            match ext.ratio {
                Some(ratio) => out.push_str(&format!("ratio: {ratio:.1}x\n")),
                None => out.push_str("ratio: n/a\n"),
            }
        }

        out
    }
}
