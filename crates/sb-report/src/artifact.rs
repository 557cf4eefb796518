//! Artifact inspection: file sizes and point counts read from PLY headers.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

use sb_types::BenchResult;

/// Most header bytes scanned before giving up on finding `end_header`.
pub const HEADER_BYTE_BUDGET: u64 = 10_000;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Point count declared by a PLY header (`element vertex <n>`).
///
/// Returns 0 for unreadable files, headers without a terminator inside the
/// byte budget, and missing or malformed vertex lines.
pub fn read_vertex_count(path: &Path) -> u64 {
    match File::open(path) {
        Ok(file) => parse_vertex_count(file),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "cannot open artifact");
            0
        }
    }
}

/// Same as [`read_vertex_count`] over any reader.
pub fn parse_vertex_count<R: Read>(reader: R) -> u64 {
    let mut reader = BufReader::new(reader.take(HEADER_BYTE_BUDGET));
    let mut vertices = None;
    let mut line = Vec::new();

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) | Err(_) => return 0,
            Ok(_) => {}
        }
        let text = String::from_utf8_lossy(&line);
        let text = text.trim();
        if text == "end_header" {
            return vertices.unwrap_or(0);
        }
        if vertices.is_none() {
            let mut parts = text.split_whitespace();
            if parts.next() == Some("element") && parts.next() == Some("vertex") {
                vertices = parts.next().and_then(|n| n.parse::<u64>().ok());
            }
        }
    }
}

/// Size and point count of one artifact file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetrics {
    /// File stem; matches the trial name that produced it.
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub point_count: u64,
}

impl ArtifactMetrics {
    pub fn from_path(path: &Path) -> BenchResult<Self> {
        let size_bytes = std::fs::metadata(path)?.len();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            name,
            path: path.to_path_buf(),
            size_bytes,
            point_count: read_vertex_count(path),
        })
    }

    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / BYTES_PER_MB
    }

    /// MB per ten thousand points; 0 when the point count is unknown.
    pub fn mb_per_10k_points(&self) -> f64 {
        if self.point_count == 0 {
            0.0
        } else {
            self.size_mb() / (self.point_count as f64 / 10_000.0)
        }
    }
}

/// Metrics for every file with `extension` in `dir`, sorted by name.
pub fn analyze_directory(dir: &Path, extension: &str) -> BenchResult<Vec<ArtifactMetrics>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == extension))
        .collect();
    paths.sort();

    let mut metrics: Vec<ArtifactMetrics> = paths
        .par_iter()
        .filter_map(|p| ArtifactMetrics::from_path(p).ok())
        .collect();
    metrics.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(metrics)
}

/// Summary statistics over a set of artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactStats {
    pub count: usize,
    pub min_size_bytes: u64,
    pub max_size_bytes: u64,
    pub mean_size_bytes: f64,
    /// Point statistics cover only artifacts with a known (non-zero) count.
    pub min_points: Option<u64>,
    pub max_points: Option<u64>,
    pub mean_points: Option<f64>,
}

impl ArtifactStats {
    pub fn compute(artifacts: &[ArtifactMetrics]) -> Option<Self> {
        if artifacts.is_empty() {
            return None;
        }
        let sizes = artifacts.iter().map(|a| a.size_bytes);
        let points: Vec<u64> = artifacts
            .iter()
            .map(|a| a.point_count)
            .filter(|&p| p > 0)
            .collect();

        let mean_points = if points.is_empty() {
            None
        } else {
            // Header counts are untrusted; sum in f64.
            Some(points.iter().map(|&p| p as f64).sum::<f64>() / points.len() as f64)
        };

        Some(Self {
            count: artifacts.len(),
            min_size_bytes: sizes.clone().min().unwrap_or(0),
            max_size_bytes: sizes.clone().max().unwrap_or(0),
            mean_size_bytes: sizes.map(|b| b as f64).sum::<f64>() / artifacts.len() as f64,
            min_points: points.iter().copied().min(),
            max_points: points.iter().copied().max(),
            mean_points,
        })
    }
}

/// Largest and smallest artifact and how far apart they are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeExtremes {
    pub largest: String,
    pub largest_bytes: u64,
    pub smallest: String,
    pub smallest_bytes: u64,
    /// `largest / smallest`; absent when the smallest artifact is empty.
    pub ratio: Option<f64>,
}

impl SizeExtremes {
    pub fn compute(artifacts: &[ArtifactMetrics]) -> Option<Self> {
        let largest = artifacts.iter().max_by_key(|a| a.size_bytes)?;
        let smallest = artifacts.iter().min_by_key(|a| a.size_bytes)?;
        let ratio = (smallest.size_bytes > 0)
            .then(|| largest.size_bytes as f64 / smallest.size_bytes as f64);
        Some(Self {
            largest: largest.name.clone(),
            largest_bytes: largest.size_bytes,
            smallest: smallest.name.clone(),
            smallest_bytes: smallest.size_bytes,
            ratio,
        })
    }
}
