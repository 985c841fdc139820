//! Provenance block for total-result files.
//!
//! The block records the parameters and arena geometry a result was produced
//! with. Every line starts with `##` so that table readers treat it as a comment:
//!
//! ```text
//! ##<parameter line 1>
//! ##<parameter line 2>
//! ####ROI(RoiName=x	y	width	height)
//! ##Arena.roi=10	12	200	180
//! ```
//!
//! Problems reading the parameter file or decoding one ROI are logged and
//! leave the block shorter; they never fail the save.

use crate::config::{ExperimentConfig, Program};
use crate::roi::RoiDecoder;
use std::fs;
use std::path::{Path, PathBuf};

/// Header line introducing the ROI entries.
pub const ROI_MARKER: &str = "####ROI(RoiName=x\ty\twidth\theight)";

const ROI_SUFFIX: &str = ".roi";
const OUTER_ROI_SUFFIX: &str = "Outer.roi";

/// Where provenance is harvested from.
#[derive(Debug, Clone)]
pub struct Provenance {
    parameter_file: PathBuf,
    roi_dir: PathBuf,
    program: Program,
}

impl Provenance {
    /// Provenance harvested from `parameter_file` and the `.roi` files in `roi_dir`.
    pub fn new(parameter_file: impl Into<PathBuf>, roi_dir: impl Into<PathBuf>, program: Program) -> Self {
        Self {
            parameter_file: parameter_file.into(),
            roi_dir: roi_dir.into(),
            program,
        }
    }

    /// Provenance sources named in `[paths]`.
    pub fn from_config(config: &ExperimentConfig) -> Self {
        Self::new(
            config.paths.parameter_file.clone(),
            config.paths.preference_dir.clone(),
            config.experiment.program,
        )
    }

    fn accepts(&self, name: &str) -> bool {
        if !name.ends_with(ROI_SUFFIX) {
            return false;
        }
        !(self.program.excludes_outer_roi() && name.ends_with(OUTER_ROI_SUFFIX))
    }

    /// `.roi` files in the ROI directory that belong in the block, sorted by name.
    pub fn roi_files(&self) -> Vec<PathBuf> {
        let entries = match fs::read_dir(&self.roi_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = ?self.roi_dir, error = %e, "Cannot list ROI directory");
                return Vec::new();
            }
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter(|entry| entry.file_name().to_str().is_some_and(|n| self.accepts(n)))
            .map(|entry| entry.path())
            .collect();
        files.sort();
        files
    }

    fn parameter_lines(&self) -> Vec<String> {
        match fs::read_to_string(&self.parameter_file) {
            Ok(text) => text.lines().map(|line| format!("##{line}")).collect(),
            Err(e) => {
                tracing::warn!(
                    path = ?self.parameter_file,
                    error = %e,
                    "Cannot read parameter file; provenance block has no parameters"
                );
                Vec::new()
            }
        }
    }

    /// Build the block's lines.
    pub fn lines(&self, decoder: &dyn RoiDecoder) -> Vec<String> {
        let mut lines = self.parameter_lines();

        let files = self.roi_files();
        if !files.is_empty() {
            lines.push(ROI_MARKER.to_string());
        }
        for path in &files {
            match decoder.decode(path) {
                Ok(bounds) => lines.push(format!("##{}={}", file_name(path), bounds)),
                Err(e) => tracing::warn!(error = %e, "Skipping undecodable ROI"),
            }
        }
        lines
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
