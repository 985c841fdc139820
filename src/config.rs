//! Experiment configuration using Figment.
//!
//! Configuration is layered from:
//! 1. built-in defaults
//! 2. a TOML file
//! 3. environment variables prefixed with `CAGE_RESULTS_` (nested keys split on `__`)
//!
//! # Example
//! ```no_run
//! use cage_results::config::ExperimentConfig;
//!
//! let config = ExperimentConfig::load_from("experiment.toml")?;
//! config.validate()?;
//! println!("{} bins", config.bin_count());
//! # Ok::<(), cage_results::error::ResultsError>(())
//! ```

use crate::error::{ResultsError, ResultsResult};
use crate::logging::OutputFormat;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level experiment configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Experiment parameters consumed by the result tables
    #[serde(default)]
    pub experiment: ExperimentParams,
    /// Output locations
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default)]
    pub log_format: OutputFormat,
    /// Imaging engine tag written as the third field of the version marker
    pub engine_version: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "cage-results".to_string(),
            log_level: "info".to_string(),
            log_format: OutputFormat::Compact,
            engine_version: "tiff-0.9".to_string(),
        }
    }
}

/// Experiment parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentParams {
    /// Program kind; selects the ROI exclusion rule
    pub program: Program,
    /// Number of monitored cages
    pub cage_count: usize,
    /// Experiment duration
    pub duration: u32,
    /// Width of one result bin, in the same unit as `duration`
    pub bin_duration: u32,
    /// Column names of the total-result header
    pub total_header: Vec<String>,
    /// Header line of per-cage XY data files
    pub xy_header: String,
}

impl Default for ExperimentParams {
    fn default() -> Self {
        Self {
            program: Program::Hc1,
            cage_count: 4,
            duration: 720,
            bin_duration: 60,
            total_header: vec!["ID".to_string(), "Distance".to_string()],
            xy_header: "Time\tX\tY".to_string(),
        }
    }
}

/// How per-cage files are named outside session directories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileNaming {
    /// `<subject id>.tif`
    #[default]
    SubjectId,
    /// `cage01.tif`, `cage02.tif`, ...
    CageIndex,
}

/// Output locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the live-run ("online") output area
    pub live_root: PathBuf,
    /// Root of the archival ("offline") output area
    pub archive_root: PathBuf,
    /// Directory scanned for `.roi` files
    pub preference_dir: PathBuf,
    /// Parameter listing copied into the provenance block
    pub parameter_file: PathBuf,
    /// Per-cage file naming outside session directories
    #[serde(default)]
    pub naming: FileNaming,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            live_root: PathBuf::from("results/live"),
            archive_root: PathBuf::from("results/archive"),
            preference_dir: PathBuf::from("prefs"),
            parameter_file: PathBuf::from("prefs/parameters.txt"),
            naming: FileNaming::SubjectId,
        }
    }
}

/// Behavioral test program that produced the results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Program {
    /// Home cage, first variant
    Hc1,
    /// Home cage, second variant
    Hc2,
    /// Home cage, third variant
    Hc3,
    /// Contextual social interaction
    Csi,
    /// Contextual social interaction, legacy arena layout
    OldCsi,
    /// Y-maze
    Ym,
    /// Beam test
    Bt,
    /// Radial maze
    Rm,
    /// Open field
    Of,
    /// Light/dark box
    Ld,
    /// Elevated plus maze
    Ep,
}

impl Program {
    /// Programs whose arena boundary ROI (`*Outer.roi`) is left out of the provenance block.
    pub fn excludes_outer_roi(self) -> bool {
        matches!(self, Program::Csi | Program::OldCsi | Program::Ym)
    }
}

impl ExperimentConfig {
    /// Load configuration from a specific file path
    ///
    /// Environment variables override file values, e.g.
    /// `CAGE_RESULTS_EXPERIMENT__CAGE_COUNT=8`.
    pub fn load_from<P: AsRef<Path>>(path: P) -> ResultsResult<Self> {
        let config = Figment::from(Serialized::defaults(ExperimentConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("CAGE_RESULTS_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string layered over the defaults
    pub fn from_toml_str(toml: &str) -> ResultsResult<Self> {
        let config = Figment::from(Serialized::defaults(ExperimentConfig::default()))
            .merge(Toml::string(toml))
            .extract()?;
        Ok(config)
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> ResultsResult<String> {
        toml::to_string_pretty(self).map_err(|e| ResultsError::Configuration(e.to_string()))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> ResultsResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(ResultsError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.experiment.cage_count == 0 {
            return Err(ResultsError::Configuration(
                "cage_count must be at least 1".to_string(),
            ));
        }

        if self.experiment.bin_duration == 0 {
            return Err(ResultsError::Configuration(
                "bin_duration must be greater than 0".to_string(),
            ));
        }

        if self.experiment.total_header.is_empty() {
            return Err(ResultsError::Configuration(
                "total_header must name at least one column".to_string(),
            ));
        }

        Ok(())
    }

    /// Number of bin columns; a partial final bin gets its own column.
    pub fn bin_count(&self) -> usize {
        bin_count(self.experiment.duration, self.experiment.bin_duration)
    }
}

/// `ceil(duration / bin_duration)`, or 0 when `bin_duration` is 0.
pub fn bin_count(duration: u32, bin_duration: u32) -> usize {
    if bin_duration == 0 {
        return 0;
    }
    duration.div_ceil(bin_duration) as usize
}
