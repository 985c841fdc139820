//! CLI entry point for cage-results
//!
//! Inspection helpers for an experiment configuration:
//! - show the effective configuration
//! - print where each result file would be written
//! - print the bin header and provenance block a run would produce
//!
//! # Usage
//!
//! ```bash
//! cage-results --config experiment.toml layout --session day1 --subjects M1,M2,M3,M4
//! cage-results --config experiment.toml provenance
//! ```

use anyhow::{bail, Context, Result};
use cage_results::config::ExperimentConfig;
use cage_results::paths::{DirectoryLayout, PathResolver, PathScope, ResultKind};
use cage_results::provenance::Provenance;
use cage_results::roi::ImageJRoiDecoder;
use cage_results::{logging, table};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cage-results")]
#[command(about = "Inspect result output for a multi-cage experiment", long_about = None)]
struct Cli {
    /// Experiment configuration file (TOML)
    #[arg(long, default_value = "experiment.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration
    ShowConfig,

    /// Print resolved output paths
    Layout {
        /// Use the archival ("offline") output area
        #[arg(long)]
        archive: bool,

        /// Session subdirectory
        #[arg(long)]
        session: Option<String>,

        /// Comma-separated subject IDs, one per cage
        #[arg(long, value_delimiter = ',')]
        subjects: Vec<String>,
    },

    /// Print the bin-result header line
    BinHeader {
        /// Number the columns without the "bin" prefix
        #[arg(long)]
        plain: bool,
    },

    /// Print the provenance block of a total-result file
    Provenance,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ExperimentConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    config.validate()?;
    logging::init_from_config(&config).map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::ShowConfig => print!("{}", config.to_toml()?),
        Commands::Layout {
            archive,
            session,
            subjects,
        } => print_layout(&config, archive, session, subjects)?,
        Commands::BinHeader { plain } => {
            println!("{}", table::bin_header(config.bin_count(), !plain));
        }
        Commands::Provenance => {
            for line in Provenance::from_config(&config).lines(&ImageJRoiDecoder) {
                println!("{line}");
            }
        }
    }

    Ok(())
}

fn print_layout(
    config: &ExperimentConfig,
    archive: bool,
    session: Option<String>,
    subjects: Vec<String>,
) -> Result<()> {
    let cage_count = config.experiment.cage_count;
    let subjects = if subjects.is_empty() {
        (1..=cage_count).map(|i| format!("Cage{i}")).collect()
    } else {
        subjects
    };
    if subjects.len() != cage_count {
        bail!(
            "Expected {} subject IDs, got {}",
            cage_count,
            subjects.len()
        );
    }

    let mut scope = if archive {
        PathScope::archive()
    } else {
        PathScope::live()
    };
    if let Some(session) = session {
        scope = scope.with_session(session);
    }

    let layout = DirectoryLayout::from_config(&config.paths);
    println!("scope: {scope}");
    println!(
        "total: {}",
        layout.path(&ResultKind::TotalResult, &scope).display()
    );
    for (cage, id) in subjects.iter().enumerate() {
        println!("cage {} ({id}):", cage + 1);
        for (label, kind) in [
            ("image", ResultKind::Image),
            ("mean", ResultKind::Mean),
            ("trace", ResultKind::Trace),
            ("xy", ResultKind::Xy),
        ] {
            println!(
                "  {label:<6}{}",
                layout.cage_path(&kind, &scope, cage, id).display()
            );
        }
    }
    Ok(())
}
