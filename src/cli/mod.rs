//! Command-line parsing for the FX corridor projector.
//!
//! The goal of this module is to keep **argument parsing** and **config
//! resolution** separate from the projection code.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::domain::BandsConfig;
use crate::error::AppError;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "bands", version, about = "FX corridor projector (reference rate vs inflation-indexed bands)")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch, project and print the summary, monthly drivers and an ASCII chart.
    Show(ShowArgs),
    /// Write the merged day-by-day table to CSV and/or JSON.
    Export(ExportArgs),
    /// Launch the interactive TUI.
    ///
    /// This uses the same underlying pipeline as `bands show`, but renders
    /// results in a terminal UI using Ratatui.
    Tui(RunArgs),
    /// Write a markdown debug bundle under `debug/`.
    Debug(RunArgs),
}

/// Options shared by every command.
#[derive(Debug, Args, Clone, Default)]
pub struct RunArgs {
    /// TOML file with band parameters; flags below override it.
    #[arg(long, value_name = "TOML", env = "BANDS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Lower band on the first day of the fixed phase.
    #[arg(long)]
    pub lower0: Option<f64>,

    /// Upper band on the first day of the fixed phase.
    #[arg(long)]
    pub upper0: Option<f64>,

    /// First day of the fixed phase (YYYY-MM-DD).
    #[arg(long, value_name = "DATE")]
    pub start: Option<NaiveDate>,

    /// Last day of the fixed phase (YYYY-MM-DD).
    #[arg(long, value_name = "DATE")]
    pub end: Option<NaiveDate>,

    /// Date at which the summary reports corridor bounds (YYYY-MM-DD).
    #[arg(long, value_name = "DATE")]
    pub summary_date: Option<NaiveDate>,

    /// Skip the network entirely; only the fixed phase is drawn.
    #[arg(long)]
    pub offline: bool,

    /// Do not read or write the series cache.
    #[arg(long)]
    pub no_cache: bool,

    /// Log filter when RUST_LOG is unset (error, warn, info, debug, trace).
    #[arg(long, value_name = "LEVEL", env = "BANDS_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Append logs to this file instead of stderr (the TUI logs nowhere otherwise).
    #[arg(long, value_name = "PATH", env = "BANDS_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct ShowArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Disable the terminal plot.
    #[arg(long)]
    pub no_plot: bool,

    /// Connect the observed line across days without a print.
    #[arg(long)]
    pub connect_gaps: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,
}

#[derive(Debug, Args, Clone)]
pub struct ExportArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Write `date,lower,upper,observed` rows here.
    #[arg(long, value_name = "CSV")]
    pub csv: Option<PathBuf>,

    /// Write the full run document (config, summary, drivers, rows) here.
    #[arg(long, value_name = "JSON")]
    pub json: Option<PathBuf>,
}

impl RunArgs {
    /// Defaults, then the TOML file, then flags. Validated.
    pub fn bands_config(&self) -> Result<BandsConfig, AppError> {
        let mut config = match &self.config {
            Some(path) => load_config_file(path)?,
            None => BandsConfig::default(),
        };

        if let Some(v) = self.lower0 {
            config.lower0 = v;
        }
        if let Some(v) = self.upper0 {
            config.upper0 = v;
        }
        if let Some(v) = self.start {
            config.phase1_start = v;
        }
        if let Some(v) = self.end {
            config.phase1_end = v;
        }
        if let Some(v) = self.summary_date {
            config.summary_date = v;
        }

        config.validate()?;
        Ok(config)
    }
}

pub fn load_config_file(path: &Path) -> Result<BandsConfig, AppError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| AppError::new(2, format!("Failed to read config '{}': {e}", path.display())))?;
    parse_config(&text).map_err(|e| AppError::new(2, format!("Invalid config '{}': {e}", path.display())))
}

fn parse_config(text: &str) -> Result<BandsConfig, toml::de::Error> {
    toml::from_str(text)
}
