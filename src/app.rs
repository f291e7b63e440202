//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and resolves configuration
//! - installs logging
//! - runs the fetch/projection pipeline
//! - prints reports/plots or writes exports

use std::fs::OpenOptions;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Command, ExportArgs, RunArgs, ShowArgs};
use crate::data::SourceConfig;
use crate::domain::BandsConfig;
use crate::error::AppError;

pub mod pipeline;

use pipeline::Fetcher;

/// Entry point for the `bands` binary.
pub fn run() -> Result<(), AppError> {
    // `bands` and `bands --offline` behave like `bands tui ...`.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    match cli.command {
        Command::Show(args) => handle_show(args),
        Command::Export(args) => handle_export(args),
        Command::Tui(args) => handle_tui(args),
        Command::Debug(args) => handle_debug(args),
    }
}

/// Resolved settings shared by every command.
pub struct Context {
    pub bands: BandsConfig,
    pub fetcher: Fetcher,
}

impl Context {
    pub fn from_args(args: &RunArgs) -> Result<Self, AppError> {
        let bands = args.bands_config()?;
        let sources = SourceConfig::from_env()?;
        let fetcher = Fetcher::new(&sources, &bands, args.offline, !args.no_cache)?;
        Ok(Self { bands, fetcher })
    }
}

fn handle_show(args: ShowArgs) -> Result<(), AppError> {
    init_tracing(&args.run, LogTarget::Stderr)?;
    let ctx = Context::from_args(&args.run)?;
    let run = pipeline::run(&ctx.bands, &ctx.fetcher, false)?;

    eprint!("{}", crate::report::format_warnings(&run.warnings));
    println!(
        "{}",
        crate::report::format_run_summary(&run.summary, &run.projection.schedule, &ctx.bands)
    );
    println!("{}", crate::report::format_sources(&run.inputs));
    let drivers = crate::report::format_drivers(&run.projection.schedule);
    if !drivers.is_empty() {
        println!("{drivers}");
    }

    if !args.no_plot {
        println!(
            "{}",
            crate::plot::render_bands_plot(&run.merged, args.width, args.height, args.connect_gaps)
        );
    }

    Ok(())
}

fn handle_export(args: ExportArgs) -> Result<(), AppError> {
    init_tracing(&args.run, LogTarget::Stderr)?;
    if args.csv.is_none() && args.json.is_none() {
        return Err(AppError::new(2, "Nothing to export: pass --csv <path> and/or --json <path>."));
    }

    let ctx = Context::from_args(&args.run)?;
    let run = pipeline::run(&ctx.bands, &ctx.fetcher, false)?;
    eprint!("{}", crate::report::format_warnings(&run.warnings));

    if let Some(path) = &args.csv {
        crate::io::write_merged_csv(path, &run.merged)?;
        println!("Wrote {} rows to {}", run.merged.len(), path.display());
    }
    if let Some(path) = &args.json {
        let doc = crate::io::BandsDocument::new(
            &ctx.bands,
            &run.summary,
            &run.projection.schedule.inflation,
            &run.projection.schedule.drivers,
            &run.merged.rows,
        );
        crate::io::write_bands_json(path, &doc)?;
        println!("Wrote {}", path.display());
    }

    Ok(())
}

fn handle_tui(args: RunArgs) -> Result<(), AppError> {
    init_tracing(&args, LogTarget::FileOnly)?;
    let ctx = Context::from_args(&args)?;
    crate::tui::run(ctx)
}

fn handle_debug(args: RunArgs) -> Result<(), AppError> {
    init_tracing(&args, LogTarget::Stderr)?;
    let ctx = Context::from_args(&args)?;
    let run = pipeline::run(&ctx.bands, &ctx.fetcher, false)?;
    let path = crate::debug::write_debug_bundle(&PathBuf::from("debug"), &run, &ctx.bands)?;
    println!("Debug bundle written to {}", path.display());
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogTarget {
    Stderr,
    /// The TUI owns the screen; without `--log-file` logs are discarded.
    FileOnly,
}

/// Install the global subscriber. `RUST_LOG` wins over `--log-level`.
fn init_tracing(args: &RunArgs, target: LogTarget) -> Result<(), AppError> {
    let default_level = args.log_level.as_deref().unwrap_or("error");
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| AppError::new(2, format!("Invalid log level '{default_level}': {e}")))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    match (&args.log_file, target) {
        (Some(path), _) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| AppError::new(2, format!("Failed to open log file '{}': {e}", path.display())))?;
            builder.with_ansi(false).with_writer(std::sync::Mutex::new(file)).try_init().ok();
        }
        (None, LogTarget::Stderr) => {
            builder.with_writer(std::io::stderr).try_init().ok();
        }
        (None, LogTarget::FileOnly) => {}
    }

    Ok(())
}

/// Rewrite argv so `bands` defaults to `bands tui`.
///
/// Rules:
/// - `bands`                      -> `bands tui`
/// - `bands --offline ...`        -> `bands tui --offline ...`
/// - `bands --help/--version/-h`  -> unchanged (show top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("tui".to_string());
        return argv;
    };

    let is_top_level_help_or_version = matches!(arg1.as_str(), "-h" | "--help" | "-V" | "--version" | "help");
    if is_top_level_help_or_version {
        return argv;
    }

    let is_subcommand = matches!(arg1.as_str(), "show" | "export" | "tui" | "debug");
    if is_subcommand {
        return argv;
    }

    // If the first token is a flag, treat it as "tui flags".
    if arg1.starts_with('-') {
        argv.insert(1, "tui".to_string());
        return argv;
    }

    // Otherwise, leave as-is.
    argv
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn bare_invocation_opens_tui() {
        assert_eq!(rewrite_args(argv(&["bands"])), argv(&["bands", "tui"]));
    }

    #[test]
    fn leading_flags_go_to_tui() {
        assert_eq!(
            rewrite_args(argv(&["bands", "--offline", "--lower0", "950"])),
            argv(&["bands", "tui", "--offline", "--lower0", "950"])
        );
    }

    #[test]
    fn subcommands_and_help_pass_through() {
        assert_eq!(rewrite_args(argv(&["bands", "show"])), argv(&["bands", "show"]));
        assert_eq!(rewrite_args(argv(&["bands", "--help"])), argv(&["bands", "--help"]));
    }
}
