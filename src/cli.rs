// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `builddag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "builddag",
    version,
    about = "Incremental, parallel build of the tasks declared in a TOML file.",
    long_about = None
)]
pub struct CliArgs {
    /// Targets to build: task names or target paths. Builds every declared
    /// task when omitted.
    #[arg(value_name = "TARGET")]
    pub targets: Vec<String>,

    /// Path to the build description (TOML).
    #[arg(long, value_name = "PATH", default_value = "Builddag.toml")]
    pub config: String,

    /// Worker threads; overrides `[config].jobs`.
    #[arg(long, short = 'j', value_name = "N")]
    pub jobs: Option<usize>,

    /// Build database path; overrides `[config].db`.
    #[arg(long, value_name = "PATH")]
    pub db: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `BUILDDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse and validate, print the tasks, but don't execute anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Remove the outputs of the given targets (or of everything) instead of
    /// building.
    #[arg(long, conflicts_with = "dry_run")]
    pub clean: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_targets_and_overrides() {
        let args = CliArgs::try_parse_from(["builddag", "out/a", "link", "-j", "3", "--db", "x.json"])
            .unwrap();
        assert_eq!(args.targets, ["out/a", "link"]);
        assert_eq!(args.jobs, Some(3));
        assert_eq!(args.db.as_deref(), Some("x.json"));
        assert_eq!(args.config, "Builddag.toml");
        assert!(!args.clean);
    }

    #[test]
    fn clean_and_dry_run_conflict() {
        assert!(CliArgs::try_parse_from(["builddag", "--clean", "--dry-run"]).is_err());
    }
}
