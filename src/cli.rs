//! Command-line interface built on clap.
//!
//! [`Cli`] carries the global flags (--config, --max-retries, --verbose) and
//! one of the [`Command`] subcommands (demo, run, verify).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Case lifecycle and assignment workflow for animal-rescue coordination.
#[derive(Debug, Parser)]
#[command(name = "rescue-workflow", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (defaults to ./rescue.toml when present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the optimistic-concurrency retry budget.
    #[arg(long, global = true)]
    pub max_retries: Option<u32>,

    /// Debug-level logging.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Runs the bundled demo cases and prints their timelines.
    Demo,

    /// Executes a JSON or TOML script of workflow steps.
    Run {
        /// Path to the script.
        file: PathBuf,

        /// Seed the store from a JSON snapshot before running.
        #[arg(long)]
        snapshot_in: Option<PathBuf>,

        /// Write the resulting store snapshot as JSON.
        #[arg(long)]
        snapshot_out: Option<PathBuf>,
    },

    /// Audits a JSON store snapshot for inconsistent cases.
    Verify {
        /// Path to the snapshot.
        snapshot: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_run_subcommand() {
        let cli = Cli::parse_from([
            "rescue-workflow",
            "run",
            "cases.toml",
            "--snapshot-out",
            "out.json",
        ]);
        match cli.command {
            Command::Run {
                file,
                snapshot_in,
                snapshot_out,
            } => {
                assert_eq!(file, PathBuf::from("cases.toml"));
                assert!(snapshot_in.is_none());
                assert_eq!(snapshot_out.unwrap(), PathBuf::from("out.json"));
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from([
            "rescue-workflow",
            "--config",
            "custom.toml",
            "--max-retries",
            "5",
            "--verbose",
            "demo",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.config.unwrap(), PathBuf::from("custom.toml"));
        assert_eq!(cli.max_retries, Some(5));
        assert!(matches!(cli.command, Command::Demo));
    }

    #[test]
    fn cli_parses_verify_subcommand() {
        let cli = Cli::parse_from(["rescue-workflow", "verify", "snapshot.json"]);
        match cli.command {
            Command::Verify { snapshot } => assert_eq!(snapshot, PathBuf::from("snapshot.json")),
            _ => panic!("expected Verify command"),
        }
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
