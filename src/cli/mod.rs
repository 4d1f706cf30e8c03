//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::RunConfig;
use crate::output::Verbosity;

/// Test-suite runner with scoped fixtures and a process worker pool
#[derive(Parser, Debug)]
#[command(name = "suite-runner")]
#[command(version)]
#[command(about = "Run the bundled test catalog sequentially or on worker processes")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Log level for engine diagnostics (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run tests
    Run(RunArgs),

    /// List registered tests
    List(ListArgs),

    /// Serve the worker protocol on stdin/stdout
    #[command(hide = true)]
    Worker,

    /// Show the SUITE_RUNNER_* environment variables
    Env,
}

/// Arguments for run command
#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Run tests on a pool of worker processes
    #[arg(short, long)]
    pub parallel: bool,

    /// Number of worker processes (implies --parallel)
    #[arg(short = 'j', long)]
    pub processes: Option<usize>,

    /// Replace a worker after it has run this many tests
    #[arg(long)]
    pub max_tasks: Option<usize>,

    /// Stop after the first failure or error
    #[arg(short, long)]
    pub failfast: bool,

    /// Buffer test output and show it only for failing tests
    #[arg(short, long)]
    pub buffer: bool,

    /// Per-test output lines
    #[arg(short, long, conflicts_with_all = ["quiet", "verbosity"])]
    pub verbose: bool,

    /// Summary only
    #[arg(short, long, conflicts_with = "verbosity")]
    pub quiet: bool,

    /// Console verbosity (quiet, standard, verbose)
    #[arg(long)]
    pub verbosity: Option<String>,

    /// Only run tests whose id contains one of these substrings
    #[arg(short = 'k', long = "filter")]
    pub filter: Vec<String>,

    /// Configuration file (YAML or JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Report the N slowest tests
    #[arg(long)]
    pub slowest: Option<usize>,

    /// Write a JSON report of every outcome to this file
    #[arg(long)]
    pub json_report: Option<PathBuf>,
}

impl RunArgs {
    /// Verbosity requested on the command line, if any
    pub fn verbosity(&self) -> Option<Verbosity> {
        if self.verbose {
            Some(Verbosity::Verbose)
        } else if self.quiet {
            Some(Verbosity::Quiet)
        } else {
            self.verbosity.as_deref().and_then(Verbosity::from_str)
        }
    }

    /// Apply flags on top of file and environment configuration
    pub fn apply(&self, config: &mut RunConfig) {
        if self.parallel || self.processes.is_some() {
            config.parallel = true;
        }
        if let Some(processes) = self.processes {
            config.processes = processes.max(1);
        }
        if self.max_tasks.is_some() {
            config.max_tasks_per_worker = self.max_tasks;
        }
        if self.failfast {
            config.failfast = true;
        }
        if self.buffer {
            config.buffer = true;
        }
        if let Some(verbosity) = self.verbosity() {
            config.verbosity = verbosity;
        }
        if let Some(slowest) = self.slowest {
            config.summarize_slowest = slowest;
        }
    }

    /// Whether `id` passes the `--filter` patterns
    pub fn matches(&self, id: &str) -> bool {
        matches_filter(&self.filter, id)
    }
}

/// Arguments for list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Show namespaces and groups with their fixture hooks
    #[arg(short, long)]
    pub detailed: bool,

    /// Only list tests whose id contains one of these substrings
    #[arg(short = 'k', long = "filter")]
    pub filter: Vec<String>,
}

impl ListArgs {
    pub fn matches(&self, id: &str) -> bool {
        matches_filter(&self.filter, id)
    }
}

/// Substring match against any pattern; no patterns match everything.
fn matches_filter(patterns: &[String], id: &str) -> bool {
    patterns.is_empty() || patterns.iter().any(|pattern| id.contains(pattern.as_str()))
}
