//! Configuration module
//!
//! Handles loading and managing run configuration. Values come from a config
//! file, then `SUITE_RUNNER_*` environment variables, then command-line flags,
//! each layer overriding the previous one.

pub mod env;
pub mod file;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::output::Verbosity;
use crate::result::CollectorOptions;
use env::EnvConfig;

/// Run configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Buffer test output and attach it to failures
    pub buffer: bool,

    /// Stop after the first failure or error
    pub failfast: bool,

    /// Run on a pool of worker processes
    pub parallel: bool,

    /// Worker processes when running in parallel
    pub processes: usize,

    /// Tests a worker process runs before it is replaced
    pub max_tasks_per_worker: Option<usize>,

    /// How often the parent polls for worker results
    pub poll_interval_ms: u64,

    /// How long workers get to exit at shutdown
    pub shutdown_grace_ms: u64,

    /// Console verbosity
    pub verbosity: Verbosity,

    /// Report the N slowest tests (0 disables the report)
    pub summarize_slowest: usize,

    /// Log level for the engine's own diagnostics
    pub log_level: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            buffer: false,
            failfast: false,
            parallel: false,
            processes: default_processes(),
            max_tasks_per_worker: None,
            poll_interval_ms: 100,
            shutdown_grace_ms: 2000,
            verbosity: Verbosity::Standard,
            summarize_slowest: 0,
            log_level: "warn".to_string(),
        }
    }
}

fn default_processes() -> usize {
    std::thread::available_parallelism().map_or(4, |n| n.get())
}

impl RunConfig {
    /// Apply environment overrides
    pub fn apply_env(&mut self, env: &EnvConfig) {
        if let Some(buffer) = env.buffer {
            self.buffer = buffer;
        }
        if let Some(failfast) = env.failfast {
            self.failfast = failfast;
        }
        if let Some(parallel) = env.parallel {
            self.parallel = parallel;
        }
        if let Some(processes) = env.processes {
            self.processes = processes;
        }
        if let Some(max_tasks) = env.max_tasks_per_worker {
            self.max_tasks_per_worker = Some(max_tasks);
        }
        if let Some(verbosity) = env.verbosity.as_deref().and_then(Verbosity::from_str) {
            self.verbosity = verbosity;
        }
        if let Some(slowest) = env.slowest {
            self.summarize_slowest = slowest;
        }
        if let Some(level) = &env.log_level {
            self.log_level = level.clone();
        }
    }

    pub fn collector_options(&self) -> CollectorOptions {
        CollectorOptions {
            buffer: self.buffer,
            failfast: self.failfast,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
