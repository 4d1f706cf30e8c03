//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use std::env;

/// Environment variable prefix
const ENV_PREFIX: &str = "SUITE_RUNNER";

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Buffer output from SUITE_RUNNER_BUFFER
    pub buffer: Option<bool>,
    /// Fail-fast from SUITE_RUNNER_FAILFAST
    pub failfast: Option<bool>,
    /// Parallel from SUITE_RUNNER_PARALLEL
    pub parallel: Option<bool>,
    /// Worker processes from SUITE_RUNNER_PROCESSES
    pub processes: Option<usize>,
    /// Worker recycling from SUITE_RUNNER_MAX_TASKS
    pub max_tasks_per_worker: Option<usize>,
    /// Console verbosity from SUITE_RUNNER_VERBOSITY
    pub verbosity: Option<String>,
    /// Slowest-test report size from SUITE_RUNNER_SLOWEST
    pub slowest: Option<usize>,
    /// Log level from SUITE_RUNNER_LOG
    pub log_level: Option<String>,
    /// Config file from SUITE_RUNNER_CONFIG
    pub config_file: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            buffer: get_env_bool("BUFFER"),
            failfast: get_env_bool("FAILFAST"),
            parallel: get_env_bool("PARALLEL"),
            processes: get_env_parse("PROCESSES"),
            max_tasks_per_worker: get_env_parse("MAX_TASKS"),
            verbosity: get_env("VERBOSITY"),
            slowest: get_env_parse("SLOWEST"),
            log_level: get_env("LOG"),
            config_file: get_env("CONFIG"),
        }
    }

}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

/// Print all SUITE_RUNNER environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_BUFFER      Buffer test output (true/false)");
    println!("  {ENV_PREFIX}_FAILFAST    Stop on first failure (true/false)");
    println!("  {ENV_PREFIX}_PARALLEL    Run on worker processes (true/false)");
    println!("  {ENV_PREFIX}_PROCESSES   Number of worker processes");
    println!("  {ENV_PREFIX}_MAX_TASKS   Tests per worker before it is replaced");
    println!("  {ENV_PREFIX}_VERBOSITY   quiet, standard or verbose");
    println!("  {ENV_PREFIX}_SLOWEST     Report the N slowest tests");
    println!("  {ENV_PREFIX}_LOG         Log level (trace, debug, info, warn, error)");
    println!("  {ENV_PREFIX}_CONFIG      Path to configuration file");
}
