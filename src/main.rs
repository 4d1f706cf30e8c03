//! suite-runner - test-suite execution engine
//!
//! Runs the bundled test catalog either sequentially, with namespace and
//! group fixtures, or on a pool of worker processes that re-invoke this
//! binary with its hidden `worker` subcommand.
//!
//! ## Usage
//!
//! ```bash
//! # Run everything in declared order
//! suite-runner run
//!
//! # Four worker processes, stop at the first failure
//! suite-runner run -j 4 --failfast
//!
//! # Only the arith namespace, verbose, with the 5 slowest tests
//! suite-runner run -k arith -v --slowest 5
//!
//! # List tests with their fixtures
//! suite-runner list --detailed
//! ```

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};

use suite_runner::catalog::sample_registry;
use suite_runner::cli::{self, Args, Command};
use suite_runner::config::env::{print_env_help, EnvConfig};
use suite_runner::config::file::ConfigFile;
use suite_runner::config::RunConfig;
use suite_runner::executor::{worker, ParallelExecutor, SequentialExecutor, WorkerCommand};
use suite_runner::models::TestItem;
use suite_runner::output::{ConsoleHandler, JsonReportHandler, TimingHandler};
use suite_runner::result::ResultCollector;
use suite_runner::utils::logger::{init_logger, LogLevel};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let env = EnvConfig::load();

    match args.command {
        Command::Run(run_args) => run_tests(run_args, &env, args.log_level).await,
        Command::List(list_args) => {
            init_logger(log_level(args.log_level.as_deref(), &env));
            list_tests(list_args)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Worker => {
            init_logger(log_level(args.log_level.as_deref(), &env));
            serve_worker().await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Env => {
            print_env_help();
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn log_level(flag: Option<&str>, env: &EnvConfig) -> LogLevel {
    flag.or(env.log_level.as_deref())
        .and_then(LogLevel::from_str)
        .unwrap_or(LogLevel::Warn)
}

/// File, then environment, then command-line flags.
fn resolve_config(args: &cli::RunArgs, env: &EnvConfig) -> Result<RunConfig> {
    let path = args
        .config
        .clone()
        .or_else(|| env.config_file.as_ref().map(PathBuf::from));

    let file = match path {
        Some(path) => {
            debug!("Loading configuration from {}", path.display());
            ConfigFile::load(&path)?
        }
        None => ConfigFile::load_default()?,
    };
    let mut config = file.run;
    config.apply_env(env);
    args.apply(&mut config);
    Ok(config)
}

async fn run_tests(args: cli::RunArgs, env: &EnvConfig, log_flag: Option<String>) -> Result<ExitCode> {
    let mut config = resolve_config(&args, env)?;
    if let Some(level) = log_flag {
        config.log_level = level;
    }
    init_logger(LogLevel::from_str(&config.log_level).unwrap_or(LogLevel::Warn));

    let registry = sample_registry().context("Failed to build the test catalog")?;
    let suite = registry.suite();
    let suite = if args.filter.is_empty() {
        suite
    } else {
        suite.filter(|item| args.matches(&item.id().to_string()))
    };

    let mut console = ConsoleHandler::stdout(config.verbosity).with_total(suite.count());
    if !std::io::stdout().is_terminal() {
        console = console.no_color();
    }
    let mut collector = ResultCollector::new(config.collector_options()).with_handler(console);
    if config.summarize_slowest > 0 {
        collector.add_handler(TimingHandler::stdout(config.summarize_slowest));
    }
    if let Some(path) = &args.json_report {
        collector.add_handler(JsonReportHandler::new(path));
    }

    if config.parallel {
        let command =
            WorkerCommand::current_exe().context("Failed to locate the worker executable")?;
        let worker_log = config.log_level.clone();
        let executor = ParallelExecutor::new(command, config.processes)
            .with_max_tasks_per_worker(config.max_tasks_per_worker)
            .with_poll_interval(config.poll_interval())
            .with_shutdown_grace(config.shutdown_grace())
            .with_initializer(move |command| {
                command.env("SUITE_RUNNER_LOG", &worker_log);
            });
        info!(
            "Running {} tests on {} worker processes",
            suite.count(),
            executor.process_count()
        );
        executor.run(&suite, &mut collector).await?;
    } else {
        info!("Running {} tests", suite.count());
        SequentialExecutor::new().run(&suite, &mut collector)?;
    }

    Ok(if collector.was_successful() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn serve_worker() -> Result<()> {
    let served = tokio::task::spawn_blocking(|| -> Result<usize> {
        let registry = sample_registry().context("Failed to build the test catalog")?;
        let stdin = std::io::stdin();
        let stdout = std::io::stdout();
        Ok(worker::serve(&registry, stdin.lock(), stdout.lock())?)
    })
    .await
    .context("Worker task panicked")??;
    debug!("Worker exiting after {served} tests");
    Ok(())
}

fn list_tests(args: cli::ListArgs) -> Result<()> {
    let registry = sample_registry().context("Failed to build the test catalog")?;
    let suite = registry.suite();
    let leaves: Vec<&TestItem> = suite
        .leaves()
        .into_iter()
        .filter(|item| args.matches(&item.id().to_string()))
        .collect();

    println!("\nRegistered tests ({} total)", leaves.len());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let mut current_scope = "";
    for item in &leaves {
        let scope = item.id().group.as_str();
        if scope != current_scope {
            println!("\n{scope}");
            if args.detailed {
                if let Some(fixtures) = describe_fixtures(item) {
                    println!("  fixtures: {fixtures}");
                }
            }
            println!("──────────────────────────────────────────────────────────────────────");
            current_scope = scope;
        }

        let mut markers = Vec::new();
        if item.is_placeholder() {
            markers.push("collection error".to_string());
        }
        if item.is_expected_failure() {
            markers.push("expected failure".to_string());
        }
        if let Some(reason) = item.skip_reason() {
            markers.push(format!("skip: {reason}"));
        }
        if markers.is_empty() || !args.detailed {
            println!("  {}", item.id().method);
        } else {
            println!("  {:30} [{}]", item.id().method, markers.join(", "));
        }
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
    Ok(())
}

fn describe_fixtures(item: &TestItem) -> Option<String> {
    let group = item.group()?;
    let hooks = group.hooks();
    let mut names = Vec::new();
    if group.namespace().setup_hook().is_some() {
        names.push("namespace setup");
    }
    if group.namespace().teardown_hook().is_some() {
        names.push("namespace teardown");
    }
    if hooks.setup.is_some() {
        names.push("setup");
    }
    if hooks.teardown.is_some() {
        names.push("teardown");
    }
    if hooks.before_each.is_some() {
        names.push("before_each");
    }
    if hooks.after_each.is_some() {
        names.push("after_each");
    }
    if let Some(reason) = group.skip_reason() {
        return Some(format!("skipped ({reason})"));
    }
    if names.is_empty() {
        None
    } else {
        Some(names.join(", "))
    }
}
