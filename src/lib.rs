//! suite-runner
//!
//! Test-suite execution engine: a registry of namespaces, groups and test
//! bodies is turned into a suite tree, run either sequentially with scoped
//! fixtures or on a pool of worker processes, and every outcome is fanned out
//! to pluggable result handlers.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod models;
pub mod output;
pub mod result;
pub mod utils;

pub use error::{EngineError, WorkerError};
