//! Test execution engine
//!
//! Provides sequential and process-parallel test execution.

mod fixture;
mod parallel;
mod runner;
pub mod worker;

pub use fixture::FixtureState;
pub use parallel::{Initializer, ParallelExecutor, WorkerCommand};
pub use runner::SequentialExecutor;
