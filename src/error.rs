//! Engine error types

use thiserror::Error;

use crate::models::TestId;

/// Errors surfaced by the execution engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// An outcome was reported for a test that was never started.
    #[error("Outcome reported for {0} without a matching start_test")]
    LifecyclePairing(TestId),

    #[error("Test registered twice: {0}")]
    DuplicateTest(TestId),

    #[error("Worker pool failure: {0}")]
    Worker(#[from] WorkerError),
}

/// Errors talking to a worker process
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker pipe error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Worker exited before replying ({0})")]
    Exited(String),

    #[error("Malformed worker message: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("Worker replied for {got} while running {expected}")]
    Mismatch { expected: TestId, got: TestId },

    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
