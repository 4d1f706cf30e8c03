//! Worker process protocol
//!
//! A worker reads one JSON [`WorkRequest`] per line on stdin, runs the named
//! test against a private buffered collector and writes one [`WorkReply`]
//! line back on stdout. Replies are marked with [`REPLY_PREFIX`] so anything
//! else a test manages to print on the real stdout is ignored by the parent,
//! including unterminated text that ends up in front of the marker.

use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use tracing::{debug, warn};

use crate::error::{EngineError, WorkerError};
use crate::models::{Outcome, Registry, TestId, TestItem};
use crate::result::{CollectorOptions, OutcomeRecorder, ResultCollector};

/// Marker in front of every reply line
pub const REPLY_PREFIX: &str = "@@outcomes ";

/// Parent to worker: run this test
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkRequest {
    pub test: TestId,
}

/// Worker to parent: everything the test reported, in order
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkReply {
    pub test: TestId,
    pub outcomes: Vec<Outcome>,
}

impl WorkReply {
    /// Encode as a single protocol line, prefix and newline included.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        Ok(format!("{REPLY_PREFIX}{}\n", serde_json::to_string(self)?))
    }

    /// Decode a protocol line. Returns `None` for lines without the prefix.
    /// Text before the prefix is stray test output and is dropped.
    pub fn from_line(line: &str) -> Option<Result<Self, serde_json::Error>> {
        line.find(REPLY_PREFIX).map(|at| {
            let payload = &line[at + REPLY_PREFIX.len()..];
            serde_json::from_str(payload.trim_end())
        })
    }
}

/// Run one item on its own, with output capture on, and return its outcomes.
pub fn run_isolated(item: &TestItem) -> Result<Vec<Outcome>, EngineError> {
    let recorder = OutcomeRecorder::new();
    let mut collector =
        ResultCollector::new(CollectorOptions::buffered()).with_handler(recorder.clone());
    item.run(&mut collector)?;
    Ok(recorder.take_outcomes())
}

/// Serve requests until `input` reaches end of file.
///
/// Returns the number of requests answered.
pub fn serve<R, W>(registry: &Registry, input: R, mut output: W) -> Result<usize, EngineError>
where
    R: BufRead,
    W: Write,
{
    let mut served = 0;
    for line in input.lines() {
        let line = line.map_err(WorkerError::from)?;
        if line.trim().is_empty() {
            continue;
        }
        let request: WorkRequest = serde_json::from_str(&line).map_err(WorkerError::from)?;
        debug!("Worker running {}", request.test);

        let outcomes = match registry.find(&request.test) {
            Some(item) => run_isolated(item),
            None => {
                warn!("Worker has no test registered as {}", request.test);
                let missing = TestItem::error_placeholder(
                    request.test.clone(),
                    format!("No test registered as {}", request.test),
                );
                run_isolated(&missing)
            }
        }?;

        let reply = WorkReply {
            test: request.test,
            outcomes,
        };
        let line = reply.to_line().map_err(WorkerError::from)?;
        output
            .write_all(line.as_bytes())
            .and_then(|()| output.flush())
            .map_err(WorkerError::from)?;
        served += 1;
    }
    debug!("Worker input closed after {served} requests");
    Ok(served)
}
