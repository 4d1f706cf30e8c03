//! Result collection
//!
//! The collector, its handlers and the captured-output sink lent to tests.

mod capture;
mod collector;
mod handler;

pub use capture::{CapturedOutput, OutputStream};
pub use collector::{CollectorOptions, ResultCollector};
pub use handler::{Event, OutcomeRecorder, ResultHandler};
