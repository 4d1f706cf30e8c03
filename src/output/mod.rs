//! Built-in result handlers
//!
//! Console progress and summary, slowest-test timing and JSON reports.

mod console;
mod json;
mod timing;

pub use console::{ConsoleHandler, Verbosity};
pub use json::{JsonReport, JsonReportHandler};
pub use timing::{TimingHandler, TimingStats};
