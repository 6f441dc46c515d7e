//! Types for recording metrics of training.
//!
//! A [`Record`] holds the most recent value of every registered metric.
//! [`Recorder`]s write records to some output, e.g. a console table
//! ([`ConsoleRecorder`]) or a tab separated log file ([`TsvRecorder`]).
mod base;
mod console_recorder;
mod recorder;
mod tsv_recorder;

pub use base::{Record, RecordValue};
pub use console_recorder::ConsoleRecorder;
pub use recorder::Recorder;
pub use tsv_recorder::TsvRecorder;
