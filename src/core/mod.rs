pub mod aggregator;
pub mod combine;
pub mod csv_io;
pub mod dedupe;
pub mod duplicates;
pub mod engine;
pub mod processor;
pub mod splitter;
pub mod validator;

pub use crate::domain::model::{ChunkResult, Record, Rejection, RunReport, ValidationOutcome};
pub use crate::domain::ports::{ConfigProvider, EventSink};
pub use crate::utils::error::Result;
