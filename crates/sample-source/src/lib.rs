//! Sample Source
//!
//! Narrow read interface over a vehicle time-series store. Segment detection
//! only ever sees the three shapes defined here: raw level samples, windowed
//! arrival counts, and discrete state changes.

mod memory;
mod source;
mod types;

pub use memory::MemorySource;
pub use source::SampleSource;
pub use types::{LevelSample, SignalRecord, StateChange, ValueFilter, Window, WindowQuery};

use thiserror::Error;

/// Sample source errors
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Query failed: {0}")]
    QueryFailed(String),
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    #[error("Fixture error: {0}")]
    Fixture(String),
}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        SourceError::Fixture(err.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Fixture(err.to_string())
    }
}
