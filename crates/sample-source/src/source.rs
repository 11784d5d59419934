//! Sample Source Trait

use crate::types::{LevelSample, StateChange, Window, WindowQuery};
use crate::SourceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Read-only access to a vehicle time-series store.
///
/// Implementations own retries and timeouts; callers cancel a read by
/// dropping the returned future.
#[async_trait]
pub trait SampleSource: Send + Sync {
    /// Raw samples of one signal in `[from, to]`, ascending by timestamp
    async fn level_samples(
        &self,
        token_id: u32,
        signal: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LevelSample>, SourceError>;

    /// Pre-aggregated arrival counts per window, ascending by window start
    async fn windowed_counts(
        &self,
        token_id: u32,
        query: &WindowQuery,
    ) -> Result<Vec<Window>, SourceError>;

    /// Transitions of one signal in `[from, to]`, ascending, with
    /// `prev_state != new_state`
    async fn state_changes(
        &self,
        token_id: u32,
        signal: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StateChange>, SourceError>;
}
