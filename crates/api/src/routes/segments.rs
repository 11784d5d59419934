//! Segment Routes

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use segment_engine::{Mechanism, Segment, SegmentConfig};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ApiError;
use crate::AppState;

/// Query parameters for the segments endpoint. Times are RFC 3339.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentQuery {
    pub token_id: u32,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub mechanism: String,
    pub min_idle_seconds: Option<i64>,
    pub min_segment_duration_seconds: Option<i64>,
    pub signal_count_threshold: Option<u64>,
    pub max_gap_seconds: Option<i64>,
    pub max_idle_rpm: Option<f64>,
    pub min_increase_percent: Option<f64>,
}

impl SegmentQuery {
    fn config(&self) -> SegmentConfig {
        SegmentConfig {
            min_idle_seconds: self.min_idle_seconds,
            min_segment_duration_seconds: self.min_segment_duration_seconds,
            signal_count_threshold: self.signal_count_threshold,
            max_gap_seconds: self.max_gap_seconds,
            max_idle_rpm: self.max_idle_rpm,
            min_increase_percent: self.min_increase_percent,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SegmentResponse {
    pub data: Vec<Segment>,
    pub meta: SegmentMeta,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentMeta {
    pub count: usize,
    pub token_id: u32,
    pub mechanism: Mechanism,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// Detect segments for one vehicle
pub async fn get_segments(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SegmentQuery>, QueryRejection>,
) -> Result<Json<SegmentResponse>, ApiError> {
    let Query(params) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let mechanism: Mechanism = params.mechanism.parse()?;

    let detection = state.service.get_segments(
        params.token_id,
        params.from,
        params.to,
        mechanism,
        Some(params.config()),
    );
    let data = tokio::time::timeout(state.request_timeout, detection)
        .await
        .map_err(|_| ApiError::Timeout(state.request_timeout))??;

    Ok(Json(SegmentResponse {
        meta: SegmentMeta {
            count: data.len(),
            token_id: params.token_id,
            mechanism,
            from: params.from,
            to: params.to,
        },
        data,
    }))
}
