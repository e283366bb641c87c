//! Recommendation handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use friendlink_common::{
    errors::{AppError, Result},
    graph::MemberId,
    metrics::RequestMetrics,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use validator::Validate;

use crate::engine::Candidate;
use crate::AppState;

const ENDPOINT: &str = "/v1/members/{id}/recommendations";

/// Query string of a recommendation request
#[derive(Debug, Deserialize, Validate)]
pub struct RecommendationQuery {
    /// 0-based page index
    #[serde(default)]
    #[validate(range(max = 10_000))]
    pub page: usize,

    /// Page size; the engine default applies when absent
    #[validate(range(min = 1))]
    pub size: Option<usize>,
}

/// Recommendation response
#[derive(Debug, Serialize)]
pub struct RecommendationResponse {
    pub member_id: MemberId,
    pub items: Vec<Candidate>,
    pub page: usize,
    pub page_size: usize,
    pub total_count: usize,
    pub has_next: bool,
    pub processing_time_ms: u64,
}

/// Recommend new connections for a member
pub async fn get_recommendations(
    State(state): State<AppState>,
    Path(member_id): Path<i64>,
    Query(query): Query<RecommendationQuery>,
) -> Result<Json<RecommendationResponse>> {
    let start = Instant::now();
    let request_metrics = RequestMetrics::start("GET", ENDPOINT);

    let outcome = recommend(&state, MemberId(member_id), query).await;
    request_metrics.finish(match &outcome {
        Ok(_) => 200,
        Err(e) => e.status_code().as_u16(),
    });

    let page = outcome?;
    Ok(Json(RecommendationResponse {
        member_id: MemberId(member_id),
        items: page.items,
        page: page.page,
        page_size: page.page_size,
        total_count: page.total_count,
        has_next: page.has_next,
        processing_time_ms: start.elapsed().as_millis() as u64,
    }))
}

async fn recommend(
    state: &AppState,
    member_id: MemberId,
    query: RecommendationQuery,
) -> Result<crate::engine::RecommendationPage> {
    query.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let size = query
        .size
        .unwrap_or(state.engine.settings().default_page_size);

    state.engine.recommend(member_id, query.page, size).await
}
