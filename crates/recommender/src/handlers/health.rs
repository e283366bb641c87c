//! Health check handlers

use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, Json};
use friendlink_common::db::DbPool;
use friendlink_common::errors::Result;
use friendlink_common::kv::RedisStore;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

use crate::AppState;

/// A dependency the readiness probe pings
#[async_trait]
pub trait Probe: Send + Sync {
    fn name(&self) -> &'static str;

    async fn ping(&self) -> Result<()>;
}

#[async_trait]
impl Probe for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn ping(&self) -> Result<()> {
        RedisStore::ping(self).await
    }
}

#[async_trait]
impl Probe for DbPool {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn ping(&self) -> Result<()> {
        DbPool::ping(self).await
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub checks: BTreeMap<&'static str, CheckResult>,
}

#[derive(Serialize)]
pub struct CheckResult {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Liveness probe - always returns healthy if server is running
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.config.observability.service_name.clone(),
        version: friendlink_common::VERSION,
    })
}

/// Readiness probe - pings every store the engine reads
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let mut checks = BTreeMap::new();

    for probe in state.probes.iter() {
        let start = Instant::now();
        let check = match probe.ping().await {
            Ok(()) => CheckResult {
                status: "up".to_string(),
                latency_ms: Some(start.elapsed().as_millis() as u64),
                error: None,
            },
            Err(e) => CheckResult {
                status: "down".to_string(),
                latency_ms: None,
                error: Some(e.to_string()),
            },
        };
        checks.insert(probe.name(), check);
    }

    let all_up = checks.values().all(|c| c.status == "up");
    let status = if all_up { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status,
        Json(ReadyResponse {
            status: if all_up { "ready" } else { "not_ready" }.to_string(),
            checks,
        }),
    )
}
