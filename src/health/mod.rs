/*!
 * # Health Check Module
 *
 * - Basic health check (`/health`) - Simple up status with version
 * - Liveness check (`/health/live`) - The process is serving requests
 * - Readiness check (`/health/ready`) - The database answers a ping
 */

use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::warn;

/// Basic health status
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
}

/// Health check detail
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthDetail {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Overall health information
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthInfo {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub details: HashMap<String, HealthDetail>,
}

/// Health check state
#[derive(Clone)]
pub struct HealthState {
    pub db_pool: Arc<DatabaseConnection>,
    pub start_time: SystemTime,
}

impl HealthState {
    pub fn new(db_pool: Arc<DatabaseConnection>) -> Self {
        Self {
            db_pool,
            start_time: SystemTime::now(),
        }
    }

    /// Calculate system uptime
    pub fn uptime(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.start_time)
            .unwrap_or(Duration::from_secs(0))
            .as_secs()
    }

    fn snapshot(&self, details: HashMap<String, HealthDetail>) -> HealthInfo {
        HealthInfo {
            status: overall_status(&details),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            uptime_seconds: self.uptime(),
            details,
        }
    }

    async fn check_database(&self) -> HealthDetail {
        match crate::db::check_connection(&self.db_pool).await {
            Ok(()) => HealthDetail {
                status: HealthStatus::Up,
                message: None,
            },
            Err(e) => {
                warn!(error = %e, "Database readiness check failed");
                HealthDetail {
                    status: HealthStatus::Down,
                    message: Some("database unreachable".to_string()),
                }
            }
        }
    }
}

fn overall_status(details: &HashMap<String, HealthDetail>) -> HealthStatus {
    if details.values().any(|d| d.status == HealthStatus::Down) {
        HealthStatus::Down
    } else {
        HealthStatus::Up
    }
}

fn status_code(status: &HealthStatus) -> StatusCode {
    match status {
        HealthStatus::Up => StatusCode::OK,
        HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Basic health check endpoint
pub async fn health_check(State(state): State<HealthState>) -> impl IntoResponse {
    Json(state.snapshot(HashMap::new()))
}

/// Liveness check endpoint
pub async fn liveness_check(State(state): State<HealthState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "alive": true,
        "uptime_seconds": state.uptime(),
        "timestamp": Utc::now(),
    }))
}

/// Readiness check endpoint
pub async fn readiness_check(State(state): State<HealthState>) -> impl IntoResponse {
    let mut details = HashMap::new();
    details.insert("database".to_string(), state.check_database().await);
    let health = state.snapshot(details);
    (status_code(&health.status), Json(health))
}

/// `/health`, `/health/live` and `/health/ready` on any state that can
/// hand out a [`HealthState`].
pub fn health_routes<S>() -> Router<S>
where
    HealthState: FromRef<S>,
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness_check))
        .route("/health/ready", get(readiness_check))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail(status: HealthStatus) -> HealthDetail {
        HealthDetail {
            status,
            message: None,
        }
    }

    #[test]
    fn any_down_component_marks_the_service_down() {
        assert_eq!(status_code(&HealthStatus::Up), StatusCode::OK);
        assert_eq!(
            status_code(&HealthStatus::Down),
            StatusCode::SERVICE_UNAVAILABLE
        );

        let mut details = HashMap::new();
        assert_eq!(overall_status(&details), HealthStatus::Up);
        details.insert("cache".to_string(), detail(HealthStatus::Up));
        details.insert("database".to_string(), detail(HealthStatus::Down));
        assert_eq!(overall_status(&details), HealthStatus::Down);
    }
}
