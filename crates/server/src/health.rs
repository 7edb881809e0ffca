use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info};

use mailbrief_core::lifecycle::SubscriptionState;
use mailbrief_db::repositories::SummarySessionRepository;

#[derive(Clone)]
pub struct HealthState {
    sessions: Arc<dyn SummarySessionRepository>,
    subscription: watch::Receiver<SubscriptionState>,
}

impl HealthState {
    pub fn new(
        sessions: Arc<dyn SummarySessionRepository>,
        subscription: watch::Receiver<SubscriptionState>,
    ) -> Self {
        Self { sessions, subscription }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub store: HealthCheck,
    pub realtime: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn spawn(bind_address: &str, port: u16, state: HealthState) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(state)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

/// Readiness follows the store probe only. The realtime state is reported
/// for operators but a reconnecting subscription does not fail the check.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let store = store_check(state.sessions.as_ref()).await;
    let ready = store.status == "ready";
    let realtime = realtime_check(*state.subscription.borrow());

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "mailbrief-server runtime initialized".to_string(),
        },
        store,
        realtime,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn store_check(sessions: &dyn SummarySessionRepository) -> HealthCheck {
    match sessions.latest().await {
        Ok(Some(session)) => HealthCheck {
            status: "ready",
            detail: format!("latest session {} read", session.id.0),
        },
        Ok(None) => HealthCheck { status: "ready", detail: "store reachable, no sessions yet".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("store read failed: {error}") }
        }
    }
}

fn realtime_check(state: SubscriptionState) -> HealthCheck {
    let status = if state == SubscriptionState::Active { "ready" } else { "degraded" };
    HealthCheck { status, detail: format!("subscription {}", state.as_str()) }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        extract::State,
        http::{Request, StatusCode},
        Json,
    };
    use chrono::Utc;
    use tokio::sync::watch;
    use tower::ServiceExt;

    use mailbrief_core::domain::session::{SessionId, SummarySession};
    use mailbrief_core::lifecycle::SubscriptionState;
    use mailbrief_db::repositories::InMemorySummarySessionRepository;

    use crate::health::{health, router, HealthState};

    fn state(
        sessions: Arc<InMemorySummarySessionRepository>,
        subscription: SubscriptionState,
    ) -> HealthState {
        let (_sender, receiver) = watch::channel(subscription);
        HealthState::new(sessions, receiver)
    }

    #[tokio::test]
    async fn health_returns_ready_when_store_is_reachable() {
        let sessions = Arc::new(InMemorySummarySessionRepository::with_sessions(vec![
            SummarySession {
                id: SessionId(7),
                created_at: Utc::now(),
                summary_text: None,
                total_professional_emails: 0,
                job_emails: 0,
                urgent_count: 0,
            },
        ]));

        let (status, Json(payload)) = health(State(state(sessions, SubscriptionState::Active))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.store.status, "ready");
        assert_eq!(payload.store.detail, "latest session 7 read");
        assert_eq!(payload.realtime.status, "ready");
    }

    #[tokio::test]
    async fn health_stays_ready_while_realtime_reconnects() {
        let sessions = Arc::new(InMemorySummarySessionRepository::default());

        let (status, Json(payload)) =
            health(State(state(sessions, SubscriptionState::Disconnected))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.realtime.status, "degraded");
        assert_eq!(payload.realtime.detail, "subscription disconnected");
    }

    #[tokio::test]
    async fn health_returns_service_unavailable_when_store_is_down() {
        let sessions = Arc::new(InMemorySummarySessionRepository::default());
        sessions.set_outage(Some("connection refused")).await;

        let (status, Json(payload)) = health(State(state(sessions, SubscriptionState::Active))).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.store.status, "degraded");
        assert!(payload.store.detail.contains("connection refused"));
        assert_eq!(payload.service.status, "ready");
    }

    #[tokio::test]
    async fn router_serves_health_as_json() {
        let sessions = Arc::new(InMemorySummarySessionRepository::default());
        let app = router(state(sessions, SubscriptionState::Active));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(json["status"], "ready");
        assert_eq!(json["store"]["detail"], "store reachable, no sessions yet");
    }
}
