//! Reporting handlers.
//!
//! Each handler reads point-in-time snapshots from the [`Watchdog`] and
//! returns JSON; nothing here mutates supervision state.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use routewarden_core::{TargetSnapshot, Watchdog};

/// Body of a readiness response.
#[derive(serde::Serialize)]
struct ReadinessResponse {
    status: &'static str,
    targets: Vec<TargetSnapshot>,
}

/// GET /livez
///
/// Liveness is about this process, not the supervised targets: if the
/// handler runs at all, the answer is `ok`.
pub async fn livez() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /readyz
///
/// Ready iff every critical target is up. The snapshot list rides along in
/// both cases so an operator can see which target is holding readiness back.
pub async fn readyz(State(watchdog): State<Arc<Watchdog>>) -> impl IntoResponse {
    let targets = watchdog.all_states();
    if watchdog.is_ready() {
        (
            StatusCode::OK,
            Json(ReadinessResponse {
                status: "ready",
                targets,
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not_ready",
                targets,
            }),
        )
    }
}

/// GET /api/v1/targets
pub async fn list_targets(State(watchdog): State<Arc<Watchdog>>) -> impl IntoResponse {
    Json(watchdog.all_states())
}

/// GET /api/v1/targets/{name}
pub async fn get_target(
    State(watchdog): State<Arc<Watchdog>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match watchdog.state(&name) {
        Some(snapshot) => Json(snapshot).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "target not found" })),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use routewarden_core::{
        FailureAction, HealthResult, RunnerConfig, Target, TargetState, Watchdog,
    };
    use tower::ServiceExt;

    use crate::build_router;

    /// A target with a fixed probe verdict.
    struct StaticTarget {
        name: String,
        critical: bool,
        healthy: bool,
    }

    impl StaticTarget {
        fn new(name: &str, critical: bool, healthy: bool) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                critical,
                healthy,
            })
        }
    }

    #[async_trait]
    impl Target for StaticTarget {
        fn name(&self) -> &str {
            &self.name
        }

        fn critical(&self) -> bool {
            self.critical
        }

        async fn check(&self, _timeout: Duration) -> HealthResult {
            if self.healthy {
                HealthResult::healthy(Duration::from_millis(1))
            } else {
                HealthResult::unhealthy("static failure", Duration::from_millis(1))
            }
        }

        async fn connect(&self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn disconnect(&self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn restart(&self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn recover(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn fast_config() -> RunnerConfig {
        RunnerConfig {
            interval: Duration::from_millis(50),
            timeout: Duration::from_millis(25),
            failure_threshold: 3,
            action: FailureAction::Warn,
            ..RunnerConfig::default()
        }
    }

    async fn wait_until_up(watchdog: &Watchdog, name: &str) {
        for _ in 0..200 {
            if watchdog.state(name).map(|s| s.state) == Some(TargetState::Up) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{name} never came up");
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn livez_is_always_ok() {
        let router = build_router(Arc::new(Watchdog::new()));
        let resp = router
            .oneshot(Request::builder().uri("/livez").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["status"], "ok");
    }

    #[tokio::test]
    async fn readyz_reports_not_ready_before_first_probe() {
        let watchdog = Arc::new(Watchdog::new());
        watchdog
            .register(StaticTarget::new("bgpd", true, true), fast_config())
            .await
            .unwrap();

        let router = build_router(watchdog);
        let resp = router
            .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let json = body_json(resp).await;
        assert_eq!(json["status"], "not_ready");
        assert_eq!(json["targets"][0]["state"], "init");
    }

    #[tokio::test]
    async fn readyz_turns_ready_when_critical_targets_are_up() {
        let watchdog = Arc::new(Watchdog::new());
        watchdog
            .register(StaticTarget::new("bgpd", true, true), fast_config())
            .await
            .unwrap();
        watchdog
            .register(StaticTarget::new("stats", false, false), fast_config())
            .await
            .unwrap();
        watchdog.start().unwrap();
        wait_until_up(&watchdog, "bgpd").await;

        let router = build_router(watchdog.clone());
        let resp = router
            .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let json = body_json(resp).await;
        assert_eq!(json["status"], "ready");
        assert_eq!(json["targets"].as_array().unwrap().len(), 2);

        watchdog.stop().await;
    }

    #[tokio::test]
    async fn target_snapshot_roundtrips_as_json() {
        let watchdog = Arc::new(Watchdog::new());
        watchdog
            .register(StaticTarget::new("bgpd", true, true), fast_config())
            .await
            .unwrap();
        watchdog.start().unwrap();
        wait_until_up(&watchdog, "bgpd").await;

        let router = build_router(watchdog.clone());
        let resp = router
            .oneshot(
                Request::builder()
                    .uri("/api/v1/targets/bgpd")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let json = body_json(resp).await;
        assert_eq!(json["name"], "bgpd");
        assert_eq!(json["state"], "up");
        assert_eq!(json["critical"], true);
        assert_eq!(json["last_result"]["healthy"], true);
        assert!(json["uptime"].is_string());

        watchdog.stop().await;
    }

    #[tokio::test]
    async fn unknown_target_is_404() {
        let router = build_router(Arc::new(Watchdog::new()));
        let resp = router
            .oneshot(
                Request::builder()
                    .uri("/api/v1/targets/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_targets_empty_registry() {
        let router = build_router(Arc::new(Watchdog::new()));
        let resp = router
            .oneshot(
                Request::builder()
                    .uri("/api/v1/targets")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, serde_json::json!([]));
    }
}
