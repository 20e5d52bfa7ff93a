//! Router assembly: HTTP endpoints, WebSocket upgrade, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - JSON API under `/api/v1/...`
/// - CORS (allow any origin/method/headers); tighten for production
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // HTTP API
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/question", get(http::http_get_question))
        .route("/api/v1/answer", post(http::http_post_answer))
        .route("/api/v1/ability", get(http::http_get_ability))
        .route("/api/v1/readiness", get(http::http_get_readiness))
        .route("/api/v1/recommendations", get(http::http_get_recommendations))
        .route("/api/v1/questions/:id/stats", get(http::http_get_question_stats))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::config::parse_config;

    fn app() -> Router {
        build_router(Arc::new(AppState::from_config(parse_config("").unwrap(), None)))
    }

    async fn json_body(res: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_lists_seeded_inventory() {
        let res = app().oneshot(get_req("/api/v1/health")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let v = json_body(res).await;
        assert_eq!(v["ok"], true);
        assert_eq!(v["generation"], false);
        let exams: Vec<_> = v["inventory"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["examType"].as_str().unwrap().to_string())
            .collect();
        assert!(exams.contains(&"GMAT".to_string()));
    }

    #[tokio::test]
    async fn question_then_answer_then_stats() {
        let app = app();
        let res = app
            .clone()
            .oneshot(get_req("/api/v1/question?userId=u1&examType=GRE"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let v = json_body(res).await;
        let id = v["question"]["id"].as_str().unwrap().to_string();
        let p = v["predictedSuccess"].as_f64().unwrap();
        assert!(p > 0.0 && p < 1.0);

        let body = serde_json::json!({"userId": "u1", "questionId": id, "answer": "B", "responseTime": 60});
        let res = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/answer")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let v = json_body(res).await;
        assert_eq!(v["statsRecorded"], true);

        let res = app
            .oneshot(get_req(&format!("/api/v1/questions/{}/stats", id)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let v = json_body(res).await;
        assert_eq!(v["stats"]["timesAnswered"], 1);
    }

    #[tokio::test]
    async fn unknown_exam_is_bad_request() {
        let res = app()
            .oneshot(get_req("/api/v1/question?userId=u1&examType=CHESS"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let v = json_body(res).await;
        assert!(v["error"].as_str().unwrap().contains("CHESS"));
    }

    #[tokio::test]
    async fn unknown_question_stats_is_not_found() {
        let res = app().oneshot(get_req("/api/v1/questions/missing/stats")).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn readiness_for_new_user_has_low_confidence() {
        let res = app()
            .oneshot(get_req("/api/v1/readiness?userId=fresh&examType=GMAT"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let v = json_body(res).await;
        assert_eq!(v["examType"], "GMAT");
        assert_eq!(v["confidence"], "low");
        assert_eq!(v["readinessScore"], 0);
        assert_eq!(v["answersConsidered"], 0);
    }

    #[tokio::test]
    async fn recommendations_start_empty() {
        let res = app()
            .oneshot(get_req("/api/v1/recommendations?userId=fresh&examType=GMAT"))
            .await
            .unwrap();
        let v = json_body(res).await;
        assert_eq!(v["topics"].as_array().unwrap().len(), 0);
    }
}
