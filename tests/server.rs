//! Router-level tests for the analysis service.

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use citewatch::config::TimeoutPolicy;
use citewatch::models::{ProviderId, ProviderResult, Query, UnifiedCitation};
use citewatch::pipeline::Dispatcher;
use citewatch::providers::ProviderAdapter;
use citewatch::server::{router, AppState};
use citewatch::store::InMemoryAnalysisStore;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

struct FixedAdapter;

#[async_trait]
impl ProviderAdapter for FixedAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::OpenAi
    }

    fn model_name(&self) -> &str {
        "fixed"
    }

    async fn call(&self, _query: &Query) -> ProviderResult {
        ProviderResult {
            success: true,
            provider_id: ProviderId::OpenAi,
            model_name: "fixed".to_string(),
            answer_text: "Acme and Rival both work.".to_string(),
            citations: vec![UnifiedCitation {
                id: "c1".to_string(),
                source_provider: ProviderId::OpenAi,
                position: 1,
                url: "https://rival.com/crm?utm_source=openai".to_string(),
                clean_url: "https://rival.com/crm".to_string(),
                domain: "rival.com".to_string(),
                title: Some("Rival CRM".to_string()),
                snippet: None,
                published_date: None,
                mention_count: 1,
                average_confidence: None,
                confidence_scores: vec![],
                text_spans: vec![],
            }],
            response_time_ms: 3,
            error: None,
            error_kind: None,
        }
    }
}

fn app() -> axum::Router {
    router(AppState {
        dispatcher: Arc::new(Dispatcher::new(
            vec![Arc::new(FixedAdapter)],
            TimeoutPolicy::default(),
        )),
        store: Arc::new(InMemoryAnalysisStore::new()),
        shutdown: CancellationToken::new(),
    })
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn blank_query_is_rejected() {
    let app = app();
    let (status, body) = send(&app, post_json("/analyze", json!({"query": "   "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "query must not be empty");
}

#[tokio::test]
async fn analysis_is_returned_and_stored() {
    let app = app();
    let (status, body) = send(
        &app,
        post_json(
            "/analyze",
            json!({"query": "best crm", "targetDomain": "acme.com", "targetBrand": "Acme"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"]["openai"]["success"], true);
    assert_eq!(body["summary"]["totalCitations"], 1);
    assert_eq!(body["summary"]["myDomainCited"], false);
    assert_eq!(body["summary"]["brandMentionCount"], 1);
    assert_eq!(body["competitors"][0]["domain"], "rival.com");
    assert_eq!(body["domains"][0]["domain"], "rival.com");

    let id = body["id"].as_str().unwrap().to_string();
    let (status, stored) = send(
        &app,
        Request::get(format!("/analyses/{id}")).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["id"], id);
    assert_eq!(stored["summary"], body["summary"]);
}

#[tokio::test]
async fn unknown_analysis_is_not_found() {
    let app = app();
    let (status, _) = send(
        &app,
        Request::get("/analyses/not-a-uuid").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        Request::get(format!("/analyses/{}", uuid::Uuid::new_v4()))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_check() {
    let response = app()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
