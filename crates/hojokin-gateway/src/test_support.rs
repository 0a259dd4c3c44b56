//! Shared fixture for router and WebSocket dispatch tests.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use hojokin_agent::{ChatRequest, ChatResponse, LlmProvider, ProviderError};
use hojokin_collab::{CollabHub, MemoryQueue, NoopMirror};
use hojokin_core::config::HojokinConfig;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use crate::app::{build_router, AppState};

struct FixedReply(&'static str);

#[async_trait]
impl LlmProvider for FixedReply {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        if self.0.is_empty() {
            return Err(ProviderError::Unavailable("down".into()));
        }
        Ok(ChatResponse {
            content: self.0.to_string(),
            model: req.model.clone(),
            tokens_in: 10,
            tokens_out: 20,
            stop_reason: "STOP".into(),
        })
    }
}

pub(crate) struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    _dir: TempDir,
}

pub(crate) fn test_app(reply: &'static str) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut config = HojokinConfig::default();
    config.database.path = dir.path().join("hojokin.db").to_string_lossy().into_owned();
    config.gateway.auth.token_secret = "test-secret".into();
    crate::init_database(&config.database.path).unwrap();

    let hub = Arc::new(CollabHub::new(
        60,
        Arc::new(MemoryQueue::new()),
        Arc::new(NoopMirror),
    ));
    let state = Arc::new(crate::build_state(config, Arc::new(FixedReply(reply)), hub).unwrap());
    TestApp {
        router: build_router(Arc::clone(&state)),
        state,
        _dir: dir,
    }
}

impl TestApp {
    pub(crate) async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let (status, bytes) = self.raw(method, uri, token, body).await;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub(crate) async fn raw(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Vec<u8>) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        let req = match body {
            Some(b) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let res = self.router.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    pub(crate) async fn register(&self, email: &str) -> (String, String) {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({
                    "email": email,
                    "password": "correct horse battery",
                    "company_name": "株式会社テスト",
                    "industry": "製造業",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        (
            body["token"].as_str().unwrap().to_string(),
            body["user"]["id"].as_str().unwrap().to_string(),
        )
    }

    pub(crate) async fn create_application(&self, token: &str) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/applications",
                Some(token),
                Some(json!({
                    "program_id": "jizokuka",
                    "title": "ECサイト開設",
                    "business_overview": "地域の特産品を扱う小売店",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["status"], "DRAFT");
        body["id"].as_str().unwrap().to_string()
    }
}

