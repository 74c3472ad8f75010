//! Shared helpers for the API integration tests.

#![allow(dead_code)]

use apiflow_api::http::router::build_router;
use apiflow_api::state::AppState;
use apiflow_core::repository::WorkspaceRepository;
use apiflow_infra::config::resolve;
use apiflow_infra::sqlite::DatabasePool;
use apiflow_types::config::FileConfig;
use apiflow_types::id::UserId;
use apiflow_types::workspace::User;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    _dir: TempDir,
}

pub async fn build_test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("apiflow.db");
    let config = resolve(FileConfig::default(), |name| match name {
        "HMAC_SECRET" => Some("integration-secret".to_string()),
        "DB_PATH" => Some(db_path.display().to_string()),
        _ => None,
    })
    .unwrap();
    let pool = DatabasePool::new(&config.database.url()).await.unwrap();
    let state = AppState::from_pool(pool, &config).unwrap();
    let router = build_router(state.clone());
    TestApp {
        state,
        router,
        _dir: dir,
    }
}

impl TestApp {
    /// Create a user and return a bearer token for it.
    pub async fn user(&self, email: &str) -> String {
        let user = User {
            id: UserId::new(),
            email: email.to_string(),
            name: email.to_string(),
            created_at: Utc::now(),
        };
        let user = self
            .state
            .workspace_service
            .repo()
            .create_user(&user)
            .await
            .unwrap();
        self.state.tokens.issue(&user.id, Duration::hours(1))
    }

    pub async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Send and expect `status`, returning the envelope's `data`.
    pub async fn expect(&self, method: Method, uri: &str, token: &str, body: Option<Value>, status: StatusCode) -> Value {
        let response = self.send(method, uri, Some(token), body).await;
        assert_eq!(response.status(), status, "{uri}");
        body_json(response).await["data"].clone()
    }
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
