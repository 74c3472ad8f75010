//! Integration tests for the REST API over a temporary database.

mod common;

use axum::http::{Method, StatusCode};
use common::{body_json, build_test_app};
use serde_json::json;

#[tokio::test]
async fn health_check_is_public() {
    let app = build_test_app().await;
    let response = app.send(Method::GET, "/health", None, None).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn missing_or_forged_token_is_rejected() {
    let app = build_test_app().await;

    let response = app.send(Method::GET, "/api/v1/workspaces", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["errors"][0]["code"], "UNAUTHORIZED");

    let token = app.user("ada@example.com").await;
    let forged = format!("{}x", token);
    let response = app.send(Method::GET, "/api/v1/workspaces", Some(&forged), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn created_workspace_is_listed_for_its_owner() {
    let app = build_test_app().await;
    let token = app.user("ada@example.com").await;

    let ws = app
        .expect(Method::POST, "/api/v1/workspaces", &token, Some(json!({ "name": "payments" })), StatusCode::OK)
        .await;
    assert_eq!(ws["name"], "payments");

    let listed = app.expect(Method::GET, "/api/v1/workspaces", &token, None, StatusCode::OK).await;
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], ws["id"]);
}

#[tokio::test]
async fn non_member_cannot_touch_workspace() {
    let app = build_test_app().await;
    let owner = app.user("owner@example.com").await;
    let outsider = app.user("outsider@example.com").await;

    let ws = app
        .expect(Method::POST, "/api/v1/workspaces", &owner, Some(json!({ "name": "private" })), StatusCode::OK)
        .await;
    let ws_id = ws["id"].as_str().unwrap();

    let response = app
        .send(Method::GET, &format!("/api/v1/workspaces/{ws_id}/collections"), Some(&outsider), None)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .send(
            Method::POST,
            &format!("/api/v1/workspaces/{ws_id}/collections"),
            Some(&outsider),
            Some(json!({ "name": "sneaky" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let collections = app
        .expect(Method::GET, &format!("/api/v1/workspaces/{ws_id}/collections"), &owner, None, StatusCode::OK)
        .await;
    assert!(collections.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_workspace_is_not_found() {
    let app = build_test_app().await;
    let token = app.user("ada@example.com").await;
    let missing = uuid::Uuid::now_v7();

    let response = app
        .send(Method::GET, &format!("/api/v1/workspaces/{missing}/flows"), Some(&token), None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn curl_export_applies_active_environment() {
    let app = build_test_app().await;
    let token = app.user("ada@example.com").await;

    let ws = app
        .expect(Method::POST, "/api/v1/workspaces", &token, Some(json!({ "name": "shop" })), StatusCode::OK)
        .await;
    let ws_id = ws["id"].as_str().unwrap();

    let env = app
        .expect(
            Method::POST,
            &format!("/api/v1/workspaces/{ws_id}/environments"),
            &token,
            Some(json!({ "name": "staging" })),
            StatusCode::OK,
        )
        .await;
    let env_id = env["id"].as_str().unwrap();
    app.expect(
        Method::POST,
        &format!("/api/v1/environments/{env_id}/variables"),
        &token,
        Some(json!({ "key": "base", "value": "https://staging.shop.test" })),
        StatusCode::OK,
    )
    .await;
    app.expect(Method::POST, &format!("/api/v1/environments/{env_id}/activate"), &token, None, StatusCode::OK)
        .await;

    let collection = app
        .expect(
            Method::POST,
            &format!("/api/v1/workspaces/{ws_id}/collections"),
            &token,
            Some(json!({ "name": "orders" })),
            StatusCode::OK,
        )
        .await;
    let endpoint = app
        .expect(
            Method::POST,
            &format!("/api/v1/collections/{}/endpoints", collection["id"].as_str().unwrap()),
            &token,
            Some(json!({ "name": "list orders", "method": "get", "url": "{{ base }}/orders" })),
            StatusCode::OK,
        )
        .await;
    assert_eq!(endpoint["method"], "GET");

    let example = app
        .expect(
            Method::POST,
            &format!("/api/v1/endpoints/{}/examples", endpoint["id"].as_str().unwrap()),
            &token,
            Some(json!({ "name": "default" })),
            StatusCode::OK,
        )
        .await;
    let example_id = example["id"].as_str().unwrap();
    app.expect(
        Method::POST,
        &format!("/api/v1/examples/{example_id}/fields/header"),
        &token,
        Some(json!({ "key": "X-Trace", "value": "t-1" })),
        StatusCode::OK,
    )
    .await;

    let view = app
        .expect(Method::GET, &format!("/api/v1/examples/{example_id}/curl"), &token, None, StatusCode::OK)
        .await;
    let curl = view["curl"].as_str().unwrap();
    assert!(curl.starts_with("curl -X 'GET' 'https://staging.shop.test/orders'"), "{curl}");
    assert!(curl.contains("-H 'X-Trace: t-1'"), "{curl}");
}

#[tokio::test]
async fn export_then_import_with_remap_creates_a_copy() {
    let app = build_test_app().await;
    let token = app.user("ada@example.com").await;

    let ws = app
        .expect(Method::POST, "/api/v1/workspaces", &token, Some(json!({ "name": "ops" })), StatusCode::OK)
        .await;
    let ws_id = ws["id"].as_str().unwrap();
    app.expect(
        Method::POST,
        &format!("/api/v1/workspaces/{ws_id}/flows"),
        &token,
        Some(json!({ "name": "smoke" })),
        StatusCode::OK,
    )
    .await;

    let snapshot = app
        .expect(Method::POST, &format!("/api/v1/workspaces/{ws_id}/export"), &token, None, StatusCode::OK)
        .await;
    assert_eq!(snapshot["flows"].as_array().unwrap().len(), 1);

    let response = app
        .send(Method::POST, "/api/v1/import", Some(&token), Some(snapshot.clone()))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let report = app
        .expect(Method::POST, "/api/v1/import?remap=true", &token, Some(snapshot), StatusCode::OK)
        .await;
    assert_eq!(report["remapped"], true);
    assert_ne!(report["workspace_id"], ws["id"]);

    let listed = app.expect(Method::GET, "/api/v1/workspaces", &token, None, StatusCode::OK).await;
    assert_eq!(listed.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn endpoint_method_must_be_an_http_token() {
    let app = build_test_app().await;
    let token = app.user("ada@example.com").await;
    let ws = app
        .expect(Method::POST, "/api/v1/workspaces", &token, Some(json!({ "name": "shop" })), StatusCode::OK)
        .await;
    let collection = app
        .expect(
            Method::POST,
            &format!("/api/v1/workspaces/{}/collections", ws["id"].as_str().unwrap()),
            &token,
            Some(json!({ "name": "orders" })),
            StatusCode::OK,
        )
        .await;

    let response = app
        .send(
            Method::POST,
            &format!("/api/v1/collections/{}/endpoints", collection["id"].as_str().unwrap()),
            Some(&token),
            Some(json!({ "name": "wipe", "method": "GET;rm -rf ~", "url": "http://x.test" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["errors"][0]["code"], "VALIDATION_ERROR");
}
