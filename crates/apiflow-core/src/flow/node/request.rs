//! HTTP request node.

use apiflow_types::assertion::AssertResult;
use apiflow_types::error::{CodedError, ErrorCode};
use apiflow_types::event::NodeStatus;
use apiflow_types::flow::FlowNode;
use apiflow_types::id::{ResponseHeaderId, ResponseId};
use apiflow_types::response::{CapturedResponse, ExampleResponse, ResponseHeader};
use chrono::Utc;
use serde_json::{Value, json};

use super::FlowNodeResult;
use crate::flow::context::FlowNodeRequest;
use crate::flow::ports::RequestTarget;
use crate::request::{Substitutions, build_request};

/// Resolve, dispatch, assert, store. The response is published to later
/// nodes under the node's name as `{request, response}`.
pub(super) async fn run(req: &FlowNodeRequest, node: &FlowNode, target: RequestTarget) -> FlowNodeResult {
    let prepared = match req.services.resolver.resolve(&target).await {
        Ok(p) => p,
        Err(e) => return FlowNodeResult::failed(e),
    };

    let subs = Substitutions::new().with_layer(req.vars.snapshot());
    let request = match build_request(&prepared.example, &subs) {
        Ok(r) => r,
        Err(e) => return FlowNodeResult::failed(e),
    };

    req.emit(node, NodeStatus::NodeRunning, None, None).await;
    tracing::debug!(run_id = %req.run_id, method = request.method.as_str(), url = request.url.as_str(), "dispatching request");

    let response = tokio::select! {
        biased;
        _ = req.cancel.cancelled() => {
            return FlowNodeResult::failed(CodedError::canceled().with_request(&request.method, &request.url));
        }
        r = req.services.http.execute(&request, req.request_timeout) => match r {
            Ok(resp) => resp,
            Err(e) => return FlowNodeResult::failed(e),
        },
    };

    let response_id = ResponseId::new();
    let response_value = response.to_value();
    let request_value = json!({
        "method": request.method,
        "url": request.url,
        "headers": request.headers.iter().map(|(k, v)| json!({ "key": k, "value": v })).collect::<Vec<_>>(),
    });

    let mut root = req.vars.expression_context();
    if let Value::Object(map) = &mut root {
        map.insert("request".into(), request_value.clone());
        map.insert("response".into(), response_value.clone());
    }
    let assert_results: Vec<AssertResult> = prepared
        .asserts
        .iter()
        .map(|(assert_id, condition)| match req.services.assertions.evaluate(condition, &root) {
            Ok(result) => AssertResult {
                response_id,
                assert_id: *assert_id,
                result,
                error: None,
            },
            Err(e) => AssertResult {
                response_id,
                assert_id: *assert_id,
                result: false,
                error: Some(e.to_string()),
            },
        })
        .collect();

    let size = response.body.len() as u64;
    let captured = CapturedResponse {
        response: ExampleResponse {
            id: response_id,
            example_id: prepared.example_id,
            status: response.status,
            body: response.body,
            duration_ms: response.duration_ms,
            size,
            created_at: Utc::now(),
        },
        headers: response
            .headers
            .into_iter()
            .map(|(key, value)| ResponseHeader {
                id: ResponseHeaderId::new(),
                response_id,
                key,
                value,
            })
            .collect(),
        assert_results,
    };
    if let Err(e) = req.services.recorder.record_response(&captured).await {
        return FlowNodeResult::failed(
            CodedError::new(ErrorCode::Unexpected, "failed to store response")
                .with_cause(e)
                .with_request(&request.method, &request.url),
        );
    }

    req.vars.set(
        node.name.clone(),
        json!({ "request": request_value, "response": response_value }),
    );

    let passed = captured.assert_results.iter().filter(|r| r.result).count();
    FlowNodeResult {
        next: req.graph.next(&node.id),
        err: None,
        output: Some(json!({
            "status": captured.response.status,
            "duration_ms": captured.response.duration_ms,
            "asserts": { "passed": passed, "total": captured.assert_results.len() },
        })),
        response_id: Some(response_id),
    }
}
