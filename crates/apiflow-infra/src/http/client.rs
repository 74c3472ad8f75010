//! reqwest-backed [`HttpExecutor`].
//!
//! Transport failures are classified into the shared error taxonomy and
//! annotated with the method and URL of the request that failed.

use std::time::{Duration, Instant};

use apiflow_core::flow::{BoxFuture, HttpExecutor};
use apiflow_core::request::{TransportPhase, classify_request_error, normalize_method, validate_url};
use apiflow_types::error::{CodedError, ErrorCode};
use apiflow_types::http::{HttpRequest, HttpResponse, RequestBody};
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Method;

const USER_AGENT: &str = concat!("apiflow/", env!("CARGO_PKG_VERSION"));

/// Phase reported by reqwest itself; the timeout check comes first since a
/// connect timeout is also a connect error.
fn phase_of(err: &reqwest::Error) -> TransportPhase {
    if err.is_timeout() {
        TransportPhase::Timeout
    } else if err.is_builder() {
        TransportPhase::Builder
    } else if err.is_connect() {
        TransportPhase::Connect
    } else if err.is_redirect() {
        TransportPhase::Redirect
    } else if err.is_body() || err.is_decode() {
        TransportPhase::Body
    } else if err.is_request() {
        TransportPhase::Request
    } else {
        TransportPhase::Unknown
    }
}

/// Sends requests with a shared connection pool. The timeout is applied
/// per request, so one client serves every node.
#[derive(Clone)]
pub struct ReqwestExecutor {
    client: reqwest::Client,
}

impl ReqwestExecutor {
    pub fn new() -> Result<Self, CodedError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CodedError::new(ErrorCode::Unexpected, "failed to build HTTP client").with_cause(e))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn prepare(&self, request: &HttpRequest, timeout: Duration) -> Result<reqwest::RequestBuilder, CodedError> {
        validate_url(&request.url).map_err(|e| e.with_request(&request.method, &request.url))?;

        let method = normalize_method(&request.method).map_err(|e| e.with_request(&request.method, &request.url))?;
        let method = match method.as_str() {
            "" => Method::GET,
            m => Method::from_bytes(m.as_bytes()).map_err(|e| {
                CodedError::new(ErrorCode::InvalidMethod, format!("invalid HTTP method '{m}'"))
                    .with_cause(e)
                    .with_request(&request.method, &request.url)
            })?,
        };

        let mut builder = self.client.request(method, &request.url).timeout(timeout);
        for (key, value) in &request.headers {
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                CodedError::new(ErrorCode::Unexpected, format!("invalid header name '{key}'"))
                    .with_cause(e)
                    .with_request(&request.method, &request.url)
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                CodedError::new(ErrorCode::Unexpected, format!("invalid value for header '{key}'"))
                    .with_cause(e)
                    .with_request(&request.method, &request.url)
            })?;
            builder = builder.header(name, value);
        }

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Raw { data } => builder.body(data.clone()),
            RequestBody::UrlEncoded { fields } => builder.form(fields),
            RequestBody::Multipart { fields } => {
                let form = fields
                    .iter()
                    .fold(reqwest::multipart::Form::new(), |form, (k, v)| form.text(k.clone(), v.clone()));
                builder.multipart(form)
            }
        };
        Ok(builder)
    }

    async fn send(&self, request: &HttpRequest, timeout: Duration) -> Result<HttpResponse, CodedError> {
        let builder = self.prepare(request, timeout)?;
        let started = Instant::now();
        let classify = |e: reqwest::Error| classify_request_error(phase_of(&e), &e, &request.method, &request.url);

        let response = builder.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();
        let body = response.bytes().await.map_err(classify)?.to_vec();
        let duration_ms = started.elapsed().as_millis() as u64;

        tracing::debug!(
            method = %request.method,
            url = %request.url,
            status,
            duration_ms,
            bytes = body.len(),
            "http request completed"
        );
        Ok(HttpResponse {
            status,
            headers,
            body,
            duration_ms,
        })
    }
}

impl HttpExecutor for ReqwestExecutor {
    fn execute<'a>(
        &'a self,
        request: &'a HttpRequest,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<HttpResponse, CodedError>> {
        Box::pin(self.send(request, timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::body::Bytes;
    use axum::http::HeaderMap;
    use axum::routing::{get, post};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn request(method: &str, url: String, body: RequestBody) -> HttpRequest {
        HttpRequest {
            method: method.into(),
            url,
            headers: vec![("X-Trace".into(), "abc".into())],
            body,
        }
    }

    #[tokio::test]
    async fn captures_status_headers_and_body() {
        let router = Router::new().route(
            "/echo",
            post(|headers: HeaderMap, body: Bytes| async move {
                let trace = headers
                    .get("x-trace")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                (
                    axum::http::StatusCode::CREATED,
                    [("x-echo-trace", trace)],
                    body,
                )
            }),
        );
        let base = serve(router).await;
        let exec = ReqwestExecutor::new().unwrap();

        let resp = exec
            .execute(
                &request("POST", format!("{base}/echo"), RequestBody::Raw { data: b"{\"a\":1}".to_vec() }),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert_eq!(resp.status, 201);
        assert_eq!(resp.body, b"{\"a\":1}");
        assert!(resp.headers.iter().any(|(k, v)| k == "x-echo-trace" && v == "abc"));
    }

    #[tokio::test]
    async fn url_encoded_bodies_are_form_encoded() {
        let router = Router::new().route("/form", post(|body: String| async move { body }));
        let base = serve(router).await;
        let exec = ReqwestExecutor::new().unwrap();

        let resp = exec
            .execute(
                &request(
                    "post",
                    format!("{base}/form"),
                    RequestBody::UrlEncoded {
                        fields: vec![("name".into(), "a b".into()), ("n".into(), "1".into())],
                    },
                ),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert_eq!(String::from_utf8(resp.body).unwrap(), "name=a+b&n=1");
    }

    #[tokio::test]
    async fn slow_responses_time_out() {
        let router = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let base = serve(router).await;
        let exec = ReqwestExecutor::new().unwrap();

        let err = exec
            .execute(&request("GET", format!("{base}/slow"), RequestBody::Empty), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Timeout);
        assert!(err.retryable);
        assert_eq!(err.request.unwrap().method, "GET");
    }

    #[tokio::test]
    async fn closed_port_is_connection_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let exec = ReqwestExecutor::new().unwrap();

        let err = exec
            .execute(&request("GET", format!("http://{addr}/"), RequestBody::Empty), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ConnectionRefused);
    }

    #[tokio::test]
    async fn unsupported_scheme_is_rejected_before_sending() {
        let exec = ReqwestExecutor::new().unwrap();
        let err = exec
            .execute(
                &request("GET", "ftp://files.test/a".into(), RequestBody::Empty),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::UnsupportedScheme);
        assert_eq!(err.detail.as_deref(), Some("ftp"));
    }
}
