use async_trait::async_trait;
use axum::body::{Body, Bytes};
use http::{header::CONTENT_TYPE, HeaderMap, StatusCode};
use std::collections::HashMap;
use tower::ServiceExt;

use crate::request::{PendingRequest, RecordedResponse};

/// The HTTP capability bound to an application handle.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn call(&self, request: &PendingRequest) -> anyhow::Result<RecordedResponse>;
}

/// Dispatches requests straight into an in-process axum router.
#[derive(Clone)]
pub struct RouterClient {
    router: axum::Router,
}

impl RouterClient {
    pub fn new(router: axum::Router) -> Self {
        Self { router }
    }
}

#[async_trait]
impl HttpClient for RouterClient {
    async fn call(&self, request: &PendingRequest) -> anyhow::Result<RecordedResponse> {
        let mut builder = http::Request::builder()
            .method(request.http_method()?)
            .uri(request.target.as_str());

        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }

        let body = match &request.body {
            Some(payload) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(payload)?)
            }
            None => Body::empty(),
        };

        let response = self.router.clone().oneshot(builder.body(body)?).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;

        Ok(RecordedResponse {
            status,
            headers,
            body,
        })
    }
}

/// Dispatches requests to a running server over the network.
pub struct RemoteClient {
    base_url: String,
    client: reqwest::Client,
}

impl RemoteClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Self {
        let base_url = std::env::var("AUTHZ_BASE_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:3000".to_string());
        Self::new(base_url)
    }

    fn url_for(&self, target: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), target)
    }
}

#[async_trait]
impl HttpClient for RemoteClient {
    async fn call(&self, request: &PendingRequest) -> anyhow::Result<RecordedResponse> {
        let url = self.url_for(&request.target);

        let mut req = self
            .client
            .request(request.http_method()?, &url)
            .headers(request.headers.clone());

        if let Some(payload) = &request.body {
            req = req.json(payload);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await?;

        Ok(RecordedResponse {
            status,
            headers,
            body,
        })
    }
}

/// Answers from a fixed route table and records every call.
///
/// Unknown routes answer 404.
#[derive(Default)]
pub struct MockHttpClient {
    pub routes: std::sync::Mutex<HashMap<(String, String), u16>>,
    pub call_log: std::sync::Mutex<Vec<PendingRequest>>,
}

impl MockHttpClient {
    /// Registers the status returned for `method` (transport name) and `target`.
    pub fn respond(&self, method: &str, target: &str, status: u16) {
        self.routes
            .lock()
            .unwrap()
            .insert((method.to_string(), target.to_string()), status);
    }

    pub fn calls(&self) -> Vec<PendingRequest> {
        self.call_log.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn call(&self, request: &PendingRequest) -> anyhow::Result<RecordedResponse> {
        self.call_log.lock().unwrap().push(request.clone());

        let code = self
            .routes
            .lock()
            .unwrap()
            .get(&(request.method.clone(), request.target.clone()))
            .copied()
            .unwrap_or(404);
        let status = StatusCode::from_u16(code)?;

        Ok(RecordedResponse {
            status,
            headers: HeaderMap::new(),
            body: Bytes::from_static(b"{}"),
        })
    }
}
