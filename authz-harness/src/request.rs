//! Request execution: resolves a target and payload against the live
//! [`Context`], issues exactly one HTTP call and records the exchange.

use async_trait::async_trait;
use axum::body::Bytes;
use http::{
    header::{AsHeaderName, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION},
    HeaderMap, Method, StatusCode,
};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::context::Context;
use crate::error::{resource_failure, FixtureError, Result};
use crate::hooks::{Action, Fixture, Scope};

/// Computes a value from the context at dispatch time.
pub type Resolver<T> = Arc<dyn Fn(&Context) -> T + Send + Sync>;

/// Where a request is sent.
#[derive(Clone)]
pub enum Target {
    Literal(String),
    Computed(Resolver<String>),
    /// A display label, optionally backed by a resolver. Without a resolver the
    /// label itself is the target.
    Placeholder {
        label: String,
        resolver: Option<Resolver<String>>,
    },
}

impl Target {
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&Context) -> String + Send + Sync + 'static,
    {
        Target::Computed(Arc::new(f))
    }

    pub fn placeholder(label: impl Into<String>) -> Self {
        Target::Placeholder {
            label: label.into(),
            resolver: None,
        }
    }

    pub fn placeholder_with<F>(label: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Context) -> String + Send + Sync + 'static,
    {
        Target::Placeholder {
            label: label.into(),
            resolver: Some(Arc::new(f)),
        }
    }

    /// The name shown in scenario titles.
    pub fn label(&self) -> String {
        match self {
            Target::Literal(url) => url.clone(),
            Target::Computed(_) => "/<dynamic>".to_string(),
            Target::Placeholder { label, .. } => label.clone(),
        }
    }

    pub fn resolve(&self, cx: &Context) -> String {
        match self {
            Target::Literal(url) => url.clone(),
            Target::Computed(f) => f(cx),
            Target::Placeholder {
                resolver: Some(f), ..
            } => f(cx),
            Target::Placeholder {
                label,
                resolver: None,
            } => label.clone(),
        }
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Literal(url) => f.debug_tuple("Literal").field(url).finish(),
            Target::Computed(_) => f.write_str("Computed(..)"),
            Target::Placeholder { label, resolver } => f
                .debug_struct("Placeholder")
                .field("label", label)
                .field("resolver", &resolver.is_some())
                .finish(),
        }
    }
}

impl From<&str> for Target {
    fn from(url: &str) -> Self {
        Target::Literal(url.to_string())
    }
}

impl From<String> for Target {
    fn from(url: String) -> Self {
        Target::Literal(url)
    }
}

/// The body of a request.
#[derive(Clone)]
pub enum Payload {
    Literal(Value),
    Computed(Resolver<Value>),
}

impl Payload {
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&Context) -> Value + Send + Sync + 'static,
    {
        Payload::Computed(Arc::new(f))
    }

    pub fn resolve(&self, cx: &Context) -> Value {
        match self {
            Payload::Literal(value) => value.clone(),
            Payload::Computed(f) => f(cx),
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Payload::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Literal(value)
    }
}

/// Maps a verb to the transport's method name. `delete` is spelled `del`.
pub fn method_for_verb(verb: &str) -> String {
    let method = verb.to_lowercase();
    if method == "delete" {
        "del".to_string()
    } else {
        method
    }
}

/// An outgoing call as built by the engine.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    /// Transport method name, see [`method_for_verb`].
    pub method: String,
    pub target: String,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl PendingRequest {
    pub fn new(method: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            target: target.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn set<K>(&mut self, name: K, value: &str) -> Result<()>
    where
        HeaderName: TryFrom<K>,
    {
        let name = HeaderName::try_from(name)
            .map_err(|_| FixtureError::InvalidRequest("invalid header name".to_string()))?;
        let value = HeaderValue::from_str(value).map_err(|_| {
            FixtureError::InvalidRequest(format!("invalid value for header {}", name))
        })?;
        self.headers.insert(name, value);
        Ok(())
    }

    pub fn send(&mut self, payload: Value) {
        self.body = Some(payload);
    }

    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn http_method(&self) -> Result<Method> {
        if self.method == "del" {
            return Ok(Method::DELETE);
        }
        Method::from_bytes(self.method.to_uppercase().as_bytes())
            .map_err(|_| FixtureError::InvalidRequest(format!("unknown verb {}", self.method)))
    }
}

#[derive(Debug, Clone)]
pub struct RecordedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RecordedResponse {
    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    pub fn json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// The request and response of the most recent call.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub request: PendingRequest,
    pub response: RecordedResponse,
}

/// Issues one call for `verb` against `target` and records the exchange on `cx`.
pub async fn make_request(
    cx: &mut Context,
    target: &Target,
    verb: &str,
    payload: Option<&Payload>,
) -> Result<()> {
    let url = target.resolve(cx);
    cx.remotely = true;
    cx.verb = Some(verb.to_uppercase());
    cx.exchange = None;

    let client = cx.client().ok_or(FixtureError::AppNotSpecified)?;

    let mut request = PendingRequest::new(method_for_verb(verb), url);
    request.set(ACCEPT, "application/json")?;
    if let Some(token) = cx.token() {
        let id = token
            .id_string()
            .ok_or_else(|| FixtureError::MissingResource("access token id".to_string()))?;
        request.set(AUTHORIZATION, &id)?;
    }
    if let Some(payload) = payload {
        request.send(payload.resolve(cx));
    }

    debug!(method = %request.method, target = %request.target, "dispatching request");
    cx.pending = Some(request.clone());

    let result = client.call(&request).await;
    cx.pending = None;
    let response = result
        .map_err(|e| resource_failure(format!("{} {}", verb.to_uppercase(), request.target), e))?;

    debug!(status = response.status_code(), "request completed");
    cx.exchange = Some(Exchange { request, response });
    Ok(())
}

/// Per-test setup that runs [`make_request`].
#[derive(Debug, Clone)]
pub struct MakeRequest {
    pub verb: String,
    pub target: Target,
    pub payload: Option<Payload>,
}

#[async_trait]
impl Action for MakeRequest {
    async fn run(&self, cx: &mut Context) -> Result<()> {
        make_request(cx, &self.target, &self.verb, self.payload.as_ref()).await
    }
}

pub fn request_fixture(verb: &str, target: Target, payload: Option<Payload>) -> Fixture {
    let label = format!("{} {}", verb.to_uppercase(), target.label());
    Fixture::new(Scope::PerTest).setup(
        label,
        MakeRequest {
            verb: verb.to_string(),
            target,
            payload,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{AppHandle, HttpClient, MockHttpClient};
    use crate::context::ModelInstance;
    use crate::test_support::RecordingModel;
    use serde_json::json;

    fn bound_context() -> (Context, Arc<MockHttpClient>) {
        let client = Arc::new(MockHttpClient::default());
        let app = AppHandle::new(client.clone()).into_shared();
        let mut cx = Context::new();
        cx.bind_app(app);
        (cx, client)
    }

    #[test]
    fn verbs_map_to_transport_methods() {
        assert_eq!(method_for_verb("GET"), "get");
        assert_eq!(method_for_verb("Post"), "post");
        assert_eq!(method_for_verb("DELETE"), "del");
        assert_eq!(method_for_verb("delete"), "del");
        assert_eq!(method_for_verb("patch"), "patch");
    }

    #[test]
    fn targets_resolve_by_variant() {
        let mut cx = Context::new();
        cx.args = vec![json!(7)];

        assert_eq!(Target::from("/a").resolve(&cx), "/a");
        assert_eq!(Target::placeholder("/widgets/:id").resolve(&cx), "/widgets/:id");

        let computed = Target::computed(|cx| format!("/widgets/{}", cx.args[0]));
        assert_eq!(computed.resolve(&cx), "/widgets/7");
        assert_eq!(computed.label(), "/<dynamic>");

        let placeholder = Target::placeholder_with("/widgets/:id", |cx| format!("/w/{}", cx.args[0]));
        assert_eq!(placeholder.resolve(&cx), "/w/7");
        assert_eq!(placeholder.label(), "/widgets/:id");
    }

    #[tokio::test]
    async fn request_without_bound_client_fails_with_configuration_error() {
        let mut cx = Context::new();
        let err = make_request(&mut cx, &Target::from("/protected"), "get", None)
            .await
            .unwrap_err();

        assert!(matches!(err, FixtureError::AppNotSpecified));
        assert!(err.is_configuration());
        assert!(cx.exchange.is_none());
    }

    #[tokio::test]
    async fn request_always_sends_accept_header_and_no_authorization_without_token() {
        let (mut cx, client) = bound_context();
        client.respond("get", "/protected", 401);

        make_request(&mut cx, &Target::from("/protected"), "GET", None)
            .await
            .unwrap();

        let calls = client.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, "get");
        assert_eq!(calls[0].header(ACCEPT), Some("application/json"));
        assert_eq!(calls[0].header(AUTHORIZATION), None);
        assert!(calls[0].body.is_none());

        let exchange = cx.exchange.as_ref().unwrap();
        assert_eq!(exchange.response.status_code(), 401);
        assert_eq!(cx.verb.as_deref(), Some("GET"));
        assert!(cx.remotely);
        assert!(cx.pending.is_none());
    }

    #[tokio::test]
    async fn request_carries_token_id_as_authorization() {
        let (mut cx, client) = bound_context();
        let tokens = Arc::new(RecordingModel::new("AccessToken"));
        cx.set_token(Some(ModelInstance::new(tokens, json!({"id": "abc123"}))));

        make_request(&mut cx, &Target::from("/widgets"), "delete", None)
            .await
            .unwrap();

        let calls = client.calls();
        assert_eq!(calls[0].method, "del");
        assert_eq!(calls[0].header(AUTHORIZATION), Some("abc123"));
    }

    #[tokio::test]
    async fn computed_target_and_payload_see_live_context() {
        let (mut cx, client) = bound_context();
        let target = Target::computed(|cx| format!("/widgets/{}", cx.args[0]));
        let payload = Payload::computed(|cx| json!({ "count": cx.args.len() }));

        cx.args = vec![json!(1)];
        make_request(&mut cx, &target, "put", Some(&payload)).await.unwrap();
        cx.args = vec![json!(2), json!(3)];
        make_request(&mut cx, &target, "put", Some(&payload)).await.unwrap();

        let calls = client.calls();
        assert_eq!(calls[0].target, "/widgets/1");
        assert_eq!(calls[0].body, Some(json!({"count": 1})));
        assert_eq!(calls[1].target, "/widgets/2");
        assert_eq!(calls[1].body, Some(json!({"count": 2})));

        // only the latest exchange is kept
        assert_eq!(cx.exchange.as_ref().unwrap().request.target, "/widgets/2");
    }

    struct RefusingClient;

    #[async_trait]
    impl HttpClient for RefusingClient {
        async fn call(&self, _request: &PendingRequest) -> anyhow::Result<RecordedResponse> {
            anyhow::bail!("connection refused")
        }
    }

    #[tokio::test]
    async fn failed_call_leaves_no_pending_request_or_stale_exchange() {
        let (mut cx, client) = bound_context();
        client.respond("get", "/ok", 200);
        make_request(&mut cx, &Target::from("/ok"), "get", None)
            .await
            .unwrap();
        assert!(cx.exchange.is_some());

        cx.bind_app(AppHandle::new(Arc::new(RefusingClient)).into_shared());
        let err = make_request(&mut cx, &Target::from("/ok"), "get", None)
            .await
            .unwrap_err();

        assert!(matches!(err, FixtureError::Resource { .. }));
        assert!(err.to_string().contains("GET /ok failed"));
        assert!(cx.pending.is_none());
        assert!(cx.exchange.is_none());
    }

    #[test]
    fn request_fixture_is_a_single_per_test_setup() {
        let fixture = request_fixture("get", Target::computed(|_| "/x".into()), None);
        let hooks = fixture.into_hooks();
        assert_eq!(hooks.len(), 1);
        assert_eq!(hooks[0].label, "GET /<dynamic>");
        assert_eq!(hooks[0].scope, Scope::PerTest);
    }
}
