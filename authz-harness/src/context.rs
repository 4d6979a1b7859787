use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::app::{Application, HttpClient, Model};
use crate::config::HarnessConfig;
use crate::error::{FixtureError, Result};
use crate::request::{Exchange, PendingRequest};

pub const DEFAULT_USER_MODEL: &str = "user";
pub const ACCESS_TOKEN_MODEL: &str = "AccessToken";
pub const ROLE_MODEL: &str = "Role";
pub const ROLE_MAPPING_MODEL: &str = "RoleMapping";
pub const PRINCIPAL_TYPE_USER: &str = "USER";
pub const ANONYMOUS_TOKEN_ID: &str = "$anonymous";

/// A record created through one of the application's models.
#[derive(Clone)]
pub struct ModelInstance {
    model: Arc<dyn Model>,
    data: Value,
}

impl ModelInstance {
    pub fn new(model: Arc<dyn Model>, data: Value) -> Self {
        Self { model, data }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    pub fn id(&self) -> Option<&Value> {
        self.data.get("id").filter(|id| !id.is_null())
    }

    /// The id rendered as a header-friendly string.
    pub fn id_string(&self) -> Option<String> {
        match self.id()? {
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub async fn destroy(&self) -> anyhow::Result<()> {
        let id = self
            .id()
            .ok_or_else(|| anyhow::anyhow!("{} instance has no id", self.model_name()))?;
        self.model.destroy(id).await
    }
}

impl fmt::Debug for ModelInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelInstance")
            .field("model", &self.model_name())
            .field("data", &self.data)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Static,
    Instance,
}

/// State threaded through every hook, request and check of a scenario.
///
/// A child suite runs on a clone of its parent's context, so nothing a child
/// scope records is visible to its siblings.
#[derive(Clone)]
pub struct Context {
    app: Option<Arc<dyn Application>>,
    client: Option<Arc<dyn HttpClient>>,
    user_model: String,
    /// What binding an application resets `user_model` to.
    default_user_model: String,
    models: HashMap<String, ModelInstance>,
    token: Option<ModelInstance>,
    pub user_role: Option<ModelInstance>,
    pub user_role_mapping: Option<ModelInstance>,
    pub method: Option<(String, MethodKind)>,
    pub args: Vec<Value>,
    pub acl_error_status: Option<u16>,
    pub remotely: bool,
    pub verb: Option<String>,
    pub pending: Option<PendingRequest>,
    pub exchange: Option<Exchange>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        Self {
            app: None,
            client: None,
            user_model: DEFAULT_USER_MODEL.to_string(),
            default_user_model: DEFAULT_USER_MODEL.to_string(),
            models: HashMap::new(),
            token: None,
            user_role: None,
            user_role_mapping: None,
            method: None,
            args: Vec::new(),
            acl_error_status: None,
            remotely: false,
            verb: None,
            pending: None,
            exchange: None,
        }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        let mut cx = Self::new();
        cx.user_model = config.user_model.clone();
        cx.default_user_model = config.user_model.clone();
        cx.acl_error_status = config.acl_error_status;
        cx
    }

    /// Binds the application and its HTTP client and restores the configured
    /// identity model.
    pub fn bind_app(&mut self, app: Arc<dyn Application>) {
        self.client = Some(app.client());
        self.app = Some(app);
        self.user_model = self.default_user_model.clone();
    }

    pub fn app(&self) -> Result<Arc<dyn Application>> {
        self.app.clone().ok_or(FixtureError::AppNotSpecified)
    }

    pub fn client(&self) -> Option<Arc<dyn HttpClient>> {
        self.client.clone()
    }

    pub fn user_model(&self) -> &str {
        &self.user_model
    }

    pub fn set_user_model(&mut self, name: impl Into<String>) {
        self.user_model = name.into();
    }

    pub fn model(&self, name: &str) -> Option<&ModelInstance> {
        self.models.get(name)
    }

    /// The instance created for the current identity model.
    pub fn user(&self) -> Option<&ModelInstance> {
        self.models.get(&self.user_model)
    }

    pub fn insert_model(&mut self, name: impl Into<String>, instance: ModelInstance) {
        self.models.insert(name.into(), instance);
    }

    pub fn remove_model(&mut self, name: &str) -> Option<ModelInstance> {
        self.models.remove(name)
    }

    pub fn token(&self) -> Option<&ModelInstance> {
        self.token.as_ref()
    }

    pub fn set_token(&mut self, token: Option<ModelInstance>) {
        self.token = token;
    }

    pub fn take_token(&mut self) -> Option<ModelInstance> {
        self.token.take()
    }

    pub fn exchange(&self) -> Result<&Exchange> {
        self.exchange.as_ref().ok_or(FixtureError::NoExchange)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("app_bound", &self.app.is_some())
            .field("user_model", &self.user_model)
            .field("models", &self.models)
            .field("token", &self.token)
            .field("user_role", &self.user_role)
            .field("user_role_mapping", &self.user_role_mapping)
            .field("method", &self.method)
            .field("args", &self.args)
            .field("verb", &self.verb)
            .field("exchange", &self.exchange)
            .finish()
    }
}
