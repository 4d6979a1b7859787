pub mod client;

pub use client::{HttpClient, MockHttpClient, RemoteClient, RouterClient};

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::context::ModelInstance;

/// A model exposed by the application under test.
///
/// Records travel as JSON documents; `create` and `find_or_create` return the
/// stored document including its `id`.
#[async_trait]
pub trait Model: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the model is attached to a datasource.
    fn has_data_source(&self) -> bool {
        true
    }

    /// Whether the model can create records.
    fn can_create(&self) -> bool {
        true
    }

    async fn create(&self, attrs: &Value) -> anyhow::Result<Value>;

    async fn find_or_create(&self, filter: &Value, attrs: &Value) -> anyhow::Result<Value>;

    async fn destroy(&self, id: &Value) -> anyhow::Result<()>;

    /// Exchanges credentials for an access token owned by the token model.
    async fn login(&self, _credentials: &Value) -> anyhow::Result<ModelInstance> {
        anyhow::bail!("model {} does not support login", self.name())
    }
}

#[async_trait]
pub trait DataSource: Send + Sync {
    /// Drops and recreates the schema, discarding every record.
    async fn automigrate(&self) -> anyhow::Result<()>;

    /// Clears the connector-level id registry.
    fn reset_ids(&self);
}

/// The application handle every fixture works against.
pub trait Application: Send + Sync {
    fn model(&self, name: &str) -> Option<Arc<dyn Model>>;

    fn datasource(&self, name: &str) -> Option<Arc<dyn DataSource>>;

    fn setting(&self, key: &str) -> Option<Value>;

    fn client(&self) -> Arc<dyn HttpClient>;
}

/// A plain [`Application`] assembled from its parts.
#[derive(Clone)]
pub struct AppHandle {
    models: HashMap<String, Arc<dyn Model>>,
    datasources: HashMap<String, Arc<dyn DataSource>>,
    settings: HashMap<String, Value>,
    client: Arc<dyn HttpClient>,
}

impl AppHandle {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self {
            models: HashMap::new(),
            datasources: HashMap::new(),
            settings: HashMap::new(),
            client,
        }
    }

    pub fn with_model(mut self, model: Arc<dyn Model>) -> Self {
        self.models.insert(model.name().to_string(), model);
        self
    }

    pub fn with_datasource(mut self, name: &str, datasource: Arc<dyn DataSource>) -> Self {
        self.datasources.insert(name.to_string(), datasource);
        self
    }

    pub fn with_setting(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.settings.insert(key.to_string(), value.into());
        self
    }

    pub fn into_shared(self) -> Arc<dyn Application> {
        Arc::new(self)
    }
}

impl Application for AppHandle {
    fn model(&self, name: &str) -> Option<Arc<dyn Model>> {
        if let Some(model) = self.models.get(name) {
            return Some(model.clone());
        }
        self.models
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, model)| model.clone())
    }

    fn datasource(&self, name: &str) -> Option<Arc<dyn DataSource>> {
        self.datasources.get(name).cloned()
    }

    fn setting(&self, key: &str) -> Option<Value> {
        self.settings.get(key).cloned()
    }

    fn client(&self) -> Arc<dyn HttpClient> {
        self.client.clone()
    }
}
