//! In-memory collaborators for unit tests.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use crate::app::{DataSource, Model};
use crate::context::ModelInstance;

fn display_id(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub struct RecordingModel {
    name: String,
    pub records: Mutex<Vec<Value>>,
    pub call_log: Mutex<Vec<String>>,
    pub fail_on: Mutex<Option<&'static str>>,
    pub attached: bool,
    pub creatable: bool,
    tokens: Option<Arc<RecordingModel>>,
    next_id: Mutex<i64>,
}

impl RecordingModel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            records: Mutex::new(Vec::new()),
            call_log: Mutex::new(Vec::new()),
            fail_on: Mutex::new(None),
            attached: true,
            creatable: true,
            tokens: None,
            next_id: Mutex::new(1),
        }
    }

    /// An identity model whose logins create records in `tokens`.
    pub fn identity(name: &str, tokens: Arc<RecordingModel>) -> Self {
        Self {
            tokens: Some(tokens),
            ..Self::new(name)
        }
    }

    pub fn detached(name: &str) -> Self {
        Self {
            attached: false,
            ..Self::new(name)
        }
    }

    pub fn without_create(name: &str) -> Self {
        Self {
            creatable: false,
            ..Self::new(name)
        }
    }

    pub fn refuse(&self, operation: &'static str) {
        *self.fail_on.lock().unwrap() = Some(operation);
    }

    pub fn calls(&self) -> Vec<String> {
        self.call_log.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    fn log_call(&self, call: String) -> anyhow::Result<()> {
        let operation = call.split(':').next().unwrap_or_default().to_string();
        self.call_log.lock().unwrap().push(call);
        if *self.fail_on.lock().unwrap() == Some(operation.as_str()) {
            return Err(anyhow::anyhow!("{} refused", operation)
                .context(format!("{} {} failed", self.name, operation)));
        }
        Ok(())
    }

    fn insert(&self, attrs: &Value) -> Value {
        let mut record = attrs.clone();
        if record.get("id").map_or(true, Value::is_null) {
            let mut next = self.next_id.lock().unwrap();
            record["id"] = json!(*next);
            *next += 1;
        }
        self.records.lock().unwrap().push(record.clone());
        record
    }
}

#[async_trait]
impl Model for RecordingModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_data_source(&self) -> bool {
        self.attached
    }

    fn can_create(&self) -> bool {
        self.creatable
    }

    async fn create(&self, attrs: &Value) -> anyhow::Result<Value> {
        self.log_call(format!("create:{}", attrs))?;
        Ok(self.insert(attrs))
    }

    async fn find_or_create(&self, filter: &Value, attrs: &Value) -> anyhow::Result<Value> {
        self.log_call(format!("find_or_create:{}", filter))?;
        let found = self.records.lock().unwrap().iter().find(|record| {
            filter
                .as_object()
                .map_or(false, |f| f.iter().all(|(k, v)| record.get(k) == Some(v)))
        }).cloned();
        Ok(found.unwrap_or_else(|| self.insert(attrs)))
    }

    async fn destroy(&self, id: &Value) -> anyhow::Result<()> {
        self.log_call(format!("destroy:{}", display_id(id)))?;
        self.records
            .lock()
            .unwrap()
            .retain(|record| record.get("id") != Some(id));
        Ok(())
    }

    async fn login(&self, credentials: &Value) -> anyhow::Result<ModelInstance> {
        self.log_call(format!("login:{}", credentials["email"]))?;
        let tokens = self
            .tokens
            .clone()
            .ok_or_else(|| anyhow::anyhow!("model {} does not support login", self.name))?;
        let user = self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|record| record.get("email") == credentials.get("email"))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("login failed"))?;
        let token = tokens.insert(&json!({
            "id": format!("token-{}", display_id(&user["id"])),
            "userId": user["id"],
        }));
        Ok(ModelInstance::new(tokens, token))
    }
}

#[derive(Default)]
pub struct RecordingDataSource {
    pub call_log: Mutex<Vec<String>>,
}

impl RecordingDataSource {
    pub fn calls(&self) -> Vec<String> {
        self.call_log.lock().unwrap().clone()
    }
}

#[async_trait]
impl DataSource for RecordingDataSource {
    async fn automigrate(&self) -> anyhow::Result<()> {
        self.call_log.lock().unwrap().push("automigrate".to_string());
        Ok(())
    }

    fn reset_ids(&self) {
        self.call_log.lock().unwrap().push("reset_ids".to_string());
    }
}
