//! Models stored by [`SqliteDataSource`]. Identity models hash passwords with
//! argon2 so logins behave like a real application's; they are not an
//! authentication layer.

use anyhow::{anyhow, bail, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use super::SqliteDataSource;
use crate::app::Model;
use crate::context::ModelInstance;

/// Two weeks, in seconds.
pub const DEFAULT_TOKEN_TTL: i64 = 1_209_600;

#[derive(Debug, Deserialize)]
struct Credentials {
    email: Option<String>,
    username: Option<String>,
    password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AccessTokenRecord {
    id: String,
    user_id: Value,
    ttl: i64,
    created: String,
}

enum Kind {
    Plain,
    Tokens,
    Identity { tokens: Arc<SqliteModel> },
}

/// A model persisted as JSON documents in a [`SqliteDataSource`].
pub struct SqliteModel {
    name: String,
    db: SqliteDataSource,
    kind: Kind,
}

fn generate_token_id() -> String {
    let random_bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(random_bytes)
}

fn password_hasher() -> Result<Argon2<'static>> {
    // Minimum cost; these hashes only guard throwaway test users.
    let params = Params::new(
        Params::MIN_M_COST,
        Params::MIN_T_COST,
        Params::MIN_P_COST,
        None,
    )
    .map_err(|e| anyhow!("Invalid argon2 params: {}", e))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = password_hasher()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("Failed to hash password: {}", e))?
        .to_string();
    Ok(hash)
}

fn verify_password(password: &str, hash: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

fn without_password(mut record: Value) -> Value {
    if let Some(fields) = record.as_object_mut() {
        fields.remove("password");
    }
    record
}

impl SqliteModel {
    pub fn plain(name: &str, db: SqliteDataSource) -> Self {
        Self {
            name: name.to_string(),
            db,
            kind: Kind::Plain,
        }
    }

    /// Access tokens: ids default to 64 random hex characters.
    pub fn tokens(name: &str, db: SqliteDataSource) -> Self {
        Self {
            name: name.to_string(),
            db,
            kind: Kind::Tokens,
        }
    }

    pub fn identity(name: &str, db: SqliteDataSource, tokens: Arc<SqliteModel>) -> Self {
        Self {
            name: name.to_string(),
            db,
            kind: Kind::Identity { tokens },
        }
    }

    fn prepare(&self, attrs: &Value) -> Result<Value> {
        let mut record = match attrs {
            Value::Object(fields) => Value::Object(fields.clone()),
            Value::Null => json!({}),
            other => bail!("{} attributes must be an object, got {}", self.name, other),
        };

        match &self.kind {
            Kind::Plain => {}
            Kind::Tokens => {
                if record.get("ttl").is_none() {
                    record["ttl"] = json!(DEFAULT_TOKEN_TTL);
                }
                if record.get("created").is_none() {
                    record["created"] = json!(chrono::Utc::now().to_rfc3339());
                }
                if record.get("id").is_none() {
                    record["id"] = json!(generate_token_id());
                }
            }
            Kind::Identity { .. } => {
                if let Some(email) = record.get("email").cloned() {
                    if !self.db.find(&self.name, &json!({ "email": email }))?.is_empty() {
                        bail!("{} with email {} already exists", self.name, email);
                    }
                }
                if let Some(password) = record.get("password").and_then(Value::as_str) {
                    record["password"] = json!(hash_password(password)?);
                }
            }
        }

        if record.get("id").map_or(true, Value::is_null) {
            record["id"] = json!(self.db.next_id(&self.name)?);
        }
        Ok(record)
    }
}

#[async_trait]
impl Model for SqliteModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create(&self, attrs: &Value) -> Result<Value> {
        let record = self.prepare(attrs)?;
        self.db.insert(&self.name, &record)?;
        tracing::debug!(model = %self.name, id = %record["id"], "created record");
        Ok(without_password(record))
    }

    async fn find_or_create(&self, filter: &Value, attrs: &Value) -> Result<Value> {
        match self.db.find(&self.name, filter)?.into_iter().next() {
            Some(existing) => Ok(without_password(existing)),
            None => self.create(attrs).await,
        }
    }

    async fn destroy(&self, id: &Value) -> Result<()> {
        self.db.delete(&self.name, id)?;
        Ok(())
    }

    async fn login(&self, credentials: &Value) -> Result<ModelInstance> {
        let tokens = match &self.kind {
            Kind::Identity { tokens } => tokens.clone(),
            _ => bail!("model {} does not support login", self.name),
        };

        let credentials: Credentials = serde_json::from_value(credentials.clone())
            .map_err(|e| anyhow!("Invalid credentials: {}", e))?;
        let filter = match (&credentials.email, &credentials.username) {
            (Some(email), _) => json!({ "email": email }),
            (None, Some(username)) => json!({ "username": username }),
            (None, None) => bail!("username or email is required"),
        };

        let user = self
            .db
            .find(&self.name, &filter)?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("login failed"))?;
        let hash = user.get("password").and_then(Value::as_str).unwrap_or_default();
        if !verify_password(&credentials.password, hash) {
            bail!("login failed");
        }

        let token = AccessTokenRecord {
            id: generate_token_id(),
            user_id: user.get("id").cloned().unwrap_or(Value::Null),
            ttl: DEFAULT_TOKEN_TTL,
            created: chrono::Utc::now().to_rfc3339(),
        };
        let token = tokens.create(&serde_json::to_value(token)?).await?;
        Ok(ModelInstance::new(tokens, token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_store() -> (SqliteDataSource, Arc<SqliteModel>, SqliteModel) {
        let ds = SqliteDataSource::new_in_memory().unwrap();
        let tokens = Arc::new(ds.token_model("AccessToken"));
        let users = ds.identity_model("user", tokens.clone());
        (ds, tokens, users)
    }

    #[tokio::test]
    async fn identity_create_hashes_and_hides_password() {
        let (ds, _, users) = identity_store();

        let user = users
            .create(&json!({"email": "a@b.com", "password": "x"}))
            .await
            .unwrap();

        assert_eq!(user["id"], json!(1));
        assert!(user.get("password").is_none());
        let stored = ds.find_by_id("user", &json!(1)).unwrap().unwrap();
        let hash = stored["password"].as_str().unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("x", hash));
    }

    #[tokio::test]
    async fn duplicate_emails_are_rejected() {
        let (_, _, users) = identity_store();
        users.create(&json!({"email": "a@b.com", "password": "x"})).await.unwrap();

        let err = users
            .create(&json!({"email": "a@b.com", "password": "y"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn login_issues_token_owned_by_user() {
        let (ds, _, users) = identity_store();
        users.create(&json!({"email": "a@b.com", "password": "x"})).await.unwrap();

        let token = users
            .login(&json!({"email": "a@b.com", "password": "x"}))
            .await
            .unwrap();

        assert_eq!(token.model_name(), "AccessToken");
        assert_eq!(token.get("userId"), Some(&json!(1)));
        assert_eq!(token.get("ttl"), Some(&json!(DEFAULT_TOKEN_TTL)));
        let id = token.id_string().unwrap();
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(ds.count("AccessToken").unwrap(), 1);
    }

    #[tokio::test]
    async fn login_rejects_wrong_password_and_unknown_user() {
        let (_, _, users) = identity_store();
        users.create(&json!({"email": "a@b.com", "password": "x"})).await.unwrap();

        let wrong = users.login(&json!({"email": "a@b.com", "password": "nope"})).await;
        assert_eq!(wrong.unwrap_err().to_string(), "login failed");

        let unknown = users.login(&json!({"email": "c@d.com", "password": "x"})).await;
        assert!(unknown.is_err());

        let missing = users.login(&json!({"password": "x"})).await;
        assert_eq!(missing.unwrap_err().to_string(), "username or email is required");
    }

    #[tokio::test]
    async fn plain_models_cannot_log_in() {
        let ds = SqliteDataSource::new_in_memory().unwrap();
        let widgets = ds.model("widget");

        let err = widgets.login(&json!({"email": "a@b.com", "password": "x"})).await;
        assert_eq!(err.unwrap_err().to_string(), "model widget does not support login");
    }

    #[tokio::test]
    async fn tokens_keep_explicit_ids() {
        let ds = SqliteDataSource::new_in_memory().unwrap();
        let tokens = ds.token_model("AccessToken");

        let anonymous = tokens.create(&json!({"id": "$anonymous"})).await.unwrap();
        let assigned = tokens.create(&json!({})).await.unwrap();

        assert_eq!(anonymous["id"], json!("$anonymous"));
        assert_ne!(assigned["id"], json!("$anonymous"));
        assert!(assigned.get("created").is_some());
    }

    #[tokio::test]
    async fn find_or_create_reuses_matching_record() {
        let ds = SqliteDataSource::new_in_memory().unwrap();
        let roles = ds.model("Role");

        let first = roles
            .find_or_create(&json!({"name": "admin"}), &json!({"name": "admin"}))
            .await
            .unwrap();
        let second = roles
            .find_or_create(&json!({"name": "admin"}), &json!({"name": "admin"}))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(ds.count("Role").unwrap(), 1);

        roles.destroy(&first["id"]).await.unwrap();
        assert_eq!(ds.count("Role").unwrap(), 0);
    }
}
