//! A SQLite-backed reference [`DataSource`] and its models.
//!
//! This is a test collaborator: it gives demo applications and integration
//! tests real records, access tokens and password checks so scenarios can run
//! end to end. Scenario orchestration never depends on it; any application
//! exposing [`crate::app::Model`] and [`DataSource`] works the same way.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OptionalExtension;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::app::DataSource;

mod migrations;
pub mod models;

pub use models::SqliteModel;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Renders a record id as the text key it is stored under.
pub fn id_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A SQLite datasource holding every model's records as JSON documents.
#[derive(Clone)]
pub struct SqliteDataSource {
    pool: DbPool,
    ids: Arc<Mutex<HashMap<String, i64>>>,
}

impl SqliteDataSource {
    pub fn new(database_path: PathBuf) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(&database_path);
        let pool = Pool::builder().max_size(8).build(manager)?;

        let ds = Self {
            pool,
            ids: Arc::new(Mutex::new(HashMap::new())),
        };
        migrations::run(&ds)?;
        Ok(ds)
    }

    /// A private in-memory database. The pool holds a single connection so
    /// every caller sees the same data.
    pub fn new_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager)?;

        let ds = Self {
            pool,
            ids: Arc::new(Mutex::new(HashMap::new())),
        };
        migrations::run(&ds)?;
        Ok(ds)
    }

    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Connection) -> Result<T>,
    {
        let conn = self.pool.get()?;
        f(&conn)
    }

    /// Next numeric id for `model`, seeded from the highest stored id.
    pub fn next_id(&self, model: &str) -> Result<i64> {
        let mut ids = self
            .ids
            .lock()
            .map_err(|_| anyhow!("id registry poisoned"))?;

        let current = match ids.get(model) {
            Some(current) => *current,
            None => self.with_conn(|conn| {
                let max: i64 = conn.query_row(
                    "SELECT COALESCE(MAX(CAST(id AS INTEGER)), 0) FROM documents
                     WHERE model = ?1 AND id NOT GLOB '*[^0-9]*'",
                    [model],
                    |row| row.get(0),
                )?;
                Ok(max)
            })?,
        };

        let next = current + 1;
        ids.insert(model.to_string(), next);
        Ok(next)
    }

    pub fn insert(&self, model: &str, data: &Value) -> Result<()> {
        let id = data
            .get("id")
            .map(id_key)
            .ok_or_else(|| anyhow!("{} record has no id", model))?;
        let json = serde_json::to_string(data)?;

        self.with_conn(|conn| {
            let result = conn.execute(
                "INSERT INTO documents (model, id, data, created_at) VALUES (?1, ?2, ?3, datetime('now'))",
                rusqlite::params![model, id, json],
            );

            match result {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Err(anyhow!("{} with id '{}' already exists", model, id))
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn find_by_id(&self, model: &str, id: &Value) -> Result<Option<Value>> {
        let key = id_key(id);
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT data FROM documents WHERE model = ?1 AND id = ?2")?;
            let data: Option<String> = stmt
                .query_row(rusqlite::params![model, key], |row| row.get(0))
                .optional()?;
            match data {
                Some(json) => Ok(Some(serde_json::from_str(&json)?)),
                None => Ok(None),
            }
        })
    }

    /// Records of `model` whose fields equal every field of `filter`, oldest first.
    pub fn find(&self, model: &str, filter: &Value) -> Result<Vec<Value>> {
        let rows = self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT data FROM documents WHERE model = ?1 ORDER BY rowid")?;
            let rows = stmt
                .query_map([model], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        let mut found = Vec::new();
        for json in rows {
            let record: Value = serde_json::from_str(&json)?;
            let matches = match filter.as_object() {
                Some(fields) => fields.iter().all(|(k, v)| record.get(k) == Some(v)),
                None => true,
            };
            if matches {
                found.push(record);
            }
        }
        Ok(found)
    }

    pub fn delete(&self, model: &str, id: &Value) -> Result<bool> {
        let key = id_key(id);
        self.with_conn(|conn| {
            let rows_affected = conn.execute(
                "DELETE FROM documents WHERE model = ?1 AND id = ?2",
                rusqlite::params![model, key],
            )?;
            Ok(rows_affected > 0)
        })
    }

    pub fn count(&self, model: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let total: u64 = conn.query_row(
                "SELECT COUNT(*) FROM documents WHERE model = ?1",
                [model],
                |row| row.get(0),
            )?;
            Ok(total)
        })
    }

    pub fn model(&self, name: &str) -> SqliteModel {
        SqliteModel::plain(name, self.clone())
    }

    pub fn token_model(&self, name: &str) -> SqliteModel {
        SqliteModel::tokens(name, self.clone())
    }

    /// A model whose records can log in, issuing tokens into `tokens`.
    pub fn identity_model(&self, name: &str, tokens: Arc<SqliteModel>) -> SqliteModel {
        SqliteModel::identity(name, self.clone(), tokens)
    }
}

#[async_trait]
impl DataSource for SqliteDataSource {
    async fn automigrate(&self) -> anyhow::Result<()> {
        migrations::reset(self)
    }

    fn reset_ids(&self) {
        if let Ok(mut ids) = self.ids.lock() {
            ids.clear();
        }
    }
}

pub fn init() -> Result<SqliteDataSource> {
    let path = std::env::var("DATABASE_PATH").unwrap_or_else(|_| "authz-harness.db".to_string());
    let db_path = PathBuf::from(path);
    SqliteDataSource::new(db_path)
}
