use super::SqliteDataSource;
use anyhow::Result;

pub fn run(db: &SqliteDataSource) -> Result<()> {
    db.with_conn(|conn| {
        conn.execute_batch(
            r#"
            -- One row per model record, stored as a JSON document
            CREATE TABLE IF NOT EXISTS documents (
                model           TEXT NOT NULL,
                id              TEXT NOT NULL,
                data            TEXT NOT NULL,
                created_at      TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (model, id)
            );

            CREATE INDEX IF NOT EXISTS idx_documents_model ON documents(model);
            "#,
        )?;
        Ok(())
    })
}

/// Drops every table and recreates the schema.
pub fn reset(db: &SqliteDataSource) -> Result<()> {
    db.with_conn(|conn| {
        conn.execute_batch(
            r#"
            DROP INDEX IF EXISTS idx_documents_model;
            DROP TABLE IF EXISTS documents;
            "#,
        )?;
        Ok(())
    })?;
    run(db)
}
