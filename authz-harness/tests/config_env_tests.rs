use authz_harness::{config::HarnessConfig, store, Context};
use serial_test::serial;
use tempfile::tempdir;

fn cleanup_env() {
    std::env::remove_var("DATABASE_PATH");
    std::env::remove_var("AUTHZ_USER_MODEL");
    std::env::remove_var("AUTHZ_DATASOURCE");
    std::env::remove_var("AUTHZ_ACL_ERROR_STATUS");
}

#[test]
#[serial]
fn test_database_path_env_honored() {
    cleanup_env();

    let dir = tempdir().unwrap();
    let db_path = dir.path().join("nested").join("custom.db");
    std::env::set_var("DATABASE_PATH", db_path.to_str().unwrap());

    let db = store::init().expect("store::init should succeed");

    assert!(db_path.exists(), "Database file should be created at DATABASE_PATH location");
    assert_eq!(db.count("user").unwrap(), 0);

    drop(db);
    cleanup_env();
}

#[test]
#[serial]
fn test_file_store_survives_reopen() {
    cleanup_env();

    let dir = tempdir().unwrap();
    let db_path = dir.path().join("reopen.db");

    let db = store::SqliteDataSource::new(db_path.clone()).unwrap();
    db.insert("Role", &serde_json::json!({"id": 1, "name": "admin"}))
        .unwrap();
    drop(db);

    let db = store::SqliteDataSource::new(db_path).unwrap();
    assert_eq!(db.count("Role").unwrap(), 1);
    assert_eq!(db.next_id("Role").unwrap(), 2);
}

#[test]
#[serial]
fn test_defaults_without_env() {
    cleanup_env();

    let config = HarnessConfig::from_env();

    assert_eq!(config, HarnessConfig::default());
    assert_eq!(config.user_model, "user");
    assert_eq!(config.datasource, "db");
    assert_eq!(config.acl_error_status, None);
}

#[test]
#[serial]
fn test_env_overrides_applied_to_context() {
    cleanup_env();
    std::env::set_var("AUTHZ_USER_MODEL", "Customer");
    std::env::set_var("AUTHZ_DATASOURCE", "memory");
    std::env::set_var("AUTHZ_ACL_ERROR_STATUS", "403");

    let config = HarnessConfig::from_env();
    assert_eq!(config.user_model, "Customer");
    assert_eq!(config.datasource, "memory");
    assert_eq!(config.acl_error_status, Some(403));

    let cx = Context::from_config(&config);
    assert_eq!(cx.user_model(), "Customer");
    assert_eq!(cx.acl_error_status, Some(403));

    cleanup_env();
}

#[test]
#[serial]
fn test_invalid_values_fall_back_to_defaults() {
    cleanup_env();
    std::env::set_var("AUTHZ_USER_MODEL", "");
    std::env::set_var("AUTHZ_ACL_ERROR_STATUS", "forbidden");

    let config = HarnessConfig::from_env();
    assert_eq!(config.user_model, "user");
    assert_eq!(config.acl_error_status, None);

    cleanup_env();
}
