use crate::context::DEFAULT_USER_MODEL;

pub const DEFAULT_DATASOURCE: &str = "db";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    pub user_model: String,
    pub datasource: String,
    pub acl_error_status: Option<u16>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            user_model: DEFAULT_USER_MODEL.to_string(),
            datasource: DEFAULT_DATASOURCE.to_string(),
            acl_error_status: None,
        }
    }
}

impl HarnessConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let user_model = std::env::var("AUTHZ_USER_MODEL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.user_model);
        let datasource = std::env::var("AUTHZ_DATASOURCE")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.datasource);
        let acl_error_status = std::env::var("AUTHZ_ACL_ERROR_STATUS")
            .ok()
            .and_then(|s| s.parse().ok());

        Self {
            user_model,
            datasource,
            acl_error_status,
        }
    }
}

/// Installs the fmt subscriber. Later calls are ignored so every test may call it.
pub fn init_tracing() {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "authz_harness=info".parse() {
        filter = filter.add_directive(directive);
    }

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
