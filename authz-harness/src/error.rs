use thiserror::Error;
use tracing::error;

/// Failures raised while building a scenario's context.
///
/// Configuration errors mean the harness was wired incorrectly and are always
/// fatal to the enclosing scope. Resource errors come from the application's
/// collaborators (create, login, destroy, dispatch).
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("cannot get model of name {0} from app.models")]
    MissingModel(String),

    #[error("cannot test model {0} without attached dataSource")]
    MissingDataSource(String),

    #[error("{0} does not have a create method")]
    MissingCreate(String),

    #[error("App is not specified. Please use fixtures::with_app to specify the app.")]
    AppNotSpecified,

    #[error("no {0} exists in the current context")]
    MissingResource(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("no request has been made in the current context")]
    NoExchange,

    #[error("{operation} failed: {source}")]
    Resource {
        operation: String,
        #[source]
        source: anyhow::Error,
    },
}

impl FixtureError {
    pub fn resource(operation: impl Into<String>, source: anyhow::Error) -> Self {
        FixtureError::Resource {
            operation: operation.into(),
            source,
        }
    }

    pub fn is_configuration(&self) -> bool {
        !matches!(self, FixtureError::Resource { .. })
    }
}

/// Outcome of a failed test check.
#[derive(Debug, Error)]
pub enum TestError {
    #[error(transparent)]
    Fixture(#[from] FixtureError),

    #[error("assertion failed: {0}")]
    Assertion(String),
}

pub type Result<T, E = FixtureError> = std::result::Result<T, E>;

/// Logs a failed collaborator call with its detail chain and wraps it.
pub(crate) fn resource_failure(operation: impl Into<String>, err: anyhow::Error) -> FixtureError {
    let operation = operation.into();
    error!(%operation, error = %err, "resource operation failed");
    if let Some(details) = err.chain().nth(1) {
        error!(%operation, details = %details, "resource failure details");
    }
    FixtureError::resource(operation, err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_errors_are_not_configuration_errors() {
        let err = FixtureError::resource("create user", anyhow::anyhow!("boom"));
        assert!(!err.is_configuration());
        assert_eq!(err.to_string(), "create user failed: boom");

        assert!(FixtureError::AppNotSpecified.is_configuration());
        assert!(FixtureError::MissingModel("widget".into()).is_configuration());
    }

    #[test]
    fn fixture_errors_convert_into_test_errors() {
        let err: TestError = FixtureError::NoExchange.into();
        assert!(matches!(err, TestError::Fixture(FixtureError::NoExchange)));
    }
}
