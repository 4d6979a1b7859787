//! Suite builders that combine an identity fixture, a request fixture and the
//! caller's checks into one nested scenario.

use serde_json::{json, Value};

use crate::context::{Context, MethodKind};
use crate::fixtures::{
    given_an_anonymous_token, given_an_unauthenticated_token, given_logged_in_user,
    given_logged_in_user_with_role,
};
use crate::hooks::{assign, Fixture, Scope};
use crate::request::{request_fixture, Payload, Target};
use crate::suite::Suite;

/// The authentication state a request is issued under.
#[derive(Debug, Clone, PartialEq)]
pub enum Identity {
    /// A placeholder token with the anonymous sentinel id.
    Anonymous,
    /// A placeholder token whose id is left to the store.
    Unauthenticated,
    /// A logged-in user created from the credentials.
    User { credentials: Value },
    /// A logged-in user mapped to a role.
    UserWithRole { credentials: Value, role: String },
}

impl Identity {
    pub fn user(credentials: Value) -> Self {
        Identity::User { credentials }
    }

    pub fn user_with_role(credentials: Value, role: &str) -> Self {
        Identity::UserWithRole {
            credentials,
            role: role.to_string(),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Identity::Anonymous => "when called anonymously".to_string(),
            Identity::Unauthenticated => "when called with unauthenticated token".to_string(),
            Identity::User { .. } => "when called by logged in user".to_string(),
            Identity::UserWithRole { role, .. } => {
                format!("when called by logged in user with role {}", role)
            }
        }
    }

    pub fn fixture(&self, scope: Scope) -> Fixture {
        match self {
            Identity::Anonymous => given_an_anonymous_token(scope),
            Identity::Unauthenticated => given_an_unauthenticated_token(json!({}), scope),
            Identity::User { credentials } => given_logged_in_user(credentials.clone(), scope),
            Identity::UserWithRole { credentials, role } => {
                given_logged_in_user_with_role(credentials.clone(), role, scope)
            }
        }
    }
}

fn method_scope(label: String, name: &str, kind: MethodKind, body: impl FnOnce(Suite) -> Suite) -> Suite {
    let name = name.to_string();
    let marker = Fixture::new(Scope::PerTest).setup(
        "record method",
        assign(move |cx: &mut Context| cx.method = Some((name.clone(), kind))),
    );
    body(Suite::new(label).with(marker))
}

/// A scope labelled `.name`.
pub fn static_method(name: &str, body: impl FnOnce(Suite) -> Suite) -> Suite {
    method_scope(format!(".{}", name), name, MethodKind::Static, body)
}

/// A scope labelled `.prototype.name`.
pub fn instance_method(name: &str, body: impl FnOnce(Suite) -> Suite) -> Suite {
    method_scope(format!(".prototype.{}", name), name, MethodKind::Instance, body)
}

/// A scope labelled `VERB target` that issues the request before every test.
pub fn when_called_remotely(
    verb: &str,
    target: impl Into<Target>,
    payload: Option<Payload>,
    body: impl FnOnce(Suite) -> Suite,
) -> Suite {
    let target = target.into();
    let label = format!("{} {}", verb.to_uppercase(), target.label());
    body(Suite::new(label).with(request_fixture(verb, target, payload)))
}

/// Issues the request under `identity`, created fresh for every test.
pub fn when_called_as(
    identity: Identity,
    verb: &str,
    target: impl Into<Target>,
    payload: Option<Payload>,
    body: impl FnOnce(Suite) -> Suite,
) -> Suite {
    Suite::new(identity.label())
        .with(identity.fixture(Scope::PerTest))
        .child(when_called_remotely(verb, target, payload, body))
}

pub fn when_called_anonymously(
    verb: &str,
    target: impl Into<Target>,
    payload: Option<Payload>,
    body: impl FnOnce(Suite) -> Suite,
) -> Suite {
    when_called_as(Identity::Anonymous, verb, target, payload, body)
}

pub fn when_called_unauthenticated(
    verb: &str,
    target: impl Into<Target>,
    payload: Option<Payload>,
    body: impl FnOnce(Suite) -> Suite,
) -> Suite {
    when_called_as(Identity::Unauthenticated, verb, target, payload, body)
}

pub fn when_called_by_user(
    credentials: Value,
    verb: &str,
    target: impl Into<Target>,
    payload: Option<Payload>,
    body: impl FnOnce(Suite) -> Suite,
) -> Suite {
    when_called_as(Identity::user(credentials), verb, target, payload, body)
}

pub fn when_called_by_user_with_role(
    credentials: Value,
    role: &str,
    verb: &str,
    target: impl Into<Target>,
    payload: Option<Payload>,
    body: impl FnOnce(Suite) -> Suite,
) -> Suite {
    when_called_as(
        Identity::user_with_role(credentials, role),
        verb,
        target,
        payload,
        body,
    )
}

/// Logs in once for the whole scope; every nested scenario shares the same user and token.
pub fn when_logged_in_as_user(credentials: Value, body: impl FnOnce(Suite) -> Suite) -> Suite {
    body(Suite::new("when logged in as user").with(given_logged_in_user(credentials, Scope::PerSuite)))
}

/// As [`when_logged_in_as_user`], with the user mapped to `role`.
pub fn when_logged_in_as_user_with_role(
    credentials: Value,
    role: &str,
    body: impl FnOnce(Suite) -> Suite,
) -> Suite {
    body(
        Suite::new("when logged in as user")
            .with(given_logged_in_user_with_role(credentials, role, Scope::PerSuite)),
    )
}
