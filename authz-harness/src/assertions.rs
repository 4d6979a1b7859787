//! Checks over the recorded exchange, and the prebuilt
//! identity × outcome scenarios built from them.

use serde_json::Value;

use crate::context::Context;
use crate::error::TestError;
use crate::request::{Payload, Target};
use crate::scenarios::{when_called_as, Identity};
use crate::suite::{Suite, TestCase};

pub const DEFAULT_DENIAL_STATUS: u16 = 401;
pub const ACL_ERROR_STATUS_SETTING: &str = "aclErrorStatus";

/// The status a denied request must answer with.
///
/// A per-context override wins over the application's `aclErrorStatus`
/// setting, which wins over 401.
pub fn expected_denial_status(cx: &Context) -> u16 {
    if let Some(status) = cx.acl_error_status {
        return status;
    }
    cx.app()
        .ok()
        .and_then(|app| app.setting(ACL_ERROR_STATUS_SETTING))
        .and_then(|v| v.as_u64())
        .and_then(|v| u16::try_from(v).ok())
        .filter(|v| *v != 0)
        .unwrap_or(DEFAULT_DENIAL_STATUS)
}

pub fn check_allowed(cx: &Context) -> Result<(), TestError> {
    let status = cx.exchange()?.response.status_code();
    if (100..=399).contains(&status) {
        Ok(())
    } else {
        Err(TestError::Assertion(format!(
            "expected {} to be within 100..399",
            status
        )))
    }
}

pub fn check_denied(cx: &Context) -> Result<(), TestError> {
    let status = cx.exchange()?.response.status_code();
    let expected = expected_denial_status(cx);
    if status == expected {
        Ok(())
    } else {
        Err(TestError::Assertion(format!(
            "expected {} to equal {}",
            status, expected
        )))
    }
}

pub fn check_not_found(cx: &Context) -> Result<(), TestError> {
    let status = cx.exchange()?.response.status_code();
    if status == 404 {
        Ok(())
    } else {
        Err(TestError::Assertion(format!("expected {} to equal 404", status)))
    }
}

pub fn should_be_allowed() -> TestCase {
    TestCase::new("should be allowed", check_allowed)
}

pub fn should_be_denied() -> TestCase {
    TestCase::new("should not be allowed", check_denied)
}

pub fn should_not_be_found() -> TestCase {
    TestCase::new("should not be found", check_not_found)
}

fn allowed_as(identity: Identity, verb: &str, target: Target, payload: Option<Payload>) -> Suite {
    when_called_as(identity, verb, target, payload, |s| s.test(should_be_allowed()))
}

fn denied_as(identity: Identity, verb: &str, target: Target, payload: Option<Payload>) -> Suite {
    when_called_as(identity, verb, target, payload, |s| s.test(should_be_denied()))
}

pub fn should_be_allowed_when_called_anonymously(
    verb: &str,
    target: impl Into<Target>,
    payload: Option<Payload>,
) -> Suite {
    allowed_as(Identity::Anonymous, verb, target.into(), payload)
}

pub fn should_be_denied_when_called_anonymously(
    verb: &str,
    target: impl Into<Target>,
    payload: Option<Payload>,
) -> Suite {
    denied_as(Identity::Anonymous, verb, target.into(), payload)
}

pub fn should_be_allowed_when_called_unauthenticated(
    verb: &str,
    target: impl Into<Target>,
    payload: Option<Payload>,
) -> Suite {
    allowed_as(Identity::Unauthenticated, verb, target.into(), payload)
}

pub fn should_be_denied_when_called_unauthenticated(
    verb: &str,
    target: impl Into<Target>,
    payload: Option<Payload>,
) -> Suite {
    denied_as(Identity::Unauthenticated, verb, target.into(), payload)
}

pub fn should_be_allowed_when_called_by_user(
    credentials: Value,
    verb: &str,
    target: impl Into<Target>,
    payload: Option<Payload>,
) -> Suite {
    allowed_as(Identity::user(credentials), verb, target.into(), payload)
}

pub fn should_be_denied_when_called_by_user(
    credentials: Value,
    verb: &str,
    target: impl Into<Target>,
    payload: Option<Payload>,
) -> Suite {
    denied_as(Identity::user(credentials), verb, target.into(), payload)
}

pub fn should_be_allowed_when_called_by_user_with_role(
    credentials: Value,
    role: &str,
    verb: &str,
    target: impl Into<Target>,
    payload: Option<Payload>,
) -> Suite {
    allowed_as(
        Identity::user_with_role(credentials, role),
        verb,
        target.into(),
        payload,
    )
}

pub fn should_be_denied_when_called_by_user_with_role(
    credentials: Value,
    role: &str,
    verb: &str,
    target: impl Into<Target>,
    payload: Option<Payload>,
) -> Suite {
    denied_as(
        Identity::user_with_role(credentials, role),
        verb,
        target.into(),
        payload,
    )
}
