//! Declarative authorization scenarios for HTTP applications.
//!
//! A scenario pairs an identity (anonymous, a placeholder token, a logged-in
//! user, a user holding a role) with a request and an expected outcome. The
//! building blocks are [`fixtures`], [`request`] and [`assertions`]; suites
//! built from them are executed by a [`runner::SuiteRunner`].

pub mod app;
pub mod assertions;
pub mod config;
pub mod context;
pub mod error;
pub mod fixtures;
pub mod hooks;
pub mod request;
pub mod runner;
pub mod scenarios;
pub mod store;
pub mod suite;

#[cfg(test)]
mod test_support;

pub use app::{AppHandle, Application, DataSource, HttpClient, Model};
pub use config::HarnessConfig;
pub use context::{Context, ModelInstance};
pub use error::{FixtureError, Result, TestError};
pub use hooks::{Fixture, Scope};
pub use request::{Payload, Target};
pub use runner::{Outcome, Report, SerialRunner, SuiteRunner};
pub use suite::{Suite, TestCase};
