use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

use crate::context::Context;
use crate::error::Result;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Setup,
    Teardown,
}

/// How often a hook runs.
///
/// `PerSuite` hooks run once around every test of their suite, so all those
/// tests observe the same resources. `PerTest` hooks run around each test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    PerSuite,
    PerTest,
}

/// One step of a setup or teardown chain.
#[async_trait]
pub trait Action: Send + Sync {
    async fn run(&self, cx: &mut Context) -> Result<()>;
}

/// Adapts a synchronous context mutation into an [`Action`].
pub struct Assign<F>(pub F);

#[async_trait]
impl<F> Action for Assign<F>
where
    F: Fn(&mut Context) + Send + Sync,
{
    async fn run(&self, cx: &mut Context) -> Result<()> {
        (self.0)(cx);
        Ok(())
    }
}

pub fn assign<F>(f: F) -> Assign<F>
where
    F: Fn(&mut Context) + Send + Sync,
{
    Assign(f)
}

/// Adapts an async function over the context into an [`Action`].
///
/// ```ignore
/// fn seed(cx: &mut Context) -> BoxFuture<'_, Result<()>> {
///     Box::pin(async move { cx.args.push(1.into()); Ok(()) })
/// }
/// Hook::setup(Scope::PerTest, "seed", AsyncFn(seed));
/// ```
pub struct AsyncFn<F>(pub F);

#[async_trait]
impl<F> Action for AsyncFn<F>
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Result<()>> + Send + Sync,
{
    async fn run(&self, cx: &mut Context) -> Result<()> {
        (self.0)(cx).await
    }
}

#[derive(Clone)]
pub struct Hook {
    pub phase: Phase,
    pub scope: Scope,
    pub label: String,
    action: Arc<dyn Action>,
}

impl Hook {
    pub fn setup(scope: Scope, label: impl Into<String>, action: impl Action + 'static) -> Self {
        Self {
            phase: Phase::Setup,
            scope,
            label: label.into(),
            action: Arc::new(action),
        }
    }

    pub fn teardown(scope: Scope, label: impl Into<String>, action: impl Action + 'static) -> Self {
        Self {
            phase: Phase::Teardown,
            scope,
            label: label.into(),
            action: Arc::new(action),
        }
    }

    pub async fn run(&self, cx: &mut Context) -> Result<()> {
        debug!(phase = ?self.phase, scope = ?self.scope, hook = %self.label, "running hook");
        self.action.run(cx).await
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("phase", &self.phase)
            .field("scope", &self.scope)
            .field("label", &self.label)
            .finish()
    }
}

/// Paired setup and teardown hooks sharing one [`Scope`].
///
/// Hooks run in registration order. [`Fixture::around`] keeps teardown the
/// mirror image of setup: the outer fixture's resources are released before
/// the ones it was built on.
#[derive(Debug, Clone)]
pub struct Fixture {
    scope: Scope,
    setup: Vec<Hook>,
    teardown: Vec<Hook>,
}

impl Fixture {
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            setup: Vec::new(),
            teardown: Vec::new(),
        }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn setup(mut self, label: impl Into<String>, action: impl Action + 'static) -> Self {
        self.setup.push(Hook::setup(self.scope, label, action));
        self
    }

    pub fn teardown(mut self, label: impl Into<String>, action: impl Action + 'static) -> Self {
        self.teardown.push(Hook::teardown(self.scope, label, action));
        self
    }

    /// Builds `self` on top of `inner`: inner setup runs first, inner teardown last.
    pub fn around(self, inner: Fixture) -> Self {
        let mut setup = inner.setup;
        setup.extend(self.setup);
        let mut teardown = self.teardown;
        teardown.extend(inner.teardown);
        Self {
            scope: self.scope,
            setup,
            teardown,
        }
    }

    /// Appends `next`, whose hooks run after this fixture's.
    pub fn then(mut self, next: Fixture) -> Self {
        self.setup.extend(next.setup);
        self.teardown.extend(next.teardown);
        self
    }

    pub fn into_hooks(self) -> Vec<Hook> {
        let mut hooks = self.setup;
        hooks.extend(self.teardown);
        hooks
    }
}
