use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::error::TestError;
use crate::hooks::{Fixture, Hook, Phase, Scope};

pub type Check = Arc<dyn Fn(&Context) -> Result<(), TestError> + Send + Sync>;

#[derive(Clone)]
pub struct TestCase {
    pub name: String,
    check: Check,
}

impl TestCase {
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Context) -> Result<(), TestError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    pub fn check(&self, cx: &Context) -> Result<(), TestError> {
        (self.check)(cx)
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase").field("name", &self.name).finish()
    }
}

/// A labelled scope: its hooks, its tests and nested scopes.
///
/// Suites are plain descriptors; nothing runs until a
/// [`SuiteRunner`](crate::runner::SuiteRunner) walks them.
#[derive(Debug, Clone, Default)]
pub struct Suite {
    pub label: String,
    pub hooks: Vec<Hook>,
    pub tests: Vec<TestCase>,
    pub children: Vec<Suite>,
}

impl Suite {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn with(mut self, fixture: Fixture) -> Self {
        self.hooks.extend(fixture.into_hooks());
        self
    }

    pub fn hook(mut self, hook: Hook) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn test(mut self, test: TestCase) -> Self {
        self.tests.push(test);
        self
    }

    pub fn it<F>(self, name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Context) -> Result<(), TestError> + Send + Sync + 'static,
    {
        self.test(TestCase::new(name, check))
    }

    pub fn child(mut self, suite: Suite) -> Self {
        self.children.push(suite);
        self
    }

    pub fn describe(self, label: impl Into<String>, body: impl FnOnce(Suite) -> Suite) -> Self {
        self.child(body(Suite::new(label)))
    }

    pub fn hooks_for(&self, phase: Phase, scope: Scope) -> impl Iterator<Item = &Hook> + '_ {
        self.hooks
            .iter()
            .filter(move |h| h.phase == phase && h.scope == scope)
    }

    pub fn test_count(&self) -> usize {
        self.tests.len() + self.children.iter().map(Suite::test_count).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::assign;

    #[test]
    fn describe_nests_suites_and_counts_tests() {
        let suite = Suite::new("root")
            .it("a", |_| Ok(()))
            .describe("child", |s| s.it("b", |_| Ok(())).it("c", |_| Ok(())));

        assert_eq!(suite.children.len(), 1);
        assert_eq!(suite.children[0].label, "child");
        assert_eq!(suite.test_count(), 3);
    }

    #[test]
    fn hooks_are_filtered_by_phase_and_scope() {
        let fixture = Fixture::new(Scope::PerSuite)
            .setup("a", assign(|_: &mut Context| {}))
            .teardown("b", assign(|_: &mut Context| {}));
        let suite = Suite::new("root")
            .with(fixture)
            .hook(Hook::setup(Scope::PerTest, "c", assign(|_: &mut Context| {})));

        let labels: Vec<&str> = suite
            .hooks_for(Phase::Setup, Scope::PerSuite)
            .map(|h| h.label.as_str())
            .collect();
        assert_eq!(labels, vec!["a"]);
        assert_eq!(suite.hooks_for(Phase::Setup, Scope::PerTest).count(), 1);
        assert_eq!(suite.hooks_for(Phase::Teardown, Scope::PerSuite).count(), 1);
    }
}
