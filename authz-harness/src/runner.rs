use async_trait::async_trait;
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::TestError;
use crate::hooks::{BoxFuture, Hook, Phase, Scope};
use crate::suite::{Suite, TestCase};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    /// The check ran and its assertion did not hold.
    Failed(String),
    /// A fixture failed or was misused; the check did not decide the outcome.
    Errored(String),
}

#[derive(Debug, Clone)]
pub struct TestReport {
    pub title: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone)]
pub struct HookFailure {
    pub scope_title: String,
    pub hook: String,
    pub phase: Phase,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct Report {
    pub tests: Vec<TestReport>,
    pub hook_failures: Vec<HookFailure>,
}

impl Report {
    pub fn is_success(&self) -> bool {
        self.hook_failures.is_empty() && self.tests.iter().all(|t| t.outcome == Outcome::Passed)
    }

    pub fn passed(&self) -> usize {
        self.tests
            .iter()
            .filter(|t| t.outcome == Outcome::Passed)
            .count()
    }

    pub fn outcome(&self, title: &str) -> Option<&Outcome> {
        self.tests
            .iter()
            .find(|t| t.title == title)
            .map(|t| &t.outcome)
    }

    pub fn titles(&self) -> Vec<&str> {
        self.tests.iter().map(|t| t.title.as_str()).collect()
    }

    fn record_hook_failure(&mut self, scope_title: &str, hook: &Hook, error: String) {
        warn!(scope = %scope_title, hook = %hook.label, phase = ?hook.phase, %error, "hook failed");
        self.hook_failures.push(HookFailure {
            scope_title: scope_title.to_string(),
            hook: hook.label.clone(),
            phase: hook.phase,
            error,
        });
    }
}

/// Walks a suite tree, running hooks and checks against one context.
#[async_trait]
pub trait SuiteRunner: Send + Sync {
    async fn run(&self, suite: &Suite, cx: &mut Context) -> Report;
}

/// Depth-first, one hook at a time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialRunner;

#[async_trait]
impl SuiteRunner for SerialRunner {
    async fn run(&self, suite: &Suite, cx: &mut Context) -> Report {
        let mut report = Report::default();
        run_suite(suite, cx, Vec::new(), Vec::new(), Vec::new(), &mut report).await;
        report
    }
}

fn title_of(path: &[String], name: &str) -> String {
    path.iter()
        .map(String::as_str)
        .chain(std::iter::once(name))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn run_suite<'a>(
    suite: &'a Suite,
    cx: &'a mut Context,
    mut path: Vec<String>,
    each_setup: Vec<Hook>,
    each_teardown: Vec<Hook>,
    report: &'a mut Report,
) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        path.push(suite.label.clone());
        let scope_title = title_of(&path, "");
        debug!(suite = %scope_title, "entering suite");

        let mut aborted = None;
        for hook in suite.hooks_for(Phase::Setup, Scope::PerSuite) {
            if let Err(e) = hook.run(cx).await {
                let error = format!("\"before all\" hook {} failed: {}", hook.label, e);
                report.record_hook_failure(&scope_title, hook, e.to_string());
                aborted = Some(error);
                break;
            }
        }

        match aborted {
            Some(error) => skip_suite(suite, &path, &error, report),
            None => {
                let mut setups = each_setup;
                setups.extend(suite.hooks_for(Phase::Setup, Scope::PerTest).cloned());
                let mut teardowns: Vec<Hook> = suite
                    .hooks_for(Phase::Teardown, Scope::PerTest)
                    .cloned()
                    .collect();
                teardowns.extend(each_teardown);

                for test in &suite.tests {
                    let title = title_of(&path, &test.name);
                    let outcome = run_test(test, &title, &setups, &teardowns, cx, report).await;
                    report.tests.push(TestReport { title, outcome });
                }

                for child in &suite.children {
                    // Children inherit this scope's state; siblings never see each other's.
                    let mut child_cx = cx.clone();
                    run_suite(
                        child,
                        &mut child_cx,
                        path.clone(),
                        setups.clone(),
                        teardowns.clone(),
                        report,
                    )
                    .await;
                }
            }
        }

        for hook in suite.hooks_for(Phase::Teardown, Scope::PerSuite) {
            if let Err(e) = hook.run(cx).await {
                report.record_hook_failure(&scope_title, hook, e.to_string());
            }
        }
        debug!(suite = %scope_title, "leaving suite");
    })
}

async fn run_test(
    test: &TestCase,
    title: &str,
    setups: &[Hook],
    teardowns: &[Hook],
    cx: &mut Context,
    report: &mut Report,
) -> Outcome {
    let mut outcome = None;
    for hook in setups {
        if let Err(e) = hook.run(cx).await {
            outcome = Some(Outcome::Errored(format!(
                "\"before each\" hook {} failed: {}",
                hook.label, e
            )));
            report.record_hook_failure(title, hook, e.to_string());
            break;
        }
    }

    let mut outcome = match outcome {
        Some(errored) => errored,
        None => match test.check(cx) {
            Ok(()) => Outcome::Passed,
            Err(TestError::Assertion(message)) => Outcome::Failed(message),
            Err(TestError::Fixture(e)) => Outcome::Errored(e.to_string()),
        },
    };

    for hook in teardowns {
        if let Err(e) = hook.run(cx).await {
            if outcome == Outcome::Passed {
                outcome = Outcome::Errored(format!(
                    "\"after each\" hook {} failed: {}",
                    hook.label, e
                ));
            }
            report.record_hook_failure(title, hook, e.to_string());
        }
    }
    outcome
}

fn skip_suite(suite: &Suite, path: &[String], error: &str, report: &mut Report) {
    for test in &suite.tests {
        report.tests.push(TestReport {
            title: title_of(path, &test.name),
            outcome: Outcome::Errored(error.to_string()),
        });
    }
    for child in &suite.children {
        let mut child_path = path.to_vec();
        child_path.push(child.label.clone());
        skip_suite(child, &child_path, error, report);
    }
}
