//! ---
//! fdh_section: "11-test-harness"
//! fdh_subsection: "02-suite-model"
//! fdh_type: "source"
//! fdh_scope: "code"
//! fdh_description: "Declarative suite, group, and case model."
//! fdh_version: "v0.1.0"
//! fdh_owner: "tbd"
//! ---
//! Suites are declared statically: a named root group holding ordered cases
//! and ordered nested groups. A group without cases is valid and passes.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use fdh_config::DappConfig;
use futures::future::BoxFuture;
use futures::FutureExt;

/// Future returned by a test case body.
pub type CaseFuture = BoxFuture<'static, anyhow::Result<()>>;

type CaseBody = Arc<dyn Fn(TestContext) -> CaseFuture + Send + Sync>;

/// Per-run view handed to every case.
///
/// Built fresh for each run so nothing resolved during one run is visible to
/// the next.
#[derive(Debug, Clone)]
pub struct TestContext {
    config: Arc<DappConfig>,
    run_id: u64,
}

impl TestContext {
    pub(crate) fn new(config: Arc<DappConfig>, run_id: u64) -> Self {
        Self { config, run_id }
    }

    /// Configuration resolved during this run's setup.
    pub fn config(&self) -> &DappConfig {
        &self.config
    }

    /// Monotonic identifier of the run, starting at 1 per harness.
    pub fn run_id(&self) -> u64 {
        self.run_id
    }
}

/// A named async test body.
#[derive(Clone)]
pub struct TestCase {
    name: String,
    body: CaseBody,
}

impl TestCase {
    /// Wrap an async body under `name`.
    pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            body: Arc::new(move |ctx| body(ctx).boxed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn invoke(&self, ctx: TestContext) -> CaseFuture {
        (self.body)(ctx)
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase").field("name", &self.name).finish()
    }
}

/// Named collection of cases and nested groups.
#[derive(Debug, Clone)]
pub struct TestGroup {
    name: String,
    cases: Vec<TestCase>,
    groups: Vec<TestGroup>,
}

impl TestGroup {
    /// Create an empty group.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cases: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// Append a case.
    pub fn case(mut self, case: TestCase) -> Self {
        self.cases.push(case);
        self
    }

    /// Append a nested group.
    pub fn group(mut self, group: TestGroup) -> Self {
        self.groups.push(group);
        self
    }

    /// Group name as declared.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cases declared directly in this group.
    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    /// Nested groups in declaration order.
    pub fn groups(&self) -> &[TestGroup] {
        &self.groups
    }

    /// Number of cases in this group and all nested groups.
    pub fn case_count(&self) -> usize {
        self.cases.len() + self.groups.iter().map(TestGroup::case_count).sum::<usize>()
    }
}

/// Top-level group executed by one run.
#[derive(Debug, Clone)]
pub struct Suite {
    root: TestGroup,
}

impl Suite {
    /// Create a suite whose root group is named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            root: TestGroup::new(name),
        }
    }

    /// Append a case to the root group.
    pub fn case(mut self, case: TestCase) -> Self {
        self.root = self.root.case(case);
        self
    }

    /// Append a nested group to the root group.
    pub fn group(mut self, group: TestGroup) -> Self {
        self.root = self.root.group(group);
        self
    }

    /// Suite name, which is the root group name.
    pub fn name(&self) -> &str {
        self.root.name()
    }

    pub fn root(&self) -> &TestGroup {
        &self.root
    }

    /// Total number of cases in the suite.
    pub fn case_count(&self) -> usize {
        self.root.case_count()
    }

    /// Execution order: a group's own cases first, then its nested groups,
    /// depth-first in declaration order. Each entry carries the slash-joined
    /// path of its enclosing group.
    pub fn plan(&self) -> Vec<PlannedCase<'_>> {
        let mut plan = Vec::with_capacity(self.case_count());
        collect(&self.root, self.root.name().to_owned(), &mut plan);
        plan
    }
}

/// A case paired with the path of the group that declared it.
#[derive(Debug, Clone)]
pub struct PlannedCase<'a> {
    /// Slash-joined path of the enclosing group.
    pub group_path: String,
    pub case: &'a TestCase,
}

fn collect<'a>(group: &'a TestGroup, path: String, plan: &mut Vec<PlannedCase<'a>>) {
    for case in &group.cases {
        plan.push(PlannedCase {
            group_path: path.clone(),
            case,
        });
    }
    for child in &group.groups {
        collect(child, format!("{path}/{}", child.name), plan);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(name: &str) -> TestCase {
        TestCase::new(name, |_| async { Ok(()) })
    }

    #[test]
    fn empty_subgroup_counts_zero_cases() {
        let suite = Suite::new("Flow Dapp Tests").group(TestGroup::new("Blank Tests"));
        assert_eq!(suite.case_count(), 0);
        assert!(suite.plan().is_empty());
        assert_eq!(suite.root().groups().len(), 1);
        assert_eq!(suite.root().groups()[0].name(), "Blank Tests");
    }

    #[test]
    fn plan_runs_own_cases_before_nested_groups() {
        let suite = Suite::new("root")
            .group(
                TestGroup::new("a")
                    .group(TestGroup::new("a1").case(noop("a1-x")))
                    .case(noop("a-x")),
            )
            .case(noop("root-x"))
            .group(TestGroup::new("b").case(noop("b-x")).case(noop("b-y")));

        let order: Vec<(String, String)> = suite
            .plan()
            .into_iter()
            .map(|p| (p.group_path, p.case.name().to_owned()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("root".to_owned(), "root-x".to_owned()),
                ("root/a".to_owned(), "a-x".to_owned()),
                ("root/a/a1".to_owned(), "a1-x".to_owned()),
                ("root/b".to_owned(), "b-x".to_owned()),
                ("root/b".to_owned(), "b-y".to_owned()),
            ]
        );
        assert_eq!(suite.case_count(), 5);
    }
}
