//! Test case runner
//!
//! Each apply step parses a Terraform JSON configuration, refreshes the
//! known resources, plans and applies the difference, then runs the step's
//! checks and verifies that a second plan is empty. Import steps re-import a
//! resource by its cloud ID and compare the result with the stored state.
//! Whatever happens, the case ends by destroying everything it created.

use std::collections::{HashMap, HashSet};

use hwcloud_core::binding::{Bindings, sort_by_dependencies};
use hwcloud_core::differ::{create_plan, destroy_plan};
use hwcloud_core::interpreter::{ApplyResult, EffectOutcome, Interpreter};
use hwcloud_core::parser::{self, ParseError, ParsedConfig};
use hwcloud_core::plan::{Plan, format_effect_brief};
use hwcloud_core::provider::{Provider, ProviderError};
use hwcloud_core::resource::{ResourceId, State, Value};
use hwcloud_core::schema::ResourceSchema;

use crate::check::{Check, TestState};

#[derive(Debug, thiserror::Error)]
pub enum TestError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ParseError),

    #[error("dependency cycle involving {0}")]
    Cycle(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("apply failed: {}", .0.join("; "))]
    Apply(Vec<String>),

    #[error("expected an error matching '{0}', but apply succeeded")]
    ExpectedError(String),

    #[error("check failed:\n{}", .0.join("\n"))]
    Check(Vec<String>),

    #[error("after applying this step, the plan was not empty:\n{}", .0.join("\n"))]
    PlanNotEmpty(Vec<String>),

    #[error("import of {address} failed: {message}")]
    Import { address: String, message: String },

    #[error("imported state of {address} does not match:\n{}", .diffs.join("\n"))]
    ImportMismatch { address: String, diffs: Vec<String> },

    #[error("destroy failed: {}", .0.join("; "))]
    Destroy(Vec<String>),

    #[error("resources still exist after destroy: {}", .0.join(", "))]
    NotDestroyed(Vec<String>),

    #[error("step {index}: {source}")]
    Step {
        index: usize,
        #[source]
        source: Box<TestError>,
    },
}

pub struct ApplyStep {
    pub config: String,
    pub checks: Vec<Check>,
    /// Substring of the error the apply must fail with
    pub expect_error: Option<String>,
}

impl ApplyStep {
    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn checks(mut self, checks: impl IntoIterator<Item = Check>) -> Self {
        self.checks.extend(checks);
        self
    }

    pub fn expect_error(mut self, message: impl Into<String>) -> Self {
        self.expect_error = Some(message.into());
        self
    }
}

pub struct ImportStep {
    pub address: String,
    /// Attributes the read API cannot return, compared by top-level name
    pub ignore: Vec<String>,
}

impl ImportStep {
    pub fn ignore(mut self, keys: &[&str]) -> Self {
        self.ignore.extend(keys.iter().map(|k| k.to_string()));
        self
    }
}

pub enum TestStep {
    Apply(ApplyStep),
    Import(ImportStep),
}

impl TestStep {
    pub fn apply(config: impl Into<String>) -> ApplyStep {
        ApplyStep {
            config: config.into(),
            checks: Vec::new(),
            expect_error: None,
        }
    }

    pub fn import(address: impl Into<String>) -> ImportStep {
        ImportStep {
            address: address.into(),
            ignore: Vec::new(),
        }
    }
}

impl From<ApplyStep> for TestStep {
    fn from(step: ApplyStep) -> Self {
        TestStep::Apply(step)
    }
}

impl From<ImportStep> for TestStep {
    fn from(step: ImportStep) -> Self {
        TestStep::Import(step)
    }
}

pub struct TestCase {
    pub steps: Vec<TestStep>,
    /// Read every destroyed resource back and fail if it still exists
    pub check_destroy: bool,
}

impl TestCase {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            check_destroy: true,
        }
    }

    pub fn step(mut self, step: impl Into<TestStep>) -> Self {
        self.steps.push(step.into());
        self
    }

    pub fn without_destroy_check(mut self) -> Self {
        self.check_destroy = false;
        self
    }
}

impl Default for TestCase {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Runner<P: Provider> {
    interpreter: Interpreter<P>,
    schemas: HashMap<String, ResourceSchema>,
    state: TestState,
}

impl<P: Provider> Runner<P> {
    pub fn new(provider: P) -> Self {
        let schemas = provider
            .resource_types()
            .into_iter()
            .filter(|t| !t.is_data_source())
            .map(|t| (t.name().to_string(), t.schema()))
            .collect();
        Self {
            interpreter: Interpreter::new(provider),
            schemas,
            state: TestState::default(),
        }
    }

    pub fn state(&self) -> &TestState {
        &self.state
    }

    fn provider(&self) -> &P {
        self.interpreter.provider()
    }

    /// Run every step, then destroy what the steps created
    pub async fn run(&mut self, case: &TestCase) -> Result<(), TestError> {
        let mut result = Ok(());
        for (i, step) in case.steps.iter().enumerate() {
            log::info!("Running test step {}", i + 1);
            let outcome = match step {
                TestStep::Apply(step) => self.apply_step(step).await,
                TestStep::Import(step) => self.import_step(step).await,
            };
            if let Err(source) = outcome {
                result = Err(TestError::Step {
                    index: i + 1,
                    source: Box::new(source),
                });
                break;
            }
        }

        let destroyed = self.destroy().await;
        result?;
        let destroyed = destroyed?;
        if case.check_destroy {
            self.check_destroy(&destroyed).await?;
        }
        Ok(())
    }

    async fn apply_step(&mut self, step: &ApplyStep) -> Result<(), TestError> {
        let config = parser::parse(&step.config)?;
        self.refresh().await?;

        let plan = self.plan(&config)?;
        log::debug!("Plan: {} change(s)", plan.mutation_count());
        let mut bindings = self.bindings(&config);
        let result = self.interpreter.apply(&plan, &mut bindings).await;
        let failures = self.record(&result);

        match (&step.expect_error, failures.is_empty()) {
            (Some(expected), true) => return Err(TestError::ExpectedError(expected.clone())),
            (Some(expected), false) => {
                if failures.iter().any(|f| f.contains(expected.as_str())) {
                    return Ok(());
                }
                return Err(TestError::Apply(failures));
            }
            (None, false) => return Err(TestError::Apply(failures)),
            (None, true) => {}
        }

        let failed: Vec<String> = step
            .checks
            .iter()
            .filter_map(|c| c.verify(&self.state).err())
            .collect();
        if !failed.is_empty() {
            return Err(TestError::Check(failed));
        }

        self.refresh().await?;
        let pending: Vec<String> = self
            .plan(&config)?
            .effects()
            .iter()
            .filter(|e| e.is_mutating())
            .map(format_effect_brief)
            .collect();
        if !pending.is_empty() {
            return Err(TestError::PlanNotEmpty(pending));
        }
        Ok(())
    }

    async fn import_step(&mut self, step: &ImportStep) -> Result<(), TestError> {
        let import_error = |message: String| TestError::Import {
            address: step.address.clone(),
            message,
        };
        let id = ResourceId::parse(&step.address)
            .ok_or_else(|| import_error("not a managed resource address".to_string()))?;
        let current = self
            .state
            .managed
            .get(&id)
            .ok_or_else(|| import_error("resource is not in state".to_string()))?;
        let identifier = current
            .identifier
            .as_deref()
            .ok_or_else(|| import_error("no ID recorded in state".to_string()))?;

        // An import only knows the ID and the region it lives in
        let mut known = HashMap::new();
        if let Some(region) = current.attributes.get("region") {
            known.insert("region".to_string(), region.clone());
        }
        let imported = self
            .provider()
            .import(&id, identifier, &known)
            .await
            .map_err(|e| import_error(e.to_string()))?;

        let diffs = attribute_diffs(&current.attributes, &imported.attributes, &step.ignore);
        if diffs.is_empty() {
            Ok(())
        } else {
            Err(TestError::ImportMismatch {
                address: step.address.clone(),
                diffs,
            })
        }
    }

    /// Re-read every managed resource, dropping the ones that vanished
    async fn refresh(&mut self) -> Result<(), TestError> {
        for id in self.state.order.clone() {
            let Some(current) = self.state.managed.get(&id) else {
                continue;
            };
            let mut state = self
                .provider()
                .read(&id, current.identifier.as_deref(), &current.attributes)
                .await?;
            // Keep the ID for references while the remote object exists
            if state.exists
                && state.identifier.is_none()
                && let Some(identifier) = current.identifier.clone()
            {
                state = state.with_identifier(identifier);
            }
            state.tainted = current.tainted && state.exists;
            self.state.record(state);
        }
        Ok(())
    }

    fn plan(&self, config: &ParsedConfig) -> Result<Plan, TestError> {
        let sorted = sort_by_dependencies(&config.resources).map_err(TestError::Cycle)?;
        Ok(create_plan(
            &sorted,
            &self.state.managed,
            &self.state.order,
            &self.schemas,
        ))
    }

    fn bindings(&self, config: &ParsedConfig) -> Bindings {
        let mut bindings = Bindings::new();
        for resource in config.managed() {
            bindings.insert(resource, self.state.managed.get(&resource.id));
        }
        bindings
    }

    /// Fold apply outcomes into the state; returns the error messages
    fn record(&mut self, result: &ApplyResult) -> Vec<String> {
        let mut failures = Vec::new();
        for (id, outcome) in &result.outcomes {
            match outcome {
                Ok(EffectOutcome::Read { state }) => {
                    self.state.data.insert(format!("data.{}", id), state.clone());
                }
                Ok(EffectOutcome::Deleted { id }) => self.state.remove(id),
                Ok(outcome) => {
                    if let Some(state) = outcome.state() {
                        self.state.record(state.clone());
                    }
                }
                Err(e) => {
                    if let Some(state) = e.partial_state() {
                        self.state.record(state.clone());
                    }
                    failures.push(e.to_string());
                }
            }
        }
        failures
    }

    /// Delete every managed resource; returns the states that were deleted
    async fn destroy(&mut self) -> Result<Vec<State>, TestError> {
        let targets: Vec<State> = self
            .state
            .order
            .iter()
            .filter_map(|id| self.state.managed.get(id))
            .filter(|s| s.exists)
            .cloned()
            .collect();
        let plan = destroy_plan(&self.state.order, &self.state.managed);
        let result = self.interpreter.apply(&plan, &mut Bindings::new()).await;
        let failures = self.record(&result);
        self.state.data.clear();
        if !failures.is_empty() {
            return Err(TestError::Destroy(failures));
        }
        Ok(targets)
    }

    async fn check_destroy(&self, destroyed: &[State]) -> Result<(), TestError> {
        let mut remaining = Vec::new();
        for state in destroyed {
            let current = self
                .provider()
                .read(&state.id, state.identifier.as_deref(), &state.attributes)
                .await?;
            if current.exists {
                remaining.push(state.id.to_string());
            }
        }
        if remaining.is_empty() {
            Ok(())
        } else {
            Err(TestError::NotDestroyed(remaining))
        }
    }
}

/// Run a test case against a fresh runner
pub async fn run<P: Provider>(provider: P, case: TestCase) -> Result<(), TestError> {
    Runner::new(provider).run(&case).await
}

fn attribute_diffs(
    expected: &HashMap<String, Value>,
    actual: &HashMap<String, Value>,
    ignore: &[String],
) -> Vec<String> {
    let ignored = |key: &str| {
        ignore
            .iter()
            .any(|i| i == key || i.split('.').next() == Some(key))
    };
    let keys: HashSet<&String> = expected.keys().chain(actual.keys()).collect();
    let mut keys: Vec<&String> = keys.into_iter().filter(|k| !ignored(k)).collect();
    keys.sort();

    keys.into_iter()
        .filter_map(|key| match (expected.get(key), actual.get(key)) {
            (Some(e), Some(a)) if e == a => None,
            (e, a) => Some(format!(
                "  {}: {} => {}",
                key,
                e.map(Value::to_string).unwrap_or_else(|| "(none)".to_string()),
                a.map(Value::to_string).unwrap_or_else(|| "(none)".to_string()),
            )),
        })
        .collect()
}
