//! Interpreter - Execute Effects using a Provider
//!
//! The Interpreter executes Effects contained in a Plan in order,
//! collecting the results. This is where side effects actually occur.
//! References are resolved right before each call, so a resource can use
//! the identifier of one created earlier in the same run.

use crate::binding::Bindings;
use crate::effect::Effect;
use crate::plan::Plan;
use crate::provider::{Provider, ProviderError, ProviderResult};
use crate::resource::{Resource, ResourceId, State};

/// Result of executing each Effect
#[derive(Debug)]
pub enum EffectOutcome {
    /// Data source read succeeded
    Read { state: State },
    /// Create succeeded
    Created { state: State },
    /// Update succeeded
    Updated { state: State },
    /// Old object deleted and new one created
    Replaced { state: State },
    /// Delete succeeded
    Deleted { id: ResourceId },
    /// Skipped (e.g., dry-run)
    Skipped { reason: String },
}

impl EffectOutcome {
    /// State to persist for the affected resource, if any
    pub fn state(&self) -> Option<&State> {
        match self {
            EffectOutcome::Created { state }
            | EffectOutcome::Updated { state }
            | EffectOutcome::Replaced { state } => Some(state),
            _ => None,
        }
    }
}

/// Result of executing the entire Plan
#[derive(Debug)]
pub struct ApplyResult {
    /// One entry per executed effect, in plan order
    pub outcomes: Vec<(ResourceId, Result<EffectOutcome, ProviderError>)>,
    pub success_count: usize,
    pub failure_count: usize,
}

impl ApplyResult {
    pub fn is_success(&self) -> bool {
        self.failure_count == 0
    }

    /// First error, if any
    pub fn first_error(&self) -> Option<&ProviderError> {
        self.outcomes.iter().find_map(|(_, r)| r.as_ref().err())
    }
}

/// Interpreter configuration
#[derive(Debug, Clone, Default)]
pub struct InterpreterConfig {
    /// If true, skip actual side effects
    pub dry_run: bool,
    /// Continue on error
    pub continue_on_error: bool,
}

/// Interpreter that executes Effects using a Provider
pub struct Interpreter<P: Provider> {
    provider: P,
    config: InterpreterConfig,
}

impl<P: Provider> Interpreter<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            config: InterpreterConfig::default(),
        }
    }

    pub fn with_config(mut self, config: InterpreterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Execute a Plan, interpreting all Effects and causing side effects
    pub async fn apply(&self, plan: &Plan, bindings: &mut Bindings) -> ApplyResult {
        let mut outcomes = Vec::new();
        let mut success_count = 0;
        let mut failure_count = 0;

        for effect in plan.effects() {
            let result = self.execute_effect(effect, bindings).await;
            let failed = result.is_err();

            match &result {
                Ok(_) => success_count += 1,
                Err(e) => {
                    log::warn!("{} {} failed: {}", effect.kind(), effect.resource_id(), e);
                    failure_count += 1;
                }
            }
            outcomes.push((effect.resource_id().clone(), result));

            if failed && !self.config.continue_on_error {
                break;
            }
        }

        ApplyResult {
            outcomes,
            success_count,
            failure_count,
        }
    }

    /// Execute a single Effect
    async fn execute_effect(
        &self,
        effect: &Effect,
        bindings: &mut Bindings,
    ) -> ProviderResult<EffectOutcome> {
        if self.config.dry_run {
            return Ok(EffectOutcome::Skipped {
                reason: "dry-run mode".to_string(),
            });
        }

        log::info!("{} {}", effect.kind(), effect.resource_id());

        match effect {
            Effect::Read(resource) => {
                let resolved = resolve(resource, bindings)?;
                let state = self.provider.read_data_source(&resolved).await?;
                bindings.insert(&resolved, Some(&state));
                Ok(EffectOutcome::Read { state })
            }
            Effect::Create(resource) => {
                let resolved = resolve(resource, bindings)?;
                let state = self.provider.create(&resolved).await?;
                bindings.insert(&resolved, Some(&state));
                Ok(EffectOutcome::Created { state })
            }
            Effect::Update { id, from, to, .. } => {
                let resolved = resolve(to, bindings)?;
                let identifier = identifier_of(id, from)?;
                let state = self.provider.update(id, identifier, from, &resolved).await?;
                bindings.insert(&resolved, Some(&state));
                Ok(EffectOutcome::Updated { state })
            }
            Effect::Replace { id, from, to, .. } => {
                let resolved = resolve(to, bindings)?;
                let identifier = identifier_of(id, from)?;
                self.provider.delete(id, identifier, &from.attributes).await?;
                let state = self.provider.create(&resolved).await?;
                bindings.insert(&resolved, Some(&state));
                Ok(EffectOutcome::Replaced { state })
            }
            Effect::Delete {
                id,
                identifier,
                attributes,
            } => {
                self.provider.delete(id, identifier, attributes).await?;
                Ok(EffectOutcome::Deleted { id: id.clone() })
            }
        }
    }
}

fn resolve(resource: &Resource, bindings: &Bindings) -> ProviderResult<Resource> {
    let resolved = bindings.resolve(resource);
    let mut unresolved: Vec<String> = resolved
        .attributes
        .iter()
        .filter(|(_, v)| v.has_refs())
        .map(|(k, _)| k.clone())
        .collect();
    if unresolved.is_empty() {
        return Ok(resolved);
    }
    unresolved.sort();
    Err(ProviderError::validation(format!(
        "unresolved references in: {}",
        unresolved.join(", ")
    ))
    .for_resource(resource.id.clone()))
}

fn identifier_of<'a>(id: &ResourceId, state: &'a State) -> ProviderResult<&'a str> {
    state.identifier.as_deref().ok_or_else(|| {
        ProviderError::new("no identifier recorded in state").for_resource(id.clone())
    })
}
