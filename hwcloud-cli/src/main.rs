use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;

use hwcloud_core::binding::{Bindings, sort_by_dependencies};
use hwcloud_core::differ::{create_plan, destroy_plan};
use hwcloud_core::effect::Effect;
use hwcloud_core::interpreter::{ApplyResult, EffectOutcome, Interpreter};
use hwcloud_core::parser::{self, ParsedConfig};
use hwcloud_core::plan::Plan;
use hwcloud_core::provider::{Provider, ResourceType};
use hwcloud_core::resource::{Resource, ResourceId, State, Value};
use hwcloud_core::schema::ResourceSchema;
use hwcloud_provider::{Config, HuaweiCloudProvider, resources};
use hwcloud_state::{LocalBackend, LockInfo, StateBackend, StateFile};

#[derive(Parser)]
#[command(name = "hwcloud")]
#[command(about = "Manage HuaweiCloud resources from Terraform JSON configuration", long_about = None)]
struct Cli {
    /// Path to the state file
    #[arg(long, global = true, default_value = LocalBackend::DEFAULT_STATE_FILE)]
    state: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration file
    Validate {
        /// Path to .tf.json file
        #[arg(default_value = "main.tf.json")]
        file: PathBuf,
    },
    /// Show execution plan without applying changes
    Plan {
        /// Path to .tf.json file
        #[arg(default_value = "main.tf.json")]
        file: PathBuf,
    },
    /// Apply changes to reach the desired state
    Apply {
        /// Path to .tf.json file
        #[arg(default_value = "main.tf.json")]
        file: PathBuf,

        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Destroy every resource recorded in the state
    Destroy {
        /// Path to .tf.json file holding the provider block
        #[arg(default_value = "main.tf.json")]
        file: PathBuf,

        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Bring an existing cloud object under management
    Import {
        /// Resource address, e.g. huaweicloud_vpc.main
        address: String,
        /// Cloud ID of the object
        id: String,
        /// Path to .tf.json file
        #[arg(default_value = "main.tf.json")]
        file: PathBuf,
    },
    /// List resource types, or show the attributes of one
    Schema {
        resource_type: Option<String>,

        /// Show the data source instead of the managed resource
        #[arg(long)]
        data_source: bool,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::new().filter_or("HWCLOUD_LOG", "warn")).init();

    let cli = Cli::parse();
    let backend = LocalBackend::with_path(&cli.state);

    let result = match cli.command {
        Commands::Validate { file } => run_validate(&file),
        Commands::Plan { file } => run_plan(&file, &backend).await,
        Commands::Apply { file, auto_approve } => run_apply(&file, &backend, auto_approve).await,
        Commands::Destroy { file, auto_approve } => {
            run_destroy(&file, &backend, auto_approve).await
        }
        Commands::Import { address, id, file } => run_import(&file, &backend, &address, &id).await,
        Commands::Schema {
            resource_type,
            data_source,
        } => run_schema(resource_type.as_deref(), data_source),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Schemas keyed by type name, managed resources and data sources apart
struct Schemas {
    managed: HashMap<String, ResourceSchema>,
    data_sources: HashMap<String, ResourceSchema>,
}

impl Schemas {
    fn load() -> Self {
        let mut managed = HashMap::new();
        let mut data_sources = HashMap::new();
        for resource_type in resources::resource_types() {
            let target = if resource_type.is_data_source() {
                &mut data_sources
            } else {
                &mut managed
            };
            target.insert(resource_type.name().to_string(), resource_type.schema());
        }
        Self {
            managed,
            data_sources,
        }
    }

    fn get(&self, resource: &Resource) -> Option<&ResourceSchema> {
        if resource.is_data_source() {
            self.data_sources.get(&resource.id.resource_type)
        } else {
            self.managed.get(&resource.id.resource_type)
        }
    }
}

fn load_config(file: &Path) -> Result<ParsedConfig, String> {
    let content = fs::read_to_string(file)
        .map_err(|e| format!("Failed to read {}: {}", file.display(), e))?;
    parser::parse(&content).map_err(|e| format!("Parse error: {}", e))
}

fn validate_resources(resources: &[Resource], schemas: &Schemas) -> Result<(), String> {
    let mut all_errors = Vec::new();

    for resource in resources {
        let kind = if resource.is_data_source() {
            "data source"
        } else {
            "resource type"
        };
        let Some(schema) = schemas.get(resource) else {
            all_errors.push(format!(
                "{}: Unknown {} '{}'",
                resource.binding(),
                kind,
                resource.id.resource_type
            ));
            continue;
        };
        if let Err(errors) = schema.validate(&resource.attributes) {
            for error in errors {
                all_errors.push(format!("{}: {}", resource.binding(), error));
            }
        }
    }

    if let Err(binding) = sort_by_dependencies(resources) {
        all_errors.push(format!("{}: dependency cycle", binding));
    }

    if all_errors.is_empty() {
        Ok(())
    } else {
        Err(format!("Validation failed:\n  {}", all_errors.join("\n  ")))
    }
}

fn build_provider(parsed: &ParsedConfig) -> Result<HuaweiCloudProvider, String> {
    let mut config = Config::from_env();
    config
        .apply_provider_block(&parsed.provider)
        .map_err(|e| format!("Invalid provider configuration: {}", e))?;
    HuaweiCloudProvider::new(config).map_err(|e| format!("Invalid provider configuration: {}", e))
}

/// Configured attributes that are already known, without references
fn plain_attributes(resource: &Resource) -> HashMap<String, Value> {
    resource
        .attributes
        .iter()
        .filter(|(k, v)| !k.starts_with('_') && !v.has_refs())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Attributes handed to a read: configuration first, stored state on top
fn known_attributes(config: Option<&Resource>, state: &State) -> HashMap<String, Value> {
    let mut known = config.map(plain_attributes).unwrap_or_default();
    for (k, v) in &state.attributes {
        known.insert(k.clone(), v.clone());
    }
    known
}

/// Re-read every resource recorded in the state
async fn refresh(
    provider: &impl Provider,
    state_file: &StateFile,
    parsed: &ParsedConfig,
) -> Result<HashMap<ResourceId, State>, String> {
    let mut current = HashMap::new();
    for (id, stored) in state_file.current_states() {
        let known = known_attributes(parsed.find(&id), &stored);
        let mut state = provider
            .read(&id, stored.identifier.as_deref(), &known)
            .await
            .map_err(|e| format!("Failed to read state: {}", e))?;
        if state.exists
            && state.identifier.is_none()
            && let Some(identifier) = stored.identifier.clone()
        {
            state = state.with_identifier(identifier);
        }
        if !state.exists {
            log::info!("{} no longer exists", id);
        }
        state.tainted = stored.tainted && state.exists;
        current.insert(id, state);
    }
    Ok(current)
}

fn build_plan(
    parsed: &ParsedConfig,
    current: &HashMap<ResourceId, State>,
    state_file: &StateFile,
    schemas: &Schemas,
) -> Result<(Vec<Resource>, Plan), String> {
    let sorted = sort_by_dependencies(&parsed.resources)
        .map_err(|binding| format!("Dependency cycle involving {}", binding))?;
    let plan = create_plan(
        &sorted,
        current,
        &state_file.creation_order(),
        &schemas.managed,
    );
    Ok((sorted, plan))
}

async fn read_state(backend: &LocalBackend) -> Result<StateFile, String> {
    backend
        .read_state()
        .await
        .map(Option::unwrap_or_default)
        .map_err(|e| format!("Failed to read state: {}", e))
}

async fn write_state(backend: &LocalBackend, state_file: &mut StateFile) -> Result<(), String> {
    state_file.increment_serial();
    backend
        .write_state(state_file)
        .await
        .map_err(|e| format!("Failed to write state: {}", e))
}

async fn lock(backend: &LocalBackend, operation: &str) -> Result<LockInfo, String> {
    backend
        .acquire_lock(operation)
        .await
        .map_err(|e| format!("Failed to acquire state lock: {}", e))
}

async fn unlock(backend: &LocalBackend, lock: &LockInfo) {
    if let Err(e) = backend.release_lock(lock).await {
        eprintln!(
            "{} failed to release state lock {}: {}",
            "Warning:".yellow().bold(),
            lock.id,
            e
        );
    }
}

fn run_validate(file: &Path) -> Result<(), String> {
    let parsed = load_config(file)?;

    println!("{}", "Validating...".cyan());

    validate_resources(&parsed.resources, &Schemas::load())?;
    let mut config = Config::from_env();
    config
        .apply_provider_block(&parsed.provider)
        .map_err(|e| format!("Invalid provider configuration: {}", e))?;

    println!(
        "{}",
        format!(
            "✓ {} resources validated successfully.",
            parsed.resources.len()
        )
        .green()
        .bold()
    );

    for resource in &parsed.resources {
        println!("  • {}", resource.binding());
    }

    Ok(())
}

async fn run_plan(file: &Path, backend: &LocalBackend) -> Result<(), String> {
    let parsed = load_config(file)?;
    let schemas = Schemas::load();
    validate_resources(&parsed.resources, &schemas)?;

    let provider = build_provider(&parsed)?;
    let state_file = read_state(backend).await?;
    let current = refresh(&provider, &state_file, &parsed).await?;
    let (_, plan) = build_plan(&parsed, &current, &state_file, &schemas)?;

    print_plan(&plan, &schemas);
    Ok(())
}

async fn run_apply(file: &Path, backend: &LocalBackend, auto_approve: bool) -> Result<(), String> {
    let parsed = load_config(file)?;
    let schemas = Schemas::load();
    validate_resources(&parsed.resources, &schemas)?;
    let provider = build_provider(&parsed)?;

    let lock = lock(backend, "apply").await?;
    let result = apply_locked(&parsed, &schemas, provider, backend, auto_approve).await;
    unlock(backend, &lock).await;
    result
}

async fn apply_locked(
    parsed: &ParsedConfig,
    schemas: &Schemas,
    provider: HuaweiCloudProvider,
    backend: &LocalBackend,
    auto_approve: bool,
) -> Result<(), String> {
    let mut state_file = read_state(backend).await?;
    let current = refresh(&provider, &state_file, parsed).await?;
    // Resources deleted outside of hwcloud drop out of the state
    for state in current.values() {
        state_file.record(state);
    }

    let (sorted, plan) = build_plan(parsed, &current, &state_file, schemas)?;
    if !plan.has_mutations() {
        println!("{}", "No changes. Infrastructure is up-to-date.".green());
        return write_state(backend, &mut state_file).await;
    }

    print_plan(&plan, schemas);
    println!();

    if !auto_approve && !confirm("Do you want to perform these actions?")? {
        println!("{}", "Apply cancelled.".yellow());
        return Ok(());
    }

    println!("{}", "Applying changes...".cyan().bold());
    println!();

    let mut bindings = Bindings::new();
    for resource in sorted.iter().filter(|r| !r.is_data_source()) {
        bindings.insert(resource, current.get(&resource.id));
    }

    let interpreter = Interpreter::new(provider);
    let result = interpreter.apply(&plan, &mut bindings).await;
    record_outcomes(&result, &mut state_file);
    write_state(backend, &mut state_file).await?;

    print_outcomes(&result);
    println!();
    if result.is_success() {
        println!(
            "{}",
            format!(
                "Apply complete! {} changes applied.",
                plan_changes(&result)
            )
            .green()
            .bold()
        );
        Ok(())
    } else {
        Err(format!(
            "Apply failed. {} succeeded, {} failed.",
            result.success_count, result.failure_count
        ))
    }
}

async fn run_destroy(file: &Path, backend: &LocalBackend, auto_approve: bool) -> Result<(), String> {
    // The configuration only contributes the provider block here
    let parsed = if file.exists() {
        load_config(file)?
    } else {
        ParsedConfig::default()
    };
    let provider = build_provider(&parsed)?;

    let lock = lock(backend, "destroy").await?;
    let result = destroy_locked(&parsed, provider, backend, auto_approve).await;
    unlock(backend, &lock).await;
    result
}

async fn destroy_locked(
    parsed: &ParsedConfig,
    provider: HuaweiCloudProvider,
    backend: &LocalBackend,
    auto_approve: bool,
) -> Result<(), String> {
    let mut state_file = read_state(backend).await?;
    let current = refresh(&provider, &state_file, parsed).await?;
    for state in current.values() {
        state_file.record(state);
    }

    let plan = destroy_plan(&state_file.creation_order(), &current);
    if plan.is_empty() {
        println!("{}", "No resources to destroy.".green());
        return write_state(backend, &mut state_file).await;
    }

    println!("{}", "Destroy Plan:".red().bold());
    println!();
    for effect in plan.effects() {
        println!("  {} {}", "-".red().bold(), effect.resource_id());
    }
    println!();
    println!(
        "Plan: {} to destroy.",
        plan.effects().len().to_string().red()
    );
    println!();

    if !auto_approve && !confirm("Do you really want to destroy all resources?")? {
        println!("{}", "Destroy cancelled.".yellow());
        return Ok(());
    }

    println!("{}", "Destroying resources...".red().bold());
    println!();

    let interpreter = Interpreter::new(provider);
    let result = interpreter.apply(&plan, &mut Bindings::new()).await;
    record_outcomes(&result, &mut state_file);
    write_state(backend, &mut state_file).await?;

    print_outcomes(&result);
    println!();
    if result.is_success() {
        println!(
            "{}",
            format!("Destroy complete! {} resources destroyed.", result.success_count)
                .green()
                .bold()
        );
        Ok(())
    } else {
        Err(format!(
            "Destroy failed. {} succeeded, {} failed.",
            result.success_count, result.failure_count
        ))
    }
}

async fn run_import(
    file: &Path,
    backend: &LocalBackend,
    address: &str,
    identifier: &str,
) -> Result<(), String> {
    let id = ResourceId::parse(address)
        .ok_or_else(|| format!("Invalid resource address '{}'", address))?;
    let parsed = load_config(file)?;
    let resource = parsed.find(&id).ok_or_else(|| {
        format!(
            "Resource {} is not defined in {}; add it before importing",
            id,
            file.display()
        )
    })?;
    let provider = build_provider(&parsed)?;

    let lock = lock(backend, "import").await?;
    let result = import_locked(&provider, backend, &id, identifier, resource).await;
    unlock(backend, &lock).await;
    result
}

async fn import_locked(
    provider: &HuaweiCloudProvider,
    backend: &LocalBackend,
    id: &ResourceId,
    identifier: &str,
    resource: &Resource,
) -> Result<(), String> {
    let mut state_file = read_state(backend).await?;
    if state_file.find(id).is_some() {
        return Err(format!("Resource {} is already managed in the state", id));
    }

    println!("{} {} ({})", "Importing".cyan(), id, identifier);
    let state = provider
        .import(id, identifier, &plain_attributes(resource))
        .await
        .map_err(|e| format!("Import failed: {}", e))?;
    state_file.record(&state);
    write_state(backend, &mut state_file).await?;

    println!("{}", "Import successful!".green().bold());
    Ok(())
}

fn run_schema(resource_type: Option<&str>, data_source: bool) -> Result<(), String> {
    let types = resources::resource_types();
    let Some(resource_type) = resource_type else {
        println!("{}", "Resources:".cyan().bold());
        for t in types.iter().filter(|t| !t.is_data_source()) {
            println!("  {}", t.name());
        }
        println!("{}", "Data sources:".cyan().bold());
        for t in types.iter().filter(|t| t.is_data_source()) {
            println!("  {}", t.name());
        }
        return Ok(());
    };

    let schema = types
        .iter()
        .find(|t| t.name() == resource_type && t.is_data_source() == data_source)
        .map(|t| t.schema())
        .ok_or_else(|| format!("Unknown resource type '{}'", resource_type))?;

    println!("{}", schema.resource_type.cyan().bold());
    if let Some(ref description) = schema.description {
        println!("  {}", description);
    }
    println!();

    let mut attributes: Vec<_> = schema.attributes.values().collect();
    attributes.sort_by(|a, b| (!a.required, &a.name).cmp(&(!b.required, &b.name)));
    for attr in attributes {
        let mut flags = Vec::new();
        if attr.required {
            flags.push("required");
        } else if attr.optional && attr.computed {
            flags.push("optional, computed");
        } else if attr.computed {
            flags.push("computed");
        } else {
            flags.push("optional");
        }
        if attr.force_new {
            flags.push("forces new resource");
        }
        if attr.sensitive {
            flags.push("sensitive");
        }
        println!(
            "  {}: {} ({})",
            attr.name.bold(),
            attr.attr_type,
            flags.join(", ")
        );
        if let Some(ref description) = attr.description {
            println!("      {}", description.dimmed());
        }
    }
    Ok(())
}

fn confirm(question: &str) -> Result<bool, String> {
    println!("{}", question.yellow().bold());
    println!("  {}", "Only 'yes' will be accepted to approve.".yellow());
    print!("\n  Enter a value: ");
    std::io::Write::flush(&mut std::io::stdout()).map_err(|e| e.to_string())?;

    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .map_err(|e| e.to_string())?;
    println!();
    Ok(input.trim() == "yes")
}

fn record_outcomes(result: &ApplyResult, state_file: &mut StateFile) {
    for (_, outcome) in &result.outcomes {
        match outcome {
            Ok(EffectOutcome::Deleted { id }) => {
                state_file.remove(id);
            }
            Ok(EffectOutcome::Read { .. }) => {}
            Ok(outcome) => {
                if let Some(state) = outcome.state() {
                    state_file.record(state);
                }
            }
            Err(e) => {
                if let Some(state) = e.partial_state() {
                    log::warn!("{} was created but did not finish; marked as tainted", state.id);
                    state_file.record(state);
                }
            }
        }
    }
}

/// Number of successful outcomes that changed something
fn plan_changes(result: &ApplyResult) -> usize {
    result
        .outcomes
        .iter()
        .filter(|(_, o)| matches!(o, Ok(outcome) if !matches!(outcome, EffectOutcome::Read { .. })))
        .count()
}

fn print_outcomes(result: &ApplyResult) {
    for (id, outcome) in &result.outcomes {
        match outcome {
            Ok(EffectOutcome::Read { .. }) => {
                println!("  {} Read data.{}", "✓".green(), id)
            }
            Ok(outcome) => println!("  {} {} {}", "✓".green(), outcome_verb(outcome), id),
            Err(e) => println!("  {} {} - {}", "✗".red(), id, e),
        }
    }
}

fn outcome_verb(outcome: &EffectOutcome) -> &'static str {
    match outcome {
        EffectOutcome::Read { .. } => "Read",
        EffectOutcome::Created { .. } => "Create",
        EffectOutcome::Updated { .. } => "Update",
        EffectOutcome::Replaced { .. } => "Replace",
        EffectOutcome::Deleted { .. } => "Delete",
        EffectOutcome::Skipped { .. } => "Skip",
    }
}

fn print_plan(plan: &Plan, schemas: &Schemas) {
    if !plan.has_mutations() {
        println!("{}", "No changes. Infrastructure is up-to-date.".green());
        return;
    }

    println!("{}", "Execution Plan:".cyan().bold());
    println!();

    for effect in plan.effects() {
        match effect {
            Effect::Read(r) => {
                println!("  {} {}", "<=".cyan().bold(), r.binding().cyan());
            }
            Effect::Create(r) => {
                println!("  {} {}", "+".green().bold(), r.id.to_string().cyan().bold());
                let schema = schemas.managed.get(&r.id.resource_type);
                for key in sorted_keys(r.attributes.keys()) {
                    let value = format_attribute(schema, key, &r.attributes[key]);
                    println!("      {}: {}", key, value.green());
                }
            }
            Effect::Update {
                id,
                from,
                to,
                changed_attributes,
            }
            | Effect::Replace {
                id,
                from,
                to,
                changed_attributes,
            } => {
                let replace = matches!(effect, Effect::Replace { .. });
                let symbol = if replace {
                    "-/+".red().bold()
                } else {
                    "~".yellow().bold()
                };
                if from.tainted {
                    println!("  {} {} {}", symbol, id.to_string().cyan().bold(), "(tainted)".red());
                } else {
                    println!("  {} {}", symbol, id.to_string().cyan().bold());
                }
                let schema = schemas.managed.get(&id.resource_type);
                for key in sorted_keys(changed_attributes.iter()) {
                    let old = from
                        .attributes
                        .get(key)
                        .map(|v| format_attribute(schema, key, v))
                        .unwrap_or_else(|| "(none)".to_string());
                    let new = to
                        .attributes
                        .get(key)
                        .map(|v| format_attribute(schema, key, v))
                        .unwrap_or_else(|| "(none)".to_string());
                    let forces = replace
                        && schema.is_some_and(|s| s.attributes.get(key).is_some_and(|a| a.force_new));
                    println!(
                        "      {}: {} → {}{}",
                        key,
                        old.red(),
                        new.green(),
                        if forces { " (forces replacement)".red().to_string() } else { String::new() }
                    );
                }
            }
            Effect::Delete { id, identifier, .. } => {
                println!(
                    "  {} {} ({})",
                    "-".red().bold(),
                    id.to_string().cyan().bold(),
                    identifier
                );
            }
        }
    }

    println!();
    let summary = plan.summary();
    println!(
        "Plan: {} to add, {} to change, {} to destroy.",
        (summary.create + summary.replace).to_string().green(),
        summary.update.to_string().yellow(),
        (summary.delete + summary.replace).to_string().red()
    );
}

/// Attribute names for display: `name` first, bookkeeping keys hidden
fn sorted_keys<'a>(keys: impl Iterator<Item = &'a String>) -> Vec<&'a String> {
    let mut keys: Vec<&String> = keys.filter(|k| !k.starts_with('_')).collect();
    keys.sort_by(|a, b| match (a.as_str(), b.as_str()) {
        ("name", _) => std::cmp::Ordering::Less,
        (_, "name") => std::cmp::Ordering::Greater,
        _ => a.cmp(b),
    });
    keys
}

fn format_attribute(schema: Option<&ResourceSchema>, key: &str, value: &Value) -> String {
    if schema.is_some_and(|s| s.is_sensitive(key)) {
        return "(sensitive)".to_string();
    }
    format_value(value)
}

fn format_value(value: &Value) -> String {
    match value {
        Value::ResourceRef(binding, attr) => format!("(known after apply: {}.{})", binding, attr),
        other => other.to_string(),
    }
}
