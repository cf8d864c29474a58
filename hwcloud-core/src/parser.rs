//! Parser - Load Terraform JSON configuration (`*.tf.json`)
//!
//! Supports `provider`, `resource`, `data` and `variable` blocks. String
//! values of the form `${type.name.attr}` or `${data.type.name.attr}` become
//! references; `${var.name}` is substituted at parse time.

use std::collections::HashMap;
use std::env;

use serde_json::{Map, Value as Json};

use crate::resource::{Resource, ResourceId, Value};

/// Parse error
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid structure at '{path}': {message}")]
    InvalidStructure { path: String, message: String },

    #[error("Invalid reference '{0}'")]
    InvalidReference(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Undefined variable: {0}")]
    UndefinedVariable(String),

    #[error("Duplicate definition: {0}")]
    Duplicate(String),
}

/// Parsed configuration file
#[derive(Debug, Clone, Default)]
pub struct ParsedConfig {
    /// Arguments of the `provider.huaweicloud` block
    pub provider: HashMap<String, Value>,
    /// Managed resources and data sources in file order
    pub resources: Vec<Resource>,
}

impl ParsedConfig {
    pub fn managed(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter().filter(|r| !r.is_data_source())
    }

    pub fn data_sources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter().filter(|r| r.is_data_source())
    }

    pub fn find(&self, id: &ResourceId) -> Option<&Resource> {
        self.managed().find(|r| &r.id == id)
    }
}

const PROVIDER_NAME: &str = "huaweicloud";

/// Meta-arguments handled by the host instead of the provider
const UNSUPPORTED_META: &[&str] = &["count", "for_each", "provider"];

/// Parse a Terraform JSON document
pub fn parse(content: &str) -> Result<ParsedConfig, ParseError> {
    let root: Json = serde_json::from_str(content)?;
    let root = as_object(&root, "")?;

    let variables = match root.get("variable") {
        Some(v) => parse_variables(as_object(v, "variable")?)?,
        None => HashMap::new(),
    };

    let mut config = ParsedConfig::default();

    for (key, value) in root {
        match key.as_str() {
            "provider" => config.provider = parse_provider(value, &variables)?,
            "resource" => parse_blocks(value, "resource", false, &variables, &mut config)?,
            "data" => parse_blocks(value, "data", true, &variables, &mut config)?,
            "variable" | "terraform" | "//" => {}
            other => {
                return Err(ParseError::Unsupported(format!("top-level block '{}'", other)));
            }
        }
    }

    Ok(config)
}

fn parse_variables(blocks: &Map<String, Json>) -> Result<HashMap<String, Value>, ParseError> {
    let mut variables = HashMap::new();
    for (name, body) in blocks {
        let body = as_object(body, &format!("variable.{}", name))?;
        let from_env = env::var(format!("TF_VAR_{}", name)).ok().map(Value::String);
        let value = from_env
            .or_else(|| body.get("default").and_then(Value::from_json))
            .ok_or_else(|| ParseError::UndefinedVariable(name.clone()))?;
        variables.insert(name.clone(), value);
    }
    Ok(variables)
}

fn parse_provider(
    value: &Json,
    variables: &HashMap<String, Value>,
) -> Result<HashMap<String, Value>, ParseError> {
    let providers = as_object(value, "provider")?;
    let mut result = HashMap::new();
    for (name, body) in providers {
        if name != PROVIDER_NAME {
            return Err(ParseError::Unsupported(format!("provider '{}'", name)));
        }
        // Both `{...}` and `[{...}]` are valid Terraform JSON
        let body = match body {
            Json::Array(items) if items.len() == 1 => &items[0],
            Json::Array(_) => {
                return Err(ParseError::Unsupported(
                    "multiple provider configurations".to_string(),
                ));
            }
            other => other,
        };
        let path = format!("provider.{}", name);
        for (key, v) in as_object(body, &path)? {
            if let Some(v) = convert(v, &format!("{}.{}", path, key), variables)? {
                result.insert(key.clone(), v);
            }
        }
    }
    Ok(result)
}

fn parse_blocks(
    value: &Json,
    kind: &str,
    read_only: bool,
    variables: &HashMap<String, Value>,
    config: &mut ParsedConfig,
) -> Result<(), ParseError> {
    for (resource_type, instances) in as_object(value, kind)? {
        if !resource_type.starts_with(PROVIDER_NAME) {
            return Err(ParseError::Unsupported(format!(
                "{} type '{}'",
                kind, resource_type
            )));
        }
        for (name, body) in as_object(instances, &format!("{}.{}", kind, resource_type))? {
            let path = format!("{}.{}.{}", kind, resource_type, name);
            let mut resource = Resource::new(resource_type, name).with_read_only(read_only);

            if config.resources.iter().any(|r| r.binding() == resource.binding()) {
                return Err(ParseError::Duplicate(resource.binding()));
            }

            for (key, v) in as_object(body, &path)? {
                if UNSUPPORTED_META.contains(&key.as_str()) {
                    return Err(ParseError::Unsupported(format!(
                        "meta-argument '{}' at '{}'",
                        key, path
                    )));
                }
                if key == "lifecycle" {
                    continue;
                }
                if key == "depends_on" {
                    resource
                        .attributes
                        .insert("_depends_on".to_string(), parse_depends_on(v, &path)?);
                    continue;
                }
                if let Some(v) = convert(v, &format!("{}.{}", path, key), variables)? {
                    resource.attributes.insert(key.clone(), v);
                }
            }

            config.resources.push(resource);
        }
    }
    Ok(())
}

fn parse_depends_on(value: &Json, path: &str) -> Result<Value, ParseError> {
    let Json::Array(items) = value else {
        return Err(ParseError::InvalidStructure {
            path: format!("{}.depends_on", path),
            message: "expected a list of addresses".to_string(),
        });
    };
    let mut deps = Vec::new();
    for item in items {
        let address = item.as_str().ok_or_else(|| ParseError::InvalidStructure {
            path: format!("{}.depends_on", path),
            message: "expected a string".to_string(),
        })?;
        let address = address
            .strip_prefix("${")
            .and_then(|s| s.strip_suffix('}'))
            .unwrap_or(address);
        let is_data = address.starts_with("data.");
        let plain = address.strip_prefix("data.").unwrap_or(address);
        if ResourceId::parse(plain).is_none() {
            return Err(ParseError::InvalidReference(address.to_string()));
        }
        let binding = if is_data {
            format!("data.{}", plain)
        } else {
            plain.to_string()
        };
        deps.push(Value::ResourceRef(binding, "id".to_string()));
    }
    Ok(Value::List(deps))
}

/// Convert a JSON value, turning interpolations into references
fn convert(
    value: &Json,
    path: &str,
    variables: &HashMap<String, Value>,
) -> Result<Option<Value>, ParseError> {
    match value {
        Json::String(s) => parse_string(s, variables).map(Some),
        Json::Array(items) => {
            let mut list = Vec::new();
            for (i, item) in items.iter().enumerate() {
                if let Some(v) = convert(item, &format!("{}.{}", path, i), variables)? {
                    list.push(v);
                }
            }
            Ok(Some(Value::List(list)))
        }
        Json::Object(obj) => {
            let mut map = HashMap::new();
            for (k, v) in obj {
                if let Some(v) = convert(v, &format!("{}.{}", path, k), variables)? {
                    map.insert(k.clone(), v);
                }
            }
            Ok(Some(Value::Map(map)))
        }
        other => Ok(Value::from_json(other)),
    }
}

fn parse_string(s: &str, variables: &HashMap<String, Value>) -> Result<Value, ParseError> {
    // `$${` is the escape for a literal `${`
    if let Some(literal) = s.strip_prefix("$${") {
        return Ok(Value::String(format!("${{{}", literal)));
    }

    let Some(inner) = s.strip_prefix("${").and_then(|r| r.strip_suffix('}')) else {
        if s.contains("${") {
            return Err(ParseError::Unsupported(format!(
                "string interpolation in '{}'",
                s
            )));
        }
        return Ok(Value::String(s.to_string()));
    };

    parse_reference(inner.trim(), variables)
}

/// Parse the inside of `${...}`
pub fn parse_reference(expr: &str, variables: &HashMap<String, Value>) -> Result<Value, ParseError> {
    let parts: Vec<&str> = expr.split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(ParseError::InvalidReference(expr.to_string()));
    }

    match parts.as_slice() {
        ["var", name] => variables
            .get(*name)
            .cloned()
            .ok_or_else(|| ParseError::UndefinedVariable(name.to_string())),
        ["data", resource_type, name, attr] => Ok(Value::ResourceRef(
            format!("data.{}.{}", resource_type, name),
            attr.to_string(),
        )),
        [resource_type, name, attr] if *resource_type != "data" && *resource_type != "var" => Ok(
            Value::ResourceRef(format!("{}.{}", resource_type, name), attr.to_string()),
        ),
        _ => Err(ParseError::InvalidReference(expr.to_string())),
    }
}

fn as_object<'a>(value: &'a Json, path: &str) -> Result<&'a Map<String, Json>, ParseError> {
    value.as_object().ok_or_else(|| ParseError::InvalidStructure {
        path: path.to_string(),
        message: "expected an object".to_string(),
    })
}
