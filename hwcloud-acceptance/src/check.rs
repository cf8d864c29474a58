//! Assertions run against the state after each apply step
//!
//! Keys use the flattened notation of Terraform acceptance checks:
//! `tags.foo` for a map entry, `masters.0` for a list element, and
//! `tags.%` / `masters.#` for the number of entries.

use std::collections::HashMap;

use hwcloud_core::resource::{ResourceId, State, Value};

/// Managed and data source states known to a test case
#[derive(Debug, Clone, Default)]
pub struct TestState {
    /// Managed resources in creation order
    pub order: Vec<ResourceId>,
    pub managed: HashMap<ResourceId, State>,
    /// Data sources keyed by `data.type.name`
    pub data: HashMap<String, State>,
}

impl TestState {
    pub fn get(&self, address: &str) -> Option<&State> {
        if address.starts_with("data.") {
            return self.data.get(address);
        }
        self.managed.get(&ResourceId::parse(address)?)
    }

    pub fn record(&mut self, state: State) {
        if !state.exists {
            self.remove(&state.id);
            return;
        }
        if !self.order.contains(&state.id) {
            self.order.push(state.id.clone());
        }
        self.managed.insert(state.id.clone(), state);
    }

    pub fn remove(&mut self, id: &ResourceId) {
        self.order.retain(|i| i != id);
        self.managed.remove(id);
    }
}

pub enum Check {
    /// Attribute equals the expected value
    Attr {
        address: String,
        key: String,
        expected: String,
    },
    /// Attribute is present and not empty
    AttrSet { address: String, key: String },
    NoAttr { address: String, key: String },
    /// Two attributes, possibly on different resources, hold the same value
    AttrPair {
        address: String,
        key: String,
        other_address: String,
        other_key: String,
    },
    Exists(String),
    Custom(Box<dyn Fn(&TestState) -> Result<(), String> + Send + Sync>),
}

impl Check {
    pub fn attr(
        address: impl Into<String>,
        key: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Check::Attr {
            address: address.into(),
            key: key.into(),
            expected: expected.into(),
        }
    }

    pub fn attr_set(address: impl Into<String>, key: impl Into<String>) -> Self {
        Check::AttrSet {
            address: address.into(),
            key: key.into(),
        }
    }

    pub fn no_attr(address: impl Into<String>, key: impl Into<String>) -> Self {
        Check::NoAttr {
            address: address.into(),
            key: key.into(),
        }
    }

    pub fn attr_pair(
        address: impl Into<String>,
        key: impl Into<String>,
        other_address: impl Into<String>,
        other_key: impl Into<String>,
    ) -> Self {
        Check::AttrPair {
            address: address.into(),
            key: key.into(),
            other_address: other_address.into(),
            other_key: other_key.into(),
        }
    }

    pub fn exists(address: impl Into<String>) -> Self {
        Check::Exists(address.into())
    }

    pub fn custom(f: impl Fn(&TestState) -> Result<(), String> + Send + Sync + 'static) -> Self {
        Check::Custom(Box::new(f))
    }

    pub fn verify(&self, state: &TestState) -> Result<(), String> {
        match self {
            Check::Attr {
                address,
                key,
                expected,
            } => {
                let actual = flat_value(lookup(state, address)?, key);
                match actual {
                    Some(actual) if &actual == expected => Ok(()),
                    Some(actual) => Err(format!(
                        "{}: attribute '{}' expected \"{}\", got \"{}\"",
                        address, key, expected, actual
                    )),
                    None => Err(format!(
                        "{}: attribute '{}' expected \"{}\", got nothing",
                        address, key, expected
                    )),
                }
            }
            Check::AttrSet { address, key } => match flat_value(lookup(state, address)?, key) {
                Some(actual) if !actual.is_empty() => Ok(()),
                _ => Err(format!("{}: attribute '{}' is not set", address, key)),
            },
            Check::NoAttr { address, key } => match flat_value(lookup(state, address)?, key) {
                None => Ok(()),
                // An empty collection counts as absent
                Some(count) if count == "0" && (key.ends_with(".%") || key.ends_with(".#")) => {
                    Ok(())
                }
                Some(actual) => Err(format!(
                    "{}: attribute '{}' expected to be absent, got \"{}\"",
                    address, key, actual
                )),
            },
            Check::AttrPair {
                address,
                key,
                other_address,
                other_key,
            } => {
                let left = flat_value(lookup(state, address)?, key);
                let right = flat_value(lookup(state, other_address)?, other_key);
                if left == right {
                    Ok(())
                } else {
                    Err(format!(
                        "{}.{} ({:?}) does not match {}.{} ({:?})",
                        address, key, left, other_address, other_key, right
                    ))
                }
            }
            Check::Exists(address) => {
                let found = lookup(state, address)?;
                if found.identifier.as_deref().is_some_and(|id| !id.is_empty())
                    || address.starts_with("data.")
                {
                    Ok(())
                } else {
                    Err(format!("{}: no ID is set", address))
                }
            }
            Check::Custom(f) => f(state),
        }
    }
}

fn lookup<'a>(state: &'a TestState, address: &str) -> Result<&'a State, String> {
    state
        .get(address)
        .ok_or_else(|| format!("{}: not found in state", address))
}

/// Attribute rendered the way acceptance checks compare it
pub fn flat_value(state: &State, key: &str) -> Option<String> {
    if let Some(collection) = key.strip_suffix(".%").or_else(|| key.strip_suffix(".#")) {
        return match state.lookup(collection) {
            Some(Value::Map(map)) => Some(map.len().to_string()),
            Some(Value::List(items)) => Some(items.len().to_string()),
            Some(_) => None,
            None => Some("0".to_string()),
        };
    }
    match state.lookup(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Int(i) => Some(i.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}
