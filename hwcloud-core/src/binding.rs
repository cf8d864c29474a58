//! Binding - Resolve references between resources
//!
//! A reference such as `${huaweicloud_vpc.test.id}` is parsed into
//! `Value::ResourceRef("huaweicloud_vpc.test", "id")`. The binding map holds
//! the known attributes of every resource and data source so references can
//! be substituted right before a provider call.

use std::collections::{HashMap, HashSet};

use crate::resource::{Resource, State, Value};

#[derive(Debug, Clone, Default)]
pub struct Bindings {
    attributes: HashMap<String, HashMap<String, Value>>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a resource, merging its observed state over the configured attributes
    pub fn insert(&mut self, resource: &Resource, state: Option<&State>) {
        let mut attrs = resource.attributes.clone();
        if let Some(state) = state
            && state.exists
        {
            for (k, v) in &state.attributes {
                attrs.insert(k.clone(), v.clone());
            }
        }
        self.attributes.insert(resource.binding(), attrs);
    }

    pub fn get(&self, binding: &str, attribute: &str) -> Option<&Value> {
        self.attributes.get(binding)?.get(attribute)
    }

    pub fn resolve_value(&self, value: &Value) -> Value {
        match value {
            Value::ResourceRef(binding, attr) => match self.get(binding, attr) {
                Some(resolved) if resolved != value => self.resolve_value(resolved),
                _ => value.clone(),
            },
            Value::List(items) => Value::List(items.iter().map(|v| self.resolve_value(v)).collect()),
            Value::Map(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.resolve_value(v)))
                    .collect(),
            ),
            _ => value.clone(),
        }
    }

    /// Copy of the resource with every resolvable reference substituted
    pub fn resolve(&self, resource: &Resource) -> Resource {
        let mut resolved = resource.clone();
        for value in resolved.attributes.values_mut() {
            *value = self.resolve_value(value);
        }
        resolved
    }
}

/// Bindings a resource refers to
pub fn dependencies(resource: &Resource) -> HashSet<String> {
    let mut deps = HashSet::new();
    for value in resource.attributes.values() {
        collect_dependencies(value, &mut deps);
    }
    deps
}

fn collect_dependencies(value: &Value, deps: &mut HashSet<String>) {
    match value {
        Value::ResourceRef(binding, _) => {
            deps.insert(binding.clone());
        }
        Value::List(items) => items.iter().for_each(|v| collect_dependencies(v, deps)),
        Value::Map(map) => map.values().for_each(|v| collect_dependencies(v, deps)),
        _ => {}
    }
}

/// Sort resources so every resource comes after the ones it references.
///
/// Returns the address of an offending resource when references form a cycle.
pub fn sort_by_dependencies(resources: &[Resource]) -> Result<Vec<Resource>, String> {
    let by_binding: HashMap<String, &Resource> =
        resources.iter().map(|r| (r.binding(), r)).collect();

    let mut sorted = Vec::new();
    let mut visited = HashSet::new();
    let mut visiting = HashSet::new();

    fn visit<'a>(
        resource: &'a Resource,
        by_binding: &HashMap<String, &'a Resource>,
        visited: &mut HashSet<String>,
        visiting: &mut HashSet<String>,
        sorted: &mut Vec<Resource>,
    ) -> Result<(), String> {
        let binding = resource.binding();
        if visited.contains(&binding) {
            return Ok(());
        }
        if !visiting.insert(binding.clone()) {
            return Err(binding);
        }

        let mut deps: Vec<String> = dependencies(resource).into_iter().collect();
        deps.sort();
        for dep in deps {
            if let Some(dep_resource) = by_binding.get(&dep) {
                visit(dep_resource, by_binding, visited, visiting, sorted)?;
            }
        }

        visiting.remove(&binding);
        visited.insert(binding);
        sorted.push(resource.clone());
        Ok(())
    }

    for resource in resources {
        visit(resource, &by_binding, &mut visited, &mut visiting, &mut sorted)?;
    }
    Ok(sorted)
}
