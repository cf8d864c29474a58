//! Differ - Compare desired state with current state to generate a Plan
//!
//! Compares the "desired state" declared in configuration with the "current
//! state" read back from the Provider, and generates the list of required
//! Effects (Plan).

use std::collections::{HashMap, HashSet};

use crate::effect::Effect;
use crate::plan::Plan;
use crate::resource::{Resource, ResourceId, State, Value};
use crate::schema::{AttributeSchema, ResourceSchema};

/// Attributes that only steer the provider and never exist remotely
const META_ATTRIBUTES: &[&str] = &["timeouts"];

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// Resource exists with differences -> needs update
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// A force-new attribute changed -> destroy and create
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource exists with no differences -> no action needed
    NoChange(ResourceId),
}

impl Diff {
    /// Returns whether this Diff involves a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Diff::NoChange(_))
    }
}

/// Compare desired state with current state to compute a Diff
pub fn diff(desired: &Resource, current: &State, schema: Option<&ResourceSchema>) -> Diff {
    if !current.exists {
        return Diff::Create(desired.clone());
    }

    let changed = find_changed_attributes(&desired.attributes, &current.attributes, schema);

    if changed.is_empty() && !current.tainted {
        return Diff::NoChange(desired.id.clone());
    }

    // A half-created object is always recreated
    let replace = current.tainted
        || schema.is_some_and(|s| {
            changed
                .iter()
                .any(|name| s.attributes.get(name).is_some_and(|a| a.force_new))
        });

    if replace {
        Diff::Replace {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    } else {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    }
}

/// Find changed attributes between desired and current state
///
/// Clearable attributes omitted from the configuration are compared too, so
/// removing `description` or `tags` plans an update that unsets them.
fn find_changed_attributes(
    desired: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
    schema: Option<&ResourceSchema>,
) -> Vec<String> {
    let mut names: Vec<&str> = desired.keys().map(String::as_str).collect();
    if let Some(schema) = schema {
        names.extend(
            schema
                .attributes
                .values()
                .filter(|a| a.clears_when_omitted() && !desired.contains_key(&a.name))
                .map(|a| a.name.as_str()),
        );
    }

    let mut changed: Vec<String> = names
        .into_iter()
        .filter(|key| !key.starts_with('_') && !META_ATTRIBUTES.contains(key))
        .filter(|key| {
            attribute_changed(
                schema.and_then(|s| s.attributes.get(*key)),
                desired.get(*key),
                current.get(*key),
            )
        })
        .map(str::to_string)
        .collect();
    changed.sort();
    changed
}

/// Whether one attribute differs between configuration and remote state
///
/// An omitted clearable attribute stands for its default, or for "unset"
/// when it has none. Other omitted attributes keep their remote value.
pub fn attribute_changed(
    attr: Option<&AttributeSchema>,
    desired: Option<&Value>,
    current: Option<&Value>,
) -> bool {
    let desired = match (desired, attr) {
        (Some(value), _) => value,
        (None, Some(attr)) if attr.clears_when_omitted() => match attr.default {
            Some(ref default) => default,
            None => return current.is_some_and(|c| !is_unset(c)),
        },
        (None, _) => return false,
    };

    match current {
        // Unresolved references are only known after apply
        _ if desired.has_refs() => true,
        None if attr.is_some_and(|a| a.write_only) => false,
        Some(current) => match attr.and_then(|a| a.suppress_diff) {
            Some(suppress) => !suppress(desired, current),
            None => !values_equal(desired, current),
        },
        None => !is_unset(desired),
    }
}

/// Loose equality: APIs return numbers where configuration wrote strings
pub fn values_equal(desired: &Value, current: &Value) -> bool {
    match (desired, current) {
        (Value::String(s), Value::Int(i)) | (Value::Int(i), Value::String(s)) => {
            s.parse::<i64>().ok() == Some(*i)
        }
        (Value::String(s), Value::Bool(b)) | (Value::Bool(b), Value::String(s)) => {
            s.parse::<bool>().ok() == Some(*b)
        }
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Map(a), Value::Map(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => desired == current,
    }
}

/// Empty strings and collections, `false` and `0` mean "not set"
pub fn is_unset(value: &Value) -> bool {
    match value {
        Value::Map(m) => m.is_empty(),
        Value::List(l) => l.is_empty(),
        Value::String(s) => s.is_empty(),
        Value::Bool(b) => !b,
        Value::Int(i) => *i == 0,
        _ => false,
    }
}

/// Compute Diff for multiple resources and generate a Plan
///
/// `desired` must already be sorted by dependencies. Resources listed in
/// `orphan_order` (creation order) that are no longer configured are deleted
/// at the end, newest first.
pub fn create_plan(
    desired: &[Resource],
    current_states: &HashMap<ResourceId, State>,
    orphan_order: &[ResourceId],
    schemas: &HashMap<String, ResourceSchema>,
) -> Plan {
    let mut plan = Plan::new();

    for resource in desired {
        if resource.is_data_source() {
            plan.add(Effect::Read(resource.clone()));
            continue;
        }

        let current = current_states
            .get(&resource.id)
            .cloned()
            .unwrap_or_else(|| State::not_found(resource.id.clone()));

        match diff(resource, &current, schemas.get(&resource.id.resource_type)) {
            Diff::Create(r) => plan.add(Effect::Create(r)),
            Diff::Update {
                id,
                from,
                to,
                changed_attributes,
            } => plan.add(Effect::Update {
                id,
                from,
                to,
                changed_attributes,
            }),
            Diff::Replace {
                id,
                from,
                to,
                changed_attributes,
            } => plan.add(Effect::Replace {
                id,
                from,
                to,
                changed_attributes,
            }),
            Diff::NoChange(_) => {}
        }
    }

    let configured: HashSet<&ResourceId> = desired
        .iter()
        .filter(|r| !r.is_data_source())
        .map(|r| &r.id)
        .collect();
    for id in orphan_order.iter().rev() {
        if configured.contains(id) {
            continue;
        }
        if let Some(state) = current_states.get(id)
            && state.exists
            && let Some(ref identifier) = state.identifier
        {
            plan.add(Effect::Delete {
                id: id.clone(),
                identifier: identifier.clone(),
                attributes: state.attributes.clone(),
            });
        }
    }

    plan
}

/// Plan deleting every existing resource, last created first
pub fn destroy_plan(order: &[ResourceId], current_states: &HashMap<ResourceId, State>) -> Plan {
    let mut plan = Plan::new();
    for id in order.iter().rev() {
        if let Some(state) = current_states.get(id)
            && state.exists
            && let Some(ref identifier) = state.identifier
        {
            plan.add(Effect::Delete {
                id: id.clone(),
                identifier: identifier.clone(),
                attributes: state.attributes.clone(),
            });
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttributeSchema, AttributeType, types};

    fn vpc_schema() -> ResourceSchema {
        ResourceSchema::new("huaweicloud_vpc")
            .attribute(AttributeSchema::new("name", AttributeType::String).required())
            .attribute(AttributeSchema::new("cidr", types::cidr()).required())
            .attribute(
                AttributeSchema::new("region", AttributeType::String)
                    .optional_computed()
                    .force_new(),
            )
    }

    fn existing(attrs: &[(&str, Value)]) -> State {
        State::existing(
            ResourceId::new("huaweicloud_vpc", "test"),
            attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
        .with_identifier("vpc-123")
    }

    fn s(v: &str) -> Value {
        Value::String(v.to_string())
    }

    #[test]
    fn diff_create_when_not_exists() {
        let desired = Resource::new("huaweicloud_vpc", "test");
        let current = State::not_found(ResourceId::new("huaweicloud_vpc", "test"));

        let result = diff(&desired, &current, None);
        assert!(matches!(result, Diff::Create(_)));
    }

    #[test]
    fn diff_no_change_ignores_computed_and_meta() {
        let desired = Resource::new("huaweicloud_vpc", "test")
            .with_attribute("name", s("vpc-a"))
            .with_attribute("timeouts", Value::Map(HashMap::new()))
            .with_attribute("tags", Value::Map(HashMap::new()));
        let current = existing(&[("name", s("vpc-a")), ("status", s("OK"))]);

        let result = diff(&desired, &current, Some(&vpc_schema()));
        assert!(!result.is_change());
    }

    #[test]
    fn diff_update_lists_only_changed_attributes() {
        let desired = Resource::new("huaweicloud_vpc", "test")
            .with_attribute("name", s("vpc-b"))
            .with_attribute("cidr", s("192.168.0.0/16"));
        let current = existing(&[("name", s("vpc-a")), ("cidr", s("192.168.0.0/16"))]);

        match diff(&desired, &current, Some(&vpc_schema())) {
            Diff::Update {
                changed_attributes, ..
            } => assert_eq!(changed_attributes, vec!["name".to_string()]),
            other => panic!("Expected Update, got {:?}", other),
        }
    }

    #[test]
    fn diff_replace_on_force_new() {
        let desired = Resource::new("huaweicloud_vpc", "test").with_attribute("region", s("cn-south-1"));
        let current = existing(&[("region", s("cn-north-4"))]);

        assert!(matches!(
            diff(&desired, &current, Some(&vpc_schema())),
            Diff::Replace { .. }
        ));
    }

    #[test]
    fn tainted_resource_is_replaced() {
        let desired = Resource::new("huaweicloud_vpc", "test").with_attribute("name", s("vpc-a"));
        let current = existing(&[("name", s("vpc-a"))]).mark_tainted();

        match diff(&desired, &current, Some(&vpc_schema())) {
            Diff::Replace {
                from,
                changed_attributes,
                ..
            } => {
                assert_eq!(from.identifier.as_deref(), Some("vpc-123"));
                assert!(changed_attributes.is_empty());
            }
            other => panic!("Expected Replace, got {:?}", other),
        }
    }

    #[test]
    fn numeric_strings_match_numbers() {
        assert!(values_equal(&s("300"), &Value::Int(300)));
        assert!(values_equal(&s("true"), &Value::Bool(true)));
        assert!(!values_equal(&s("7"), &Value::Int(30)));
    }

    #[test]
    fn write_only_and_suppressed_attributes() {
        let schema = ResourceSchema::new("huaweicloud_dns_zone")
            .attribute(
                AttributeSchema::new("name", AttributeType::String)
                    .required()
                    .with_diff_suppress(|a, b| {
                        a.as_str().map(|s| s.trim_end_matches('.'))
                            == b.as_str().map(|s| s.trim_end_matches('.'))
                    }),
            )
            .attribute(AttributeSchema::new("pending_days", AttributeType::String).write_only());
        let desired = Resource::new("huaweicloud_dns_zone", "test")
            .with_attribute("name", s("example.com"))
            .with_attribute("pending_days", s("7"));
        let current = existing(&[("name", s("example.com."))]);

        assert!(!diff(&desired, &current, Some(&schema)).is_change());
        assert!(diff(&desired, &current, None).is_change());
    }

    #[test]
    fn unresolved_reference_counts_as_change() {
        let desired = Resource::new("huaweicloud_vpc", "test").with_attribute(
            "description",
            Value::ResourceRef("huaweicloud_kms_key.k".to_string(), "id".to_string()),
        );
        let current = existing(&[("description", s("old"))]);
        assert!(diff(&desired, &current, None).is_change());
    }

    #[test]
    fn removed_optional_attributes_are_cleared() {
        let schema = vpc_schema()
            .attribute(AttributeSchema::new("description", AttributeType::String))
            .attribute(AttributeSchema::new("tags", types::tags()))
            .attribute(AttributeSchema::new("status", AttributeType::String).computed());
        let mut tags = HashMap::new();
        tags.insert("foo".to_string(), s("bar"));
        let current = existing(&[
            ("name", s("vpc-a")),
            ("description", s("old desc")),
            ("tags", Value::Map(tags)),
            ("status", s("OK")),
            ("region", s("cn-north-4")),
        ]);
        let desired = Resource::new("huaweicloud_vpc", "test").with_attribute("name", s("vpc-a"));

        match diff(&desired, &current, Some(&schema)) {
            Diff::Update {
                changed_attributes, ..
            } => assert_eq!(changed_attributes, vec!["description", "tags"]),
            other => panic!("Expected Update, got {:?}", other),
        }

        let cleared = existing(&[
            ("name", s("vpc-a")),
            ("description", s("")),
            ("tags", Value::Map(HashMap::new())),
        ]);
        assert!(!diff(&desired, &cleared, Some(&schema)).is_change());
    }

    #[test]
    fn omitted_attribute_falls_back_to_default() {
        let ttl = AttributeSchema::new("ttl", AttributeType::Int).with_default(Value::Int(300));
        assert!(!attribute_changed(Some(&ttl), None, Some(&Value::Int(300))));
        assert!(attribute_changed(Some(&ttl), None, Some(&Value::Int(600))));

        let email = AttributeSchema::new("email", AttributeType::String).optional_computed();
        assert!(!attribute_changed(Some(&email), None, Some(&s("a@example.com"))));
        assert!(!attribute_changed(None, None, Some(&s("anything"))));
    }

    #[test]
    fn create_plan_reads_creates_updates_and_deletes_orphans() {
        let resources = vec![
            Resource::new("huaweicloud_vpc", "lookup").with_read_only(true),
            Resource::new("huaweicloud_vpc", "new"),
            Resource::new("huaweicloud_vpc", "test").with_attribute("name", s("vpc-b")),
        ];

        let mut current_states = HashMap::new();
        current_states.insert(
            ResourceId::new("huaweicloud_vpc", "test"),
            existing(&[("name", s("vpc-a"))]),
        );
        let orphan = ResourceId::new("huaweicloud_kms_key", "old");
        current_states.insert(
            orphan.clone(),
            State::existing(orphan.clone(), HashMap::new()).with_identifier("key-1"),
        );
        let order = vec![ResourceId::new("huaweicloud_vpc", "test"), orphan.clone()];

        let plan = create_plan(&resources, &current_states, &order, &HashMap::new());

        let kinds: Vec<&str> = plan.effects().iter().map(Effect::kind).collect();
        assert_eq!(kinds, vec!["read", "create", "update", "delete"]);
        assert_eq!(plan.effects()[3].resource_id(), &orphan);
    }

    #[test]
    fn destroy_plan_reverses_order() {
        let vpc = ResourceId::new("huaweicloud_vpc", "test");
        let zone = ResourceId::new("huaweicloud_dns_zone", "private");
        let mut current_states = HashMap::new();
        current_states.insert(
            vpc.clone(),
            State::existing(vpc.clone(), HashMap::new()).with_identifier("vpc-1"),
        );
        current_states.insert(
            zone.clone(),
            State::existing(zone.clone(), HashMap::new()).with_identifier("zone-1"),
        );

        let plan = destroy_plan(&[vpc.clone(), zone.clone()], &current_states);
        assert_eq!(plan.effects()[0].resource_id(), &zone);
        assert_eq!(plan.effects()[1].resource_id(), &vpc);
    }
}
