//! State file structures for persisting observed resource state

use std::collections::HashMap;

use hwcloud_core::resource::{ResourceId, State, Value};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Everything hwcloud knows about the resources it manages
///
/// Resources are kept in creation order; destroy walks them backwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    /// State file format version
    pub version: u32,
    /// Incremented on every write
    pub serial: u64,
    /// Identifies one state history; a file with another lineage is never overwritten
    pub lineage: String,
    /// Version of hwcloud that last wrote this state
    pub hwcloud_version: String,
    pub resources: Vec<ResourceState>,
}

impl StateFile {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            serial: 0,
            lineage: uuid::Uuid::new_v4().to_string(),
            hwcloud_version: env!("CARGO_PKG_VERSION").to_string(),
            resources: Vec::new(),
        }
    }

    /// Prepare the next write
    pub fn increment_serial(&mut self) {
        self.serial += 1;
        self.hwcloud_version = env!("CARGO_PKG_VERSION").to_string();
    }

    pub fn find(&self, id: &ResourceId) -> Option<&ResourceState> {
        self.resources.iter().find(|r| r.matches(id))
    }

    /// Replace the entry of the same resource in place, or append a new one
    pub fn upsert(&mut self, resource: ResourceState) {
        let id = resource.resource_id();
        match self.resources.iter_mut().find(|r| r.matches(&id)) {
            Some(existing) => *existing = resource,
            None => self.resources.push(resource),
        }
    }

    pub fn remove(&mut self, id: &ResourceId) -> Option<ResourceState> {
        let pos = self.resources.iter().position(|r| r.matches(id))?;
        Some(self.resources.remove(pos))
    }

    /// Store an observed state; a state that no longer exists drops the entry
    pub fn record(&mut self, state: &State) {
        if state.exists {
            self.upsert(ResourceState::from_state(state));
        } else {
            self.remove(&state.id);
        }
    }

    /// Resource ids in the order they were first recorded
    pub fn creation_order(&self) -> Vec<ResourceId> {
        self.resources.iter().map(ResourceState::resource_id).collect()
    }

    /// Observed state of every recorded resource
    pub fn current_states(&self) -> HashMap<ResourceId, State> {
        self.resources
            .iter()
            .map(|r| (r.resource_id(), r.to_state()))
            .collect()
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

/// State of a single managed resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Resource type (e.g., "huaweicloud_vpc")
    pub resource_type: String,
    /// Block label in the configuration
    pub name: String,
    /// Cloud-side ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, JsonValue>,
    /// Creation did not finish; the object is replaced on the next apply
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub tainted: bool,
}

impl ResourceState {
    pub fn resource_id(&self) -> ResourceId {
        ResourceId::new(&self.resource_type, &self.name)
    }

    fn matches(&self, id: &ResourceId) -> bool {
        self.resource_type == id.resource_type && self.name == id.name
    }

    /// Unresolved references are never persisted
    pub fn from_state(state: &State) -> Self {
        let attributes = state
            .attributes
            .iter()
            .filter_map(|(k, v)| v.to_json().map(|json| (k.clone(), json)))
            .collect();
        Self {
            resource_type: state.id.resource_type.clone(),
            name: state.id.name.clone(),
            identifier: state.identifier.clone(),
            attributes,
            tainted: state.tainted,
        }
    }

    pub fn to_state(&self) -> State {
        let attributes: HashMap<String, Value> = self
            .attributes
            .iter()
            .filter_map(|(k, v)| Value::from_json(v).map(|value| (k.clone(), value)))
            .collect();
        let mut state = State::existing(self.resource_id(), attributes);
        state.tainted = self.tainted;
        match self.identifier {
            Some(ref identifier) => state.with_identifier(identifier),
            None => state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vpc_state(name: &str, cidr: &str) -> State {
        State::existing(
            ResourceId::new("huaweicloud_vpc", name),
            HashMap::from([
                ("cidr".to_string(), Value::String(cidr.to_string())),
                ("shared".to_string(), Value::Bool(false)),
            ]),
        )
        .with_identifier(format!("id-{}", name))
    }

    #[test]
    fn new_state_file() {
        let state = StateFile::new();
        assert_eq!(state.version, StateFile::CURRENT_VERSION);
        assert_eq!(state.serial, 0);
        assert!(!state.lineage.is_empty());
        assert!(state.resources.is_empty());
    }

    #[test]
    fn record_keeps_creation_order() {
        let mut file = StateFile::new();
        file.record(&vpc_state("a", "10.0.0.0/16"));
        file.record(&vpc_state("b", "10.1.0.0/16"));
        file.record(&vpc_state("a", "10.2.0.0/16"));

        let order: Vec<String> = file.creation_order().iter().map(|id| id.name.clone()).collect();
        assert_eq!(order, vec!["a", "b"]);
        assert_eq!(
            file.find(&ResourceId::new("huaweicloud_vpc", "a"))
                .map(|r| r.attributes["cidr"].clone()),
            Some(json!("10.2.0.0/16"))
        );
    }

    #[test]
    fn recording_a_gone_state_removes_the_entry() {
        let mut file = StateFile::new();
        file.record(&vpc_state("a", "10.0.0.0/16"));
        file.record(&State::not_found(ResourceId::new("huaweicloud_vpc", "a")));
        assert!(file.resources.is_empty());
        assert!(file.remove(&ResourceId::new("huaweicloud_vpc", "a")).is_none());
    }

    #[test]
    fn converts_back_to_core_state() {
        let original = vpc_state("a", "10.0.0.0/16");
        let restored = ResourceState::from_state(&original).to_state();
        assert_eq!(restored, original);
    }

    #[test]
    fn taint_is_persisted() {
        let tainted = vpc_state("a", "10.0.0.0/16").mark_tainted();
        let saved = ResourceState::from_state(&tainted);
        let json = serde_json::to_value(&saved).unwrap();
        assert_eq!(json["tainted"], json!(true));
        assert!(saved.to_state().tainted);

        let clean = serde_json::to_value(ResourceState::from_state(&vpc_state("b", "10.1.0.0/16")))
            .unwrap();
        assert!(clean.get("tainted").is_none());
    }

    #[test]
    fn references_are_not_persisted() {
        let state = State::existing(
            ResourceId::new("huaweicloud_dns_zone", "zone"),
            HashMap::from([(
                "router".to_string(),
                Value::ResourceRef("huaweicloud_vpc.a".to_string(), "id".to_string()),
            )]),
        );
        let saved = ResourceState::from_state(&state);
        assert!(saved.attributes.is_empty());
        assert!(saved.identifier.is_none());
    }

    #[test]
    fn serialization_round_trip() {
        let mut file = StateFile::new();
        file.record(&vpc_state("a", "10.0.0.0/16"));
        file.increment_serial();

        let json = serde_json::to_string_pretty(&file).unwrap();
        let restored: StateFile = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.serial, 1);
        assert_eq!(restored.lineage, file.lineage);
        assert_eq!(restored.resources, file.resources);
    }
}
