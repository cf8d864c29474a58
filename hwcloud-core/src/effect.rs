//! Effect - A single operation against the provider
//!
//! Effects are plain values. Nothing happens until the interpreter runs them.

use std::collections::HashMap;

use crate::resource::{Resource, ResourceId, State, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Read a data source
    Read(Resource),
    /// Create a new resource
    Create(Resource),
    /// Update an existing resource in place
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Destroy and recreate a resource whose force-new attributes changed
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Delete a resource by its cloud identifier
    ///
    /// `attributes` are the last known attributes, used to locate the object.
    Delete {
        id: ResourceId,
        identifier: String,
        attributes: HashMap<String, Value>,
    },
}

impl Effect {
    /// Whether this Effect changes remote infrastructure
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Effect::Read(_))
    }

    pub fn resource_id(&self) -> &ResourceId {
        match self {
            Effect::Read(r) | Effect::Create(r) => &r.id,
            Effect::Update { id, .. } | Effect::Replace { id, .. } | Effect::Delete { id, .. } => id,
        }
    }

    /// Short verb used when printing plans and progress
    pub fn kind(&self) -> &'static str {
        match self {
            Effect::Read(_) => "read",
            Effect::Create(_) => "create",
            Effect::Update { .. } => "update",
            Effect::Replace { .. } => "replace",
            Effect::Delete { .. } => "delete",
        }
    }
}
