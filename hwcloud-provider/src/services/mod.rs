//! Per-service CRUD handlers
//!
//! Every handler follows the same shape: build the request body from the
//! resource attributes, call the service, wait for the remote status when the
//! API is asynchronous and finally re-read the object so the returned state
//! reflects what the cloud reports.

pub mod cce;
pub mod dns;
pub mod kms;
pub mod vpc;

use std::collections::HashMap;

use hwcloud_core::differ::attribute_changed;
use hwcloud_core::provider::{ProviderError, ProviderResult};
use hwcloud_core::resource::{Resource, ResourceId, State, Value};
use serde_json::{Value as JsonValue, json};

use crate::client::ServiceClient;
use crate::error::ApiError;
use crate::provider::resource_schema;
use crate::utils::flatten_tags;

/// Attach the operation and resource address to an error
pub(crate) trait ResultExt<T> {
    fn context_for(self, id: &ResourceId, context: &str) -> ProviderResult<T>;
}

impl<T, E: Into<ProviderError>> ResultExt<T> for Result<T, E> {
    fn context_for(self, id: &ResourceId, context: &str) -> ProviderResult<T> {
        self.map_err(|e| e.into().context(context).for_resource(id.clone()))
    }
}

/// `Ok(None)` for a 404, so callers can report the object as gone
pub(crate) fn check_deleted<T>(result: Result<T, ApiError>) -> Result<Option<T>, ApiError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Tags listed as `{"tags": [{"key": .., "value": ..}]}`
pub(crate) async fn fetch_tags(
    service_client: &ServiceClient,
    url: &str,
) -> Result<HashMap<String, Value>, ApiError> {
    let response = service_client.get(url).await?;
    let tags = response
        .get("tags")
        .and_then(JsonValue::as_array)
        .map(|tags| flatten_tags(tags))
        .unwrap_or_default();
    Ok(tags)
}

/// Batch tag call shared by VPC, KMS and DNS: `{"action": .., "tags": [..]}`
pub(crate) async fn tag_action(
    service_client: &ServiceClient,
    url: &str,
    action: &str,
    tags: Vec<JsonValue>,
) -> Result<JsonValue, ApiError> {
    log::debug!("Tag action {} on {}: {:?}", action, url, tags);
    service_client
        .post(url, &json!({ "action": action, "tags": tags }))
        .await
}

/// Whether an update has to touch `name`
///
/// Optional attributes removed from the configuration count as a change to
/// their unset value; other missing attributes keep their remote value.
pub(crate) fn has_change(from: &State, to: &Resource, name: &str) -> bool {
    let schema = resource_schema(&to.id.resource_type);
    attribute_changed(
        schema.as_ref().and_then(|s| s.attributes.get(name)),
        to.attributes.get(name),
        from.attributes.get(name),
    )
}

pub(crate) fn has_changes(from: &State, to: &Resource, names: &[&str]) -> bool {
    names.iter().any(|name| has_change(from, to, name))
}

/// A handler that finished reading an object records its region too
pub(crate) fn existing(
    id: &ResourceId,
    identifier: &str,
    region: &str,
    mut attributes: HashMap<String, Value>,
) -> State {
    attributes.insert("region".to_string(), Value::String(region.to_string()));
    State::existing(id.clone(), attributes).with_identifier(identifier)
}

/// Keep an object that was created in state when a later creation step fails
///
/// The error carries the object as a tainted state, so the host records its
/// ID and replaces it on the next apply instead of creating a second copy.
pub(crate) fn keep_created<'a>(
    resource: &'a Resource,
    identifier: &'a str,
    region: &'a str,
) -> impl FnOnce(ProviderError) -> ProviderError + 'a {
    move |err| {
        log::warn!(
            "{} ({}) was created but did not finish: {}",
            resource.id,
            identifier,
            err
        );
        err.with_partial(existing(
            &resource.id,
            identifier,
            region,
            resource.attributes.clone(),
        ))
    }
}

/// Exactly one match is expected from a data source query
pub(crate) fn single_result<T>(id: &ResourceId, mut matches: Vec<T>) -> ProviderResult<T> {
    match matches.len() {
        0 => Err(ProviderError::not_found(
            "your query returned no results, please change your search criteria and try again",
        )
        .for_resource(id.clone())),
        1 => Ok(matches.remove(0)),
        n => Err(ProviderError::validation(format!(
            "your query returned {} results, please try a more specific search criteria",
            n
        ))
        .for_resource(id.clone())),
    }
}
