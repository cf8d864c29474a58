//! KMS key resource and data source
//!
//! KMS is an RPC-style API: every operation is a `POST` to
//! `v1.0/{project_id}/kms/{action}` with the key id in the body.

use std::collections::HashMap;
use std::time::Duration;

use hwcloud_core::provider::{ErrorKind, ProviderError, ProviderResult};
use hwcloud_core::resource::{Resource, ResourceId, State, Value};
use hwcloud_core::wait::Observation;
use serde_json::{Map, Value as JsonValue, json};

use super::{
    ResultExt, check_deleted, existing, fetch_tags, has_change, keep_created, single_result,
    tag_action,
};
use crate::client::{Client, ServiceClient};
use crate::error::ApiError;
use crate::schemas::kms::{
    STATE_DISABLED, STATE_ENABLED, STATE_PENDING_ACTIVATION, STATE_PENDING_DELETION,
    STATE_PENDING_IMPORT, schema,
};
use crate::utils::{
    Operation, diff_tags, expand_tags, get_enterprise_project_id, get_region, json_str,
    operation_timeout, set_attr,
};

/// Metadata fields copied verbatim from `key_info`
const KEY_FIELDS: &[&str] = &[
    "key_id",
    "domain_id",
    "key_alias",
    "realm",
    "key_description",
    "creation_date",
    "scheduled_deletion_date",
    "key_state",
    "default_key_flag",
    "expiration_time",
    "origin",
    "key_usage",
    "enterprise_project_id",
];

async fn call(kms: &ServiceClient, action: &str, body: JsonValue) -> Result<JsonValue, ApiError> {
    kms.post(&kms.service_url(action), &body).await
}

/// `key_info` of a key, `None` when the key does not exist
async fn describe(kms: &ServiceClient, key_id: &str) -> Result<Option<JsonValue>, ApiError> {
    let response = check_deleted(call(kms, "describe-key", json!({ "key_id": key_id })).await)?;
    Ok(response.and_then(|r| r.get("key_info").cloned()))
}

async fn refresh_state(kms: &ServiceClient, key_id: &str) -> ProviderResult<Observation<JsonValue>> {
    match describe(kms, key_id).await? {
        Some(info) => {
            let state = json_str(&info, "/key_state").unwrap_or_default().to_string();
            Ok(Observation::Found(info, state))
        }
        None => Ok(Observation::Missing),
    }
}

async fn wait_for_key_state(
    kms: &ServiceClient,
    key_id: &str,
    pending: &[&str],
    target: &[&str],
    timeout: Duration,
) -> ProviderResult<()> {
    kms
        .state_change(pending, target, timeout)
        .with_delay(Duration::from_secs(5))
        .with_min_timeout(Duration::from_secs(3))
        .wait_for_state(|| refresh_state(kms, key_id))
        .await
        .map(|_| ())
}

pub async fn create(client: &Client, resource: &Resource) -> ProviderResult<State> {
    let id = &resource.id;
    let region = get_region(&resource.attributes, client.region());
    let kms = client.service_client("kms", &region).await?;

    let mut body = Map::new();
    for (name, field) in [
        ("key_alias", "key_alias"),
        ("key_description", "key_description"),
        ("key_algorithm", "key_spec"),
        ("key_usage", "key_usage"),
        ("origin", "origin"),
    ] {
        if let Some(value) = resource.get_str(name).filter(|v| !v.is_empty()) {
            body.insert(field.to_string(), json!(value));
        }
    }
    if let Some(eps) =
        get_enterprise_project_id(resource, client.config().enterprise_project_id.as_deref())
    {
        body.insert("enterprise_project_id".to_string(), json!(eps));
    }

    log::debug!("Create KMS key options: {:?}", body);
    let response = call(&kms, "create-key", JsonValue::Object(body))
        .await
        .context_for(id, "error creating KMS key")?;
    let key_id = json_str(&response, "/key_info/key_id")
        .ok_or_else(|| {
            ProviderError::new("the key ID is not found in the API response")
                .for_resource(id.clone())
        })?
        .to_string();
    log::info!("KMS key ID: {}", key_id);

    finish_create(client, resource, &kms, &key_id)
        .await
        .map_err(keep_created(resource, &key_id, &region))
}

/// Wait for a new key, then apply the settings the create call does not take
async fn finish_create(
    client: &Client,
    resource: &Resource,
    kms: &ServiceClient,
    key_id: &str,
) -> ProviderResult<State> {
    let id = &resource.id;
    let timeout = operation_timeout(&resource.attributes, &schema(), Operation::Create);

    let target = if resource.get_str("origin") == Some("external") {
        STATE_PENDING_IMPORT
    } else {
        STATE_ENABLED
    };
    wait_for_key_state(kms, key_id, &[STATE_PENDING_ACTIVATION], &[target], timeout)
        .await
        .context_for(id, &format!("error waiting for key ({}) to become ready", key_id))?;

    if target == STATE_ENABLED && resource.get_bool("is_enabled") == Some(false) {
        call(kms, "disable-key", json!({ "key_id": key_id }))
            .await
            .context_for(id, "error disabling KMS key")?;
        wait_for_key_state(kms, key_id, &[STATE_ENABLED], &[STATE_DISABLED], timeout)
            .await
            .context_for(id, &format!("error waiting for key ({}) to be disabled", key_id))?;
    }

    if resource.get_bool("rotation_enabled") == Some(true) {
        call(kms, "enable-key-rotation", json!({ "key_id": key_id }))
            .await
            .context_for(id, "failed to enable key rotation")?;
        if let Some(interval) = resource.get_int("rotation_interval") {
            update_rotation_interval(kms, key_id, interval)
                .await
                .context_for(id, "failed to change key rotation interval")?;
        }
    }

    let tags = expand_tags(resource.attributes.get("tags"));
    if !tags.is_empty() {
        let url = kms.service_url(&format!("{}/tags/action", key_id));
        tag_action(kms, &url, "create", tags)
            .await
            .context_for(id, &format!("error setting tags of KMS key {}", key_id))?;
    }

    read(client, id, key_id, &resource.attributes).await
}

pub async fn read(
    client: &Client,
    id: &ResourceId,
    identifier: &str,
    known: &HashMap<String, Value>,
) -> ProviderResult<State> {
    let region = get_region(known, client.region());
    let kms = client.service_client("kms", &region).await?;

    let info = describe(&kms, identifier)
        .await
        .context_for(id, "error fetching KMS key")?;
    let Some(info) = info else {
        log::warn!("KMS key ({}) not found, removing from state", identifier);
        return Ok(State::not_found(id.clone()));
    };
    log::debug!("KMS key {} info: {}", identifier, info);

    let key_state = json_str(&info, "/key_state").unwrap_or_default();
    if key_state == STATE_PENDING_DELETION {
        log::warn!("KMS key ({}) is pending deletion, removing from state", identifier);
        return Ok(State::not_found(id.clone()));
    }

    let mut attributes = flatten_key(&info);
    attributes.insert("is_enabled".to_string(), Value::Bool(key_state == STATE_ENABLED));
    if let Some(pending_days) = known.get("pending_days") {
        attributes.insert("pending_days".to_string(), pending_days.clone());
    }

    // Rotation only exists for symmetric keys
    match call(&kms, "get-key-rotation-status", json!({ "key_id": identifier })).await {
        Ok(rotation) => {
            set_attr(&mut attributes, "rotation_enabled", rotation.get("key_rotation_enabled"));
            set_attr(&mut attributes, "rotation_interval", rotation.get("rotation_interval"));
            set_attr(&mut attributes, "rotation_number", rotation.get("number_of_rotations"));
        }
        Err(e) => log::warn!("Error fetching rotation status of key ({}): {}", identifier, e),
    }

    match fetch_tags(&kms, &kms.service_url(&format!("{}/tags", identifier))).await {
        Ok(tags) => {
            attributes.insert("tags".to_string(), Value::Map(tags));
        }
        Err(e) => log::warn!("Error fetching tags of KMS key ({}): {}", identifier, e),
    }

    Ok(existing(id, identifier, &region, attributes))
}

pub async fn update(
    client: &Client,
    id: &ResourceId,
    identifier: &str,
    from: &State,
    to: &Resource,
) -> ProviderResult<State> {
    let region = get_region(&to.attributes, client.region());
    let kms = client.service_client("kms", &region).await?;
    let timeout = operation_timeout(&to.attributes, &schema(), Operation::Update);

    if has_change(from, to, "key_alias")
        && let Some(alias) = to.get_str("key_alias")
    {
        call(&kms, "update-key-alias", json!({ "key_id": identifier, "key_alias": alias }))
            .await
            .context_for(id, "failed to update alias of KMS key")?;
    }

    if has_change(from, to, "key_description") {
        let description = to.get_str("key_description").unwrap_or_default();
        call(
            &kms,
            "update-key-description",
            json!({ "key_id": identifier, "key_description": description }),
        )
        .await
        .context_for(id, "failed to update description of KMS key")?;
    }

    if has_change(from, to, "is_enabled") {
        if to.get_bool("is_enabled") == Some(true) {
            call(&kms, "enable-key", json!({ "key_id": identifier }))
                .await
                .context_for(id, "error enabling KMS key")?;
            wait_for_key_state(&kms, identifier, &[STATE_DISABLED], &[STATE_ENABLED], timeout)
                .await
                .context_for(id, "error waiting for key to be enabled")?;
        } else {
            call(&kms, "disable-key", json!({ "key_id": identifier }))
                .await
                .context_for(id, "error disabling KMS key")?;
            wait_for_key_state(&kms, identifier, &[STATE_ENABLED], &[STATE_DISABLED], timeout)
                .await
                .context_for(id, "error waiting for key to be disabled")?;
        }
    }

    let rotation_enabled = to.get_bool("rotation_enabled") == Some(true);
    if has_change(from, to, "rotation_enabled") {
        let action = if rotation_enabled {
            "enable-key-rotation"
        } else {
            "disable-key-rotation"
        };
        call(&kms, action, json!({ "key_id": identifier }))
            .await
            .context_for(id, "failed to update key rotation")?;
    }
    if rotation_enabled
        && has_change(from, to, "rotation_interval")
        && let Some(interval) = to.get_int("rotation_interval")
    {
        update_rotation_interval(&kms, identifier, interval)
            .await
            .context_for(id, "failed to change key rotation interval")?;
    }

    let (removed, added) = diff_tags(from.attributes.get("tags"), to.attributes.get("tags"));
    let url = kms.service_url(&format!("{}/tags/action", identifier));
    if !removed.is_empty() {
        tag_action(&kms, &url, "delete", removed)
            .await
            .context_for(id, "error deleting tags of KMS key")?;
    }
    if !added.is_empty() {
        tag_action(&kms, &url, "create", added)
            .await
            .context_for(id, "error creating tags of KMS key")?;
    }

    read(client, id, identifier, &to.attributes).await
}

/// Schedule the key for deletion after `pending_days`
pub async fn delete(
    client: &Client,
    id: &ResourceId,
    identifier: &str,
    known: &HashMap<String, Value>,
) -> ProviderResult<()> {
    let region = get_region(known, client.region());
    let kms = client.service_client("kms", &region).await?;

    let info = describe(&kms, identifier)
        .await
        .context_for(id, "error fetching KMS key")?;
    let state = info.as_ref().and_then(|i| json_str(i, "/key_state"));
    if matches!(state, None | Some(STATE_PENDING_DELETION)) {
        log::info!("KMS key ({}) is already deleted or pending deletion", identifier);
        return Ok(());
    }

    let pending_days = match known.get("pending_days") {
        Some(Value::String(days)) => days.clone(),
        Some(Value::Int(days)) => days.to_string(),
        _ => "7".to_string(),
    };
    call(
        &kms,
        "schedule-key-deletion",
        json!({ "key_id": identifier, "pending_days": pending_days }),
    )
    .await
    .context_for(id, "error deleting KMS key")?;

    let info = describe(&kms, identifier)
        .await
        .context_for(id, "error fetching KMS key")?;
    match info.as_ref().and_then(|i| json_str(i, "/key_state")) {
        None | Some(STATE_PENDING_DELETION) => {
            log::info!(
                "KMS key {} scheduled for deletion in {} days",
                identifier,
                pending_days
            );
            Ok(())
        }
        Some(other) => Err(ProviderError::with_kind(
            ErrorKind::UnexpectedState,
            format!(
                "failed to delete key {}: state is '{}', expected '{}'",
                identifier, other, STATE_PENDING_DELETION
            ),
        )
        .for_resource(id.clone())),
    }
}

/// Look up one key by id, alias, description or state
pub async fn read_data_source(client: &Client, resource: &Resource) -> ProviderResult<State> {
    let id = &resource.id;
    let region = get_region(&resource.attributes, client.region());
    let kms = client.service_client("kms", &region).await?;

    let mut keys = Vec::new();
    let mut marker: Option<String> = None;
    loop {
        let mut body = json!({ "limit": "1000" });
        if let Some(state) = resource.get_str("key_state") {
            body["key_state"] = json!(state);
        }
        if let Some(ref marker) = marker {
            body["marker"] = json!(marker);
        }
        let page = call(&kms, "list-keys", body)
            .await
            .context_for(id, "error listing KMS keys")?;
        if let Some(details) = page.get("key_details").and_then(JsonValue::as_array) {
            keys.extend(details.iter().cloned());
        }
        marker = json_str(&page, "/next_marker").map(str::to_string);
        let truncated = page
            .get("truncated")
            .is_some_and(|t| t == &json!("true") || t == &json!(true));
        if !truncated || marker.is_none() {
            break;
        }
    }

    // Keys pending deletion only match when asked for explicitly
    let wanted_state = resource.get_str("key_state");
    let matches: Vec<JsonValue> = keys
        .into_iter()
        .filter(|key| {
            wanted_state == Some(STATE_PENDING_DELETION)
                || json_str(key, "/key_state") != Some(STATE_PENDING_DELETION)
        })
        .filter(|key| {
            ["key_id", "key_alias", "key_description", "enterprise_project_id"]
                .iter()
                .all(|field| {
                    resource.get_str(field).is_none_or(|wanted| {
                        key.get(*field).and_then(JsonValue::as_str) == Some(wanted)
                    })
                })
        })
        .collect();
    let key = single_result(id, matches)?;
    let key_id = json_str(&key, "/key_id").unwrap_or_default().to_string();
    log::debug!("KMS key found: {}", key);

    let mut attributes = flatten_key(&key);
    if let Ok(rotation) =
        call(&kms, "get-key-rotation-status", json!({ "key_id": key_id })).await
    {
        set_attr(&mut attributes, "rotation_enabled", rotation.get("key_rotation_enabled"));
        set_attr(&mut attributes, "rotation_interval", rotation.get("rotation_interval"));
    }
    if let Ok(tags) = fetch_tags(&kms, &kms.service_url(&format!("{}/tags", key_id))).await {
        attributes.insert("tags".to_string(), Value::Map(tags));
    }

    Ok(existing(id, &key_id, &region, attributes))
}

async fn update_rotation_interval(
    kms: &ServiceClient,
    key_id: &str,
    interval: i64,
) -> Result<JsonValue, ApiError> {
    call(
        kms,
        "update-key-rotation-interval",
        json!({ "key_id": key_id, "rotation_interval": interval }),
    )
    .await
}

fn flatten_key(info: &JsonValue) -> HashMap<String, Value> {
    let mut attributes = HashMap::new();
    for field in KEY_FIELDS {
        set_attr(&mut attributes, field, info.get(*field));
    }
    set_attr(&mut attributes, "key_algorithm", info.get("key_spec"));
    attributes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_spec_becomes_algorithm() {
        let info = json!({
            "key_id": "0d0466b0-e727-4d9c-b35d-f84bb474a37f",
            "key_alias": "key-test",
            "key_state": "2",
            "key_spec": "AES_256",
            "key_description": "",
            "default_key_flag": "0"
        });
        let attributes = flatten_key(&info);
        assert_eq!(attributes["key_algorithm"], Value::String("AES_256".into()));
        assert_eq!(attributes["key_state"], Value::String("2".into()));
        assert_eq!(attributes["key_description"], Value::String(String::new()));
        assert!(!attributes.contains_key("realm"));
    }
}
