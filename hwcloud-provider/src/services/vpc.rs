//! VPC resource and data source

use std::collections::HashMap;
use std::time::Duration;

use hwcloud_core::provider::{ProviderError, ProviderResult};
use hwcloud_core::resource::{Resource, ResourceId, State, Value};
use hwcloud_core::wait::Observation;
use serde_json::{Map, Value as JsonValue, json};

use super::{
    ResultExt, check_deleted, existing, fetch_tags, has_changes, keep_created, single_result,
    tag_action,
};
use crate::client::{Client, ServiceClient};
use crate::schemas::vpc::{default_shared, schema};
use crate::utils::{
    Operation, diff_tags, expand_tags, get_enterprise_project_id, get_region,
    json_str, operation_timeout, set_attr,
};

pub async fn create(client: &Client, resource: &Resource) -> ProviderResult<State> {
    let id = &resource.id;
    let region = get_region(&resource.attributes, client.region());
    let vpc_client = client.service_client("vpc", &region).await?;

    let mut body = Map::new();
    for name in ["name", "cidr", "description"] {
        if let Some(value) = resource.get_str(name) {
            body.insert(name.to_string(), json!(value));
        }
    }
    if let Some(eps) =
        get_enterprise_project_id(resource, client.config().enterprise_project_id.as_deref())
    {
        body.insert("enterprise_project_id".to_string(), json!(eps));
    }

    log::debug!("Create VPC options: {:?}", body);
    let response = vpc_client
        .post(&vpc_client.service_url("vpcs"), &json!({ "vpc": body }))
        .await
        .context_for(id, "error creating VPC")?;
    let vpc_id = json_str(&response, "/vpc/id")
        .ok_or_else(|| {
            ProviderError::new("the VPC ID is not found in the API response")
                .for_resource(id.clone())
        })?
        .to_string();
    log::info!("VPC ID: {}", vpc_id);

    finish_create(client, resource, &vpc_client, &region, &vpc_id)
        .await
        .map_err(keep_created(resource, &vpc_id, &region))
}

/// Wait for a new VPC and apply the settings that need its ID
async fn finish_create(
    client: &Client,
    resource: &Resource,
    vpc_client: &ServiceClient,
    region: &str,
    vpc_id: &str,
) -> ProviderResult<State> {
    let id = &resource.id;
    log::debug!("Waiting for VPC ({}) to become available", vpc_id);
    let timeout = operation_timeout(&resource.attributes, &schema(), Operation::Create);
    vpc_client
        .state_change(&["CREATING"], &["OK"], timeout)
        .with_delay(Duration::from_secs(5))
        .with_min_timeout(Duration::from_secs(3))
        .wait_for_state(|| refresh_status(vpc_client, vpc_id))
        .await
        .context_for(id, &format!("error waiting for VPC ({}) to become ready", vpc_id))?;

    let tags = expand_tags(resource.attributes.get("tags"));
    if !tags.is_empty() {
        let tags_client = client.service_client("vpcv2", region).await?;
        tag_action(&tags_client, &tags_url(&tags_client, vpc_id), "create", tags)
            .await
            .context_for(id, &format!("error setting tags of VPC {}", vpc_id))?;
    }

    read(client, id, vpc_id, &resource.attributes).await
}

pub async fn read(
    client: &Client,
    id: &ResourceId,
    identifier: &str,
    known: &HashMap<String, Value>,
) -> ProviderResult<State> {
    let region = get_region(known, client.region());
    let vpc_client = client.service_client("vpc", &region).await?;

    let url = vpc_client.service_url(&format!("vpcs/{}", identifier));
    let Some(response) = check_deleted(vpc_client.get(&url).await)
        .context_for(id, "error retrieving VPC")?
    else {
        log::warn!("VPC ({}) not found, removing from state", identifier);
        return Ok(State::not_found(id.clone()));
    };
    let vpc = response.get("vpc").unwrap_or(&JsonValue::Null);
    log::debug!("Retrieved VPC {}: {}", identifier, vpc);

    let mut attributes = flatten_vpc(vpc);
    let tags_client = client.service_client("vpcv2", &region).await?;
    let url = tags_client.service_url(&format!("vpcs/{}/tags", identifier));
    match fetch_tags(&tags_client, &url).await {
        Ok(tags) => {
            attributes.insert("tags".to_string(), Value::Map(tags));
        }
        Err(e) => log::warn!("Error fetching tags of VPC ({}): {}", identifier, e),
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

    if has_changes(from, to, &["name", "cidr", "description"]) {
        let vpc_client = client.service_client("vpc", &region).await?;
        let mut body = Map::new();
        for name in ["name", "cidr"] {
            if let Some(value) = to.get_str(name) {
                body.insert(name.to_string(), json!(value));
            }
        }
        // An empty description clears the remote one
        body.insert(
            "description".to_string(),
            json!(to.get_str("description").unwrap_or_default()),
        );
        log::debug!("Update VPC ({}) options: {:?}", identifier, body);
        vpc_client
            .put(
                &vpc_client.service_url(&format!("vpcs/{}", identifier)),
                &json!({ "vpc": body }),
            )
            .await
            .context_for(id, "error updating VPC")?;
    }

    let (removed, added) = diff_tags(from.attributes.get("tags"), to.attributes.get("tags"));
    if !removed.is_empty() || !added.is_empty() {
        let tags_client = client.service_client("vpcv2", &region).await?;
        if !removed.is_empty() {
            tag_action(&tags_client, &tags_url(&tags_client, identifier), "delete", removed)
                .await
                .context_for(id, "error deleting tags of VPC")?;
        }
        if !added.is_empty() {
            tag_action(&tags_client, &tags_url(&tags_client, identifier), "create", added)
                .await
                .context_for(id, "error creating tags of VPC")?;
        }
    }

    read(client, id, identifier, &to.attributes).await
}

pub async fn delete(
    client: &Client,
    id: &ResourceId,
    identifier: &str,
    known: &HashMap<String, Value>,
) -> ProviderResult<()> {
    let region = get_region(known, client.region());
    let vpc_client = client.service_client("vpc", &region).await?;

    let url = vpc_client.service_url(&format!("vpcs/{}", identifier));
    if check_deleted(vpc_client.delete(&url).await)
        .context_for(id, "error deleting VPC")?
        .is_none()
    {
        log::info!("VPC ({}) is already deleted", identifier);
        return Ok(());
    }

    let timeout = operation_timeout(known, &schema(), Operation::Delete);
    vpc_client
        .state_change(&["OK"], &["DELETED"], timeout)
        .with_delay(Duration::from_secs(5))
        .with_min_timeout(Duration::from_secs(3))
        .wait_for_state(|| refresh_status(&vpc_client, identifier))
        .await
        .context_for(id, &format!("error waiting for VPC ({}) to be deleted", identifier))?;
    log::info!("Deleted VPC {}", identifier);
    Ok(())
}

/// Look up one VPC by id, or by name/cidr/status among all VPCs of the project
pub async fn read_data_source(client: &Client, resource: &Resource) -> ProviderResult<State> {
    let id = &resource.id;
    let region = get_region(&resource.attributes, client.region());
    let vpc_client = client.service_client("vpc", &region).await?;

    let candidates: Vec<JsonValue> = if let Some(vpc_id) = resource.get_str("id") {
        let response = vpc_client
            .get(&vpc_client.service_url(&format!("vpcs/{}", vpc_id)))
            .await
            .context_for(id, "unable to retrieve VPC")?;
        response.get("vpc").cloned().into_iter().collect()
    } else {
        let mut url = vpc_client.service_url("vpcs?limit=2000");
        if let Some(eps) = resource.get_str("enterprise_project_id") {
            url.push_str(&format!("&enterprise_project_id={}", eps));
        }
        let response = vpc_client.get(&url).await.context_for(id, "unable to retrieve VPCs")?;
        response.get("vpcs").and_then(JsonValue::as_array).cloned().unwrap_or_default()
    };

    let matches: Vec<JsonValue> = candidates
        .into_iter()
        .filter(|vpc| {
            ["name", "cidr", "status"].iter().all(|field| {
                resource.get_str(field).is_none_or(|wanted| {
                    vpc.get(*field).and_then(JsonValue::as_str) == Some(wanted)
                })
            })
        })
        .collect();
    let vpc = single_result(id, matches)?;
    let vpc_id = json_str(&vpc, "/id").unwrap_or_default().to_string();

    let mut attributes = flatten_vpc(&vpc);
    let tags_client = client.service_client("vpcv2", &region).await?;
    let url = tags_client.service_url(&format!("vpcs/{}/tags", vpc_id));
    if let Ok(tags) = fetch_tags(&tags_client, &url).await {
        attributes.insert("tags".to_string(), Value::Map(tags));
    }

    Ok(existing(id, &vpc_id, &region, attributes))
}

fn flatten_vpc(vpc: &JsonValue) -> HashMap<String, Value> {
    let mut attributes = HashMap::new();
    for name in ["name", "cidr", "description", "status", "enterprise_project_id"] {
        set_attr(&mut attributes, name, vpc.get(name));
    }
    attributes.insert(
        "shared".to_string(),
        vpc.get("shared")
            .and_then(Value::from_json)
            .unwrap_or_else(default_shared),
    );

    let routes: Vec<Value> = vpc
        .get("routes")
        .and_then(JsonValue::as_array)
        .map(|routes| {
            routes
                .iter()
                .map(|route| {
                    let mut map = HashMap::new();
                    set_attr(&mut map, "destination", route.get("destination"));
                    set_attr(&mut map, "nexthop", route.get("nexthop"));
                    Value::Map(map)
                })
                .collect()
        })
        .unwrap_or_default();
    attributes.insert("routes".to_string(), Value::List(routes));
    attributes
}

async fn refresh_status(
    vpc_client: &ServiceClient,
    vpc_id: &str,
) -> ProviderResult<Observation<JsonValue>> {
    let url = vpc_client.service_url(&format!("vpcs/{}", vpc_id));
    match check_deleted(vpc_client.get(&url).await)? {
        None => Ok(Observation::Gone("DELETED".to_string())),
        Some(response) => {
            let status = json_str(&response, "/vpc/status").unwrap_or_default().to_string();
            Ok(Observation::Found(response, status))
        }
    }
}

fn tags_url(tags_client: &ServiceClient, vpc_id: &str) -> String {
    tags_client.service_url(&format!("vpcs/{}/tags/action", vpc_id))
}
