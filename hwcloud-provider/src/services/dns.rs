//! DNS zone resource
//!
//! Public zones live on the global DNS endpoint, private zones on the
//! regional one. Reads try the global endpoint first so an import works
//! without knowing the zone type.

use std::collections::HashMap;
use std::time::Duration;

use hwcloud_core::provider::{ProviderError, ProviderResult};
use hwcloud_core::resource::{Resource, ResourceId, State, Value};
use hwcloud_core::wait::Observation;
use serde_json::{Map, Value as JsonValue, json};

use super::{
    ResultExt, check_deleted, existing, fetch_tags, has_change, has_changes, keep_created,
    tag_action,
};
use crate::client::{Client, ServiceClient};
use crate::schemas::dns::schema;
use crate::utils::{
    Operation, diff_tags, expand_tags, get_enterprise_project_id, get_region, json_str,
    operation_timeout, set_attr,
};

const DELAY: Duration = Duration::from_secs(5);
const MIN_TIMEOUT: Duration = Duration::from_secs(3);

/// A VPC associated with a private zone
#[derive(Debug, Clone, PartialEq)]
struct Router {
    id: String,
    region: String,
}

impl Router {
    fn to_json(&self) -> JsonValue {
        json!({ "router_id": self.id, "router_region": self.region })
    }
}

fn is_private(attributes: &HashMap<String, Value>) -> bool {
    attributes.get("zone_type").and_then(Value::as_str) == Some("private")
}

/// Tag resource type of a zone
fn tag_type(private: bool) -> &'static str {
    if private {
        "DNS-private_zone"
    } else {
        "DNS-public_zone"
    }
}

/// Collapse the `PENDING_*` family into `PENDING`
fn parse_status(status: &str) -> String {
    if status.starts_with("PENDING") {
        "PENDING".to_string()
    } else {
        status.to_string()
    }
}

/// `ACTIVE` is shown as `ENABLE` so it can be compared with the configuration
fn display_status(status: &str) -> String {
    if status == "ACTIVE" {
        "ENABLE".to_string()
    } else {
        status.to_string()
    }
}

fn configured_routers(attributes: &HashMap<String, Value>, region: &str) -> Vec<Router> {
    let Some(Value::List(items)) = attributes.get("router") else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_map)
        .filter_map(|router| {
            let id = router.get("router_id")?.as_str()?.to_string();
            let region = router
                .get("router_region")
                .and_then(Value::as_str)
                .filter(|r| !r.is_empty())
                .unwrap_or(region)
                .to_string();
            Some(Router { id, region })
        })
        .collect()
}

fn remote_routers(zone: &JsonValue) -> Vec<Router> {
    zone.get("routers")
        .and_then(JsonValue::as_array)
        .map(|routers| {
            routers
                .iter()
                .filter_map(|r| {
                    Some(Router {
                        id: r.get("router_id")?.as_str()?.to_string(),
                        region: json_str(r, "/router_region").unwrap_or_default().to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

async fn dns_client(client: &Client, private: bool, region: &str) -> ProviderResult<ServiceClient> {
    let service = if private { "dns_region" } else { "dns" };
    client.service_client(service, region).await
}

fn zone_url(dns: &ServiceClient, zone_id: &str) -> String {
    dns.service_url(&format!("zones/{}", zone_id))
}

fn tags_url(dns: &ServiceClient, private: bool, zone_id: &str, suffix: &str) -> String {
    dns.endpoint_url(&format!(
        "v2/{}/{}/{}/{}",
        dns.project_id(),
        tag_type(private),
        zone_id,
        suffix
    ))
}

async fn refresh_zone(dns: &ServiceClient, zone_id: &str) -> ProviderResult<Observation<JsonValue>> {
    match check_deleted(dns.get(&zone_url(dns, zone_id)).await)? {
        None => Ok(Observation::Gone("DELETED".to_string())),
        Some(zone) => {
            let status = parse_status(json_str(&zone, "/status").unwrap_or_default());
            log::debug!("DNS zone ({}) current status: {}", zone_id, status);
            Ok(Observation::Found(zone, status))
        }
    }
}

async fn refresh_router(
    dns: &ServiceClient,
    zone_id: &str,
    router_id: &str,
) -> ProviderResult<Observation<JsonValue>> {
    let zone = dns.get(&zone_url(dns, zone_id)).await?;
    let status = zone
        .get("routers")
        .and_then(JsonValue::as_array)
        .and_then(|routers| {
            routers
                .iter()
                .find(|r| r.get("router_id").and_then(JsonValue::as_str) == Some(router_id))
        })
        .map(|r| parse_status(json_str(r, "/status").unwrap_or_default()))
        .unwrap_or_else(|| "DELETED".to_string());
    log::debug!("DNS zone ({}) router ({}) current status: {}", zone_id, router_id, status);
    Ok(Observation::Found(zone, status))
}

async fn associate(
    dns: &ServiceClient,
    zone_id: &str,
    router: &Router,
    timeout: Duration,
) -> ProviderResult<()> {
    log::debug!("Associating zone {} with router {:?}", zone_id, router);
    dns.post(
        &dns.service_url(&format!("zones/{}/associaterouter", zone_id)),
        &json!({ "router": router.to_json() }),
    )
    .await
    .map_err(|e| ProviderError::from(e).context("error associating zone"))?;

    dns
        .state_change(&["PENDING"], &["ACTIVE"], timeout)
        .with_delay(DELAY)
        .with_min_timeout(MIN_TIMEOUT)
        .wait_for_state(|| refresh_router(dns, zone_id, &router.id))
        .await
        .map_err(|e| {
            e.context(format!(
                "error waiting for router ({}) of zone ({}) to become ACTIVE",
                router.id, zone_id
            ))
        })?;
    Ok(())
}

async fn disassociate(
    dns: &ServiceClient,
    zone_id: &str,
    router: &Router,
    timeout: Duration,
) -> ProviderResult<()> {
    log::debug!("Disassociating zone {} from router {:?}", zone_id, router);
    dns.post(
        &dns.service_url(&format!("zones/{}/disassociaterouter", zone_id)),
        &json!({ "router": router.to_json() }),
    )
    .await
    .map_err(|e| ProviderError::from(e).context("error disassociating zone"))?;

    dns
        .state_change(&["ACTIVE", "PENDING", "ERROR"], &["DELETED"], timeout)
        .with_delay(DELAY)
        .with_min_timeout(MIN_TIMEOUT)
        .wait_for_state(|| refresh_router(dns, zone_id, &router.id))
        .await
        .map_err(|e| {
            e.context(format!(
                "error waiting for router ({}) of zone ({}) to become DELETED",
                router.id, zone_id
            ))
        })?;
    Ok(())
}

async fn update_status(
    dns: &ServiceClient,
    zone_id: &str,
    status: &str,
    timeout: Duration,
) -> ProviderResult<()> {
    dns.put(
        &dns.service_url(&format!("zones/{}/statuses", zone_id)),
        &json!({ "status": status }),
    )
    .await
    .map_err(|e| ProviderError::from(e).context("error updating the status of the zone"))?;

    dns
        .state_change(&["PENDING"], &["ACTIVE", "DISABLE", "FREEZE"], timeout)
        .with_min_timeout(Duration::from_secs(10))
        .wait_for_state(|| refresh_zone(dns, zone_id))
        .await
        .map_err(|e| e.context("error waiting for the zone status update to complete"))?;
    Ok(())
}

fn require_router(id: &ResourceId, routers: &[Router], operation: &str) -> ProviderResult<()> {
    if routers.is_empty() {
        return Err(ProviderError::validation(format!(
            "the argument (router) is required when {} DNS private zone",
            operation
        ))
        .for_resource(id.clone()));
    }
    Ok(())
}

pub async fn create(client: &Client, resource: &Resource) -> ProviderResult<State> {
    let id = &resource.id;
    let region = get_region(&resource.attributes, client.region());
    let private = is_private(&resource.attributes);
    let routers = configured_routers(&resource.attributes, &region);
    if private {
        require_router(id, &routers, "creating")?;
    }
    let dns = dns_client(client, private, &region).await?;

    let mut body = Map::new();
    for name in ["name", "email", "description", "zone_type"] {
        if let Some(value) = resource.get_str(name).filter(|v| !v.is_empty()) {
            body.insert(name.to_string(), json!(value));
        }
    }
    if let Some(ttl) = resource.get_int("ttl") {
        body.insert("ttl".to_string(), json!(ttl));
    }
    if let Some(eps) =
        get_enterprise_project_id(resource, client.config().enterprise_project_id.as_deref())
    {
        body.insert("enterprise_project_id".to_string(), json!(eps));
    }
    if private && let Some(first) = routers.first() {
        body.insert("router".to_string(), first.to_json());
    }

    log::debug!("Create DNS zone options: {:?}", body);
    let response = dns
        .post(&dns.service_url("zones"), &JsonValue::Object(body))
        .await
        .context_for(id, "error creating DNS zone")?;
    let zone_id = json_str(&response, "/id")
        .ok_or_else(|| {
            ProviderError::new("the zone ID is not found in the API response")
                .for_resource(id.clone())
        })?
        .to_string();

    finish_create(client, resource, &dns, &routers, &zone_id)
        .await
        .map_err(keep_created(resource, &zone_id, &region))
}

/// Wait for a new zone and apply the settings that need its ID
async fn finish_create(
    client: &Client,
    resource: &Resource,
    dns: &ServiceClient,
    routers: &[Router],
    zone_id: &str,
) -> ProviderResult<State> {
    let id = &resource.id;
    let private = is_private(&resource.attributes);
    let timeout = operation_timeout(&resource.attributes, &schema(), Operation::Create);

    log::debug!("Waiting for DNS zone ({}) to become available", zone_id);
    dns
        .state_change(&["PENDING"], &["ACTIVE"], timeout)
        .with_delay(DELAY)
        .with_min_timeout(MIN_TIMEOUT)
        .wait_for_state(|| refresh_zone(dns, zone_id))
        .await
        .context_for(
            id,
            &format!("error waiting for DNS zone ({}) to become ACTIVE for creation", zone_id),
        )?;

    if private {
        for router in routers.iter().skip(1) {
            associate(dns, zone_id, router, timeout)
                .await
                .context_for(id, "error creating DNS zone")?;
        }
    }

    if let Some(status) = resource.get_str("status")
        && status != "ENABLE"
    {
        update_status(dns, zone_id, status, timeout)
            .await
            .context_for(id, "error creating DNS zone")?;
    }

    let tags = expand_tags(resource.attributes.get("tags"));
    if !tags.is_empty() {
        tag_action(dns, &tags_url(dns, private, zone_id, "tags/action"), "create", tags)
            .await
            .context_for(id, &format!("error setting tags of DNS zone {}", zone_id))?;
    }

    log::debug!("Created DNS zone {}", zone_id);
    read(client, id, zone_id, &resource.attributes).await
}

pub async fn read(
    client: &Client,
    id: &ResourceId,
    identifier: &str,
    known: &HashMap<String, Value>,
) -> ProviderResult<State> {
    let region = get_region(known, client.region());

    let global = dns_client(client, false, &region).await?;
    let (dns, zone) = match global.get(&zone_url(&global, identifier)).await {
        Ok(zone) => (global, zone),
        Err(e) => {
            log::warn!("Fetching zone failed with DNS global endpoint: {}", e);
            let regional = dns_client(client, true, &region).await?;
            let zone = check_deleted(regional.get(&zone_url(&regional, identifier)).await)
                .context_for(id, "error retrieving DNS zone")?;
            let Some(zone) = zone else {
                log::warn!("DNS zone ({}) not found, removing from state", identifier);
                return Ok(State::not_found(id.clone()));
            };
            (regional, zone)
        }
    };
    log::debug!("Retrieved zone {}: {}", identifier, zone);

    let mut attributes = HashMap::new();
    for name in [
        "name",
        "email",
        "description",
        "ttl",
        "zone_type",
        "enterprise_project_id",
        "serial",
    ] {
        set_attr(&mut attributes, name, zone.get(name));
    }
    if let Some(status) = json_str(&zone, "/status") {
        attributes.insert("status".to_string(), Value::String(display_status(status)));
    }
    set_attr(&mut attributes, "masters", zone.get("masters"));

    let routers = remote_routers(&zone);
    if !routers.is_empty() {
        let routers = routers
            .iter()
            .map(|r| {
                let mut map = HashMap::new();
                map.insert("router_id".to_string(), Value::String(r.id.clone()));
                map.insert("router_region".to_string(), Value::String(r.region.clone()));
                Value::Map(map)
            })
            .collect();
        attributes.insert("router".to_string(), Value::List(routers));
    }

    let private = is_private(&attributes);
    match fetch_tags(&dns, &tags_url(&dns, private, identifier, "tags")).await {
        Ok(tags) => {
            attributes.insert("tags".to_string(), Value::Map(tags));
        }
        Err(e) => log::warn!("Error fetching DNS zone tags: {}", e),
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
    let private = is_private(&to.attributes);
    let routers = configured_routers(&to.attributes, &region);
    if private {
        require_router(id, &routers, "updating")?;
    }
    let dns = dns_client(client, private, &region).await?;
    let timeout = operation_timeout(&to.attributes, &schema(), Operation::Update);

    if has_changes(from, to, &["email", "ttl", "description"]) {
        let mut body = Map::new();
        if has_change(from, to, "email") {
            body.insert("email".to_string(), json!(to.get_str("email").unwrap_or_default()));
        }
        if has_change(from, to, "ttl")
            && let Some(ttl) = to.get_int("ttl")
        {
            body.insert("ttl".to_string(), json!(ttl));
        }
        if has_change(from, to, "description") {
            body.insert(
                "description".to_string(),
                json!(to.get_str("description").unwrap_or_default()),
            );
        }

        log::debug!("Updating zone {} with options: {:?}", identifier, body);
        dns.patch(&zone_url(&dns, identifier), &JsonValue::Object(body))
            .await
            .context_for(id, "error updating DNS zone")?;

        dns
            .state_change(&["PENDING"], &["ACTIVE", "DISABLE"], timeout)
            .with_delay(DELAY)
            .with_min_timeout(MIN_TIMEOUT)
            .wait_for_state(|| refresh_zone(&dns, identifier))
            .await
            .context_for(
                id,
                &format!("error waiting for DNS zone ({}) to become ACTIVE for update", identifier),
            )?;
    }

    if has_change(from, to, "status")
        && let Some(status) = to.get_str("status")
    {
        update_status(&dns, identifier, status, timeout)
            .await
            .context_for(id, "error updating DNS zone")?;
    }

    if private && has_change(from, to, "router") {
        let zone = dns
            .get(&zone_url(&dns, identifier))
            .await
            .context_for(id, "error getting DNS zone router")?;
        let remote = remote_routers(&zone);

        for router in routers.iter().filter(|r| !remote.iter().any(|x| x.id == r.id)) {
            associate(&dns, identifier, router, timeout)
                .await
                .context_for(id, "error updating DNS zone")?;
        }
        for router in remote.iter().filter(|r| !routers.iter().any(|x| x.id == r.id)) {
            disassociate(&dns, identifier, router, timeout)
                .await
                .context_for(id, "error updating DNS zone")?;
        }
    }

    let (removed, added) = diff_tags(from.attributes.get("tags"), to.attributes.get("tags"));
    let url = tags_url(&dns, private, identifier, "tags/action");
    if !removed.is_empty() {
        tag_action(&dns, &url, "delete", removed)
            .await
            .context_for(id, &format!("error updating tags of DNS zone {}", identifier))?;
    }
    if !added.is_empty() {
        tag_action(&dns, &url, "create", added)
            .await
            .context_for(id, &format!("error updating tags of DNS zone {}", identifier))?;
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
    let dns = dns_client(client, is_private(known), &region).await?;

    if check_deleted(dns.delete(&zone_url(&dns, identifier)).await)
        .context_for(id, "error deleting DNS zone")?
        .is_none()
    {
        log::info!("DNS zone ({}) is already deleted", identifier);
        return Ok(());
    }

    log::debug!("Waiting for DNS zone ({}) to become DELETED", identifier);
    // An ERROR zone may still be deleted
    dns
        .state_change(
            &["ACTIVE", "PENDING", "ERROR"],
            &["DELETED"],
            operation_timeout(known, &schema(), Operation::Delete),
        )
        .with_delay(DELAY)
        .with_min_timeout(MIN_TIMEOUT)
        .wait_for_state(|| refresh_zone(&dns, identifier))
        .await
        .context_for(id, &format!("error waiting for DNS zone ({}) to delete", identifier))?;
    Ok(())
}
