//! CCE cluster resource
//!
//! Cluster creation is asynchronous: the create call returns a job whose
//! completion yields the cluster id, after which the cluster still has to
//! reach the `Available` phase.

use std::collections::HashMap;
use std::time::Duration;

use hwcloud_core::provider::{ErrorKind, ProviderError, ProviderResult};
use hwcloud_core::resource::{Resource, ResourceId, State, Value};
use hwcloud_core::wait::Observation;
use serde_json::{Map, Value as JsonValue, json};

use super::{ResultExt, check_deleted, existing, has_change, has_changes, keep_created};
use crate::client::{Client, ServiceClient};
use crate::error::ApiError;
use crate::schemas::cce::{INVALID_PHASES, schema};
use crate::utils::{
    Operation, diff_tags, expand_tags, flatten_tags, get_enterprise_project_id, get_region,
    json_str, operation_timeout, set_attr,
};

const POLL_INTERVAL: Duration = Duration::from_secs(20);

/// Storage kinds released together with the cluster when `delete_all` is set
const DELETE_OPTIONS: &[&str] = &[
    "delete_efs",
    "delete_evs",
    "delete_obs",
    "delete_sfs",
    "delete_sfs30",
];

fn cluster_url(cce: &ServiceClient, cluster_id: &str) -> String {
    cce.service_url(&format!("clusters/{}", cluster_id))
}

/// Report `COMPLETED` once the phase is one of `targets`, `PENDING` otherwise
///
/// A 404 also counts as `COMPLETED`; delete flows wait on that.
async fn refresh_cluster(
    cce: &ServiceClient,
    cluster_id: &str,
    targets: &[&str],
) -> ProviderResult<Observation<JsonValue>> {
    log::debug!(
        "Expect the status of CCE cluster to be any one of the status list: {:?}",
        targets
    );
    let Some(cluster) = check_deleted(cce.get(&cluster_url(cce, cluster_id)).await)? else {
        log::debug!("The cluster ({}) has been deleted", cluster_id);
        return Ok(Observation::Gone("COMPLETED".to_string()));
    };

    let phase = json_str(&cluster, "/status/phase").unwrap_or_default();
    if INVALID_PHASES.iter().any(|p| phase.eq_ignore_ascii_case(p)) {
        return Err(ProviderError::with_kind(
            ErrorKind::UnexpectedState,
            format!("unexpected status: {}", phase),
        ));
    }
    let state = if targets.contains(&phase) {
        "COMPLETED"
    } else {
        "PENDING"
    };
    Ok(Observation::Found(cluster, state.to_string()))
}

async fn wait_for_phase(
    cce: &ServiceClient,
    cluster_id: &str,
    targets: &[&str],
    delay: Duration,
    timeout: Duration,
) -> ProviderResult<()> {
    cce
        .state_change(&["PENDING"], &["COMPLETED"], timeout)
        .with_delay(delay)
        .with_poll_interval(POLL_INTERVAL)
        .wait_for_state(|| refresh_cluster(cce, cluster_id, targets))
        .await
        .map(|_| ())
}

/// Wait for the creation job and return the id of the new cluster
async fn cluster_id_from_job(
    cce: &ServiceClient,
    job_id: &str,
    timeout: Duration,
) -> ProviderResult<String> {
    let url = cce.service_url(&format!("jobs/{}", job_id));
    let job = cce
        .state_change(&["Initializing", "Running"], &["Success"], timeout)
        .with_delay(Duration::from_secs(150))
        .with_poll_interval(POLL_INTERVAL)
        .wait_for_state(|| async {
            let job = cce.get(&url).await?;
            let phase = json_str(&job, "/status/phase").unwrap_or_default().to_string();
            if phase == "Failed" {
                let reason = json_str(&job, "/status/reason").unwrap_or("unknown reason");
                return Err(ProviderError::with_kind(
                    ErrorKind::UnexpectedState,
                    format!("job failed: {}", reason),
                ));
            }
            Ok(Observation::Found(job, phase))
        })
        .await
        .map_err(|e| e.context(format!("error waiting for job ({}) to become success", job_id)))?;

    job.as_ref()
        .and_then(|job| json_str(job, "/spec/clusterUID"))
        .map(str::to_string)
        .ok_or_else(|| ProviderError::new("error fetching CCE cluster ID"))
}

fn create_body(resource: &Resource, enterprise_project_id: Option<String>) -> JsonValue {
    let get = |name: &str| resource.get_str(name).filter(|v| !v.is_empty());

    let mut metadata = Map::new();
    metadata.insert("name".to_string(), json!(get("name")));
    if let Some(alias) = get("alias") {
        metadata.insert("alias".to_string(), json!(alias));
    }

    let mut host_network = Map::new();
    host_network.insert("vpc".to_string(), json!(get("vpc_id")));
    host_network.insert("subnet".to_string(), json!(get("subnet_id")));
    if let Some(sg) = get("security_group_id") {
        host_network.insert("SecurityGroup".to_string(), json!(sg));
    }

    let mut container_network = Map::new();
    container_network.insert("mode".to_string(), json!(get("container_network_type")));
    if let Some(cidrs) = get("container_network_cidr") {
        let cidrs: Vec<JsonValue> = cidrs
            .split(',')
            .map(|cidr| json!({ "cidr": cidr.trim() }))
            .collect();
        container_network.insert("cidrs".to_string(), JsonValue::Array(cidrs));
    }

    let mut spec = Map::new();
    spec.insert("type".to_string(), json!(get("cluster_type").unwrap_or("VirtualMachine")));
    spec.insert("flavor".to_string(), json!(get("flavor_id")));
    for (name, field) in [
        ("cluster_version", "version"),
        ("description", "description"),
        ("kube_proxy_mode", "kubeProxyMode"),
    ] {
        if let Some(value) = get(name) {
            spec.insert(field.to_string(), json!(value));
        }
    }
    spec.insert("hostNetwork".to_string(), JsonValue::Object(host_network));
    spec.insert("containerNetwork".to_string(), JsonValue::Object(container_network));
    if let Some(cidr) = get("service_network_cidr") {
        spec.insert("serviceNetwork".to_string(), json!({ "IPv4CIDR": cidr }));
    }
    spec.insert(
        "authentication".to_string(),
        json!({ "mode": get("authentication_mode").unwrap_or("rbac") }),
    );
    if let Some(eps) = enterprise_project_id {
        spec.insert("extendParam".to_string(), json!({ "enterpriseProjectId": eps }));
    }
    let tags = expand_tags(resource.attributes.get("tags"));
    if !tags.is_empty() {
        spec.insert("clusterTags".to_string(), JsonValue::Array(tags));
    }

    json!({
        "kind": "Cluster",
        "apiVersion": "v3",
        "metadata": metadata,
        "spec": spec,
    })
}

pub async fn create(client: &Client, resource: &Resource) -> ProviderResult<State> {
    let id = &resource.id;
    let region = get_region(&resource.attributes, client.region());
    let cce = client.service_client("cce", &region).await?;
    let timeout = operation_timeout(&resource.attributes, &schema(), Operation::Create);

    let eps = get_enterprise_project_id(resource, client.config().enterprise_project_id.as_deref());
    let body = create_body(resource, eps);
    log::debug!("Create CCE cluster options: {}", body);
    let response = cce
        .post(&cce.service_url("clusters"), &body)
        .await
        .context_for(id, "error creating CCE cluster")?;

    let job_id = json_str(&response, "/status/jobID").ok_or_else(|| {
        ProviderError::new(format!(
            "error fetching job ID after creating CCE cluster: {}",
            resource.get_str("name").unwrap_or_default()
        ))
        .for_resource(id.clone())
    })?;
    let cluster_id = cluster_id_from_job(&cce, job_id, timeout)
        .await
        .context_for(id, "error creating CCE cluster")?;
    log::info!("CCE cluster ID: {}", cluster_id);

    finish_create(client, resource, &cce, &cluster_id)
        .await
        .map_err(keep_created(resource, &cluster_id, &region))
}

/// Wait for a new cluster and apply the settings that need its ID
async fn finish_create(
    client: &Client,
    resource: &Resource,
    cce: &ServiceClient,
    cluster_id: &str,
) -> ProviderResult<State> {
    let id = &resource.id;
    let timeout = operation_timeout(&resource.attributes, &schema(), Operation::Create);

    log::debug!("Waiting for CCE cluster ({}) to become available", cluster_id);
    wait_for_phase(cce, cluster_id, &["Available"], Duration::from_secs(20), timeout)
        .await
        .context_for(id, "error creating CCE cluster")?;

    if resource.get_bool("hibernate") == Some(true) {
        hibernate(cce, cluster_id, timeout)
            .await
            .context_for(id, "error hibernating CCE cluster")?;
    }

    read(client, id, cluster_id, &resource.attributes).await
}

pub async fn read(
    client: &Client,
    id: &ResourceId,
    identifier: &str,
    known: &HashMap<String, Value>,
) -> ProviderResult<State> {
    let region = get_region(known, client.region());
    let cce = client.service_client("cce", &region).await?;

    let cluster = check_deleted(cce.get(&cluster_url(&cce, identifier)).await)
        .context_for(id, "error retrieving CCE cluster")?;
    let Some(cluster) = cluster else {
        log::warn!("CCE cluster ({}) not found, removing from state", identifier);
        return Ok(State::not_found(id.clone()));
    };
    log::debug!("Retrieved CCE cluster {}: {}", identifier, cluster);

    let mut attributes = flatten_cluster(&cluster);
    if let Some(delete_all) = known.get("delete_all") {
        attributes.insert("delete_all".to_string(), delete_all.clone());
    }
    Ok(existing(id, identifier, &region, attributes))
}

fn flatten_cluster(cluster: &JsonValue) -> HashMap<String, Value> {
    let mut attributes = HashMap::new();
    for (name, pointer) in [
        ("name", "/metadata/name"),
        ("alias", "/metadata/alias"),
        ("status", "/status/phase"),
        ("flavor_id", "/spec/flavor"),
        ("cluster_version", "/spec/version"),
        ("cluster_type", "/spec/type"),
        ("description", "/spec/description"),
        ("vpc_id", "/spec/hostNetwork/vpc"),
        ("subnet_id", "/spec/hostNetwork/subnet"),
        ("security_group_id", "/spec/hostNetwork/SecurityGroup"),
        ("container_network_type", "/spec/containerNetwork/mode"),
        ("authentication_mode", "/spec/authentication/mode"),
        ("enterprise_project_id", "/spec/extendParam/enterpriseProjectId"),
        ("service_network_cidr", "/spec/serviceNetwork/IPv4CIDR"),
        ("kube_proxy_mode", "/spec/kubeProxyMode"),
        ("category", "/spec/category"),
    ] {
        set_attr(&mut attributes, name, cluster.pointer(pointer));
    }

    // Newer clusters list several CIDRs, older ones a single `cidr`
    let cidrs: Vec<&str> = cluster
        .pointer("/spec/containerNetwork/cidrs")
        .and_then(JsonValue::as_array)
        .map(|cidrs| {
            cidrs
                .iter()
                .filter_map(|c| c.get("cidr").and_then(JsonValue::as_str))
                .collect()
        })
        .unwrap_or_default();
    if !cidrs.is_empty() {
        attributes.insert(
            "container_network_cidr".to_string(),
            Value::String(cidrs.join(",")),
        );
    } else {
        set_attr(
            &mut attributes,
            "container_network_cidr",
            cluster.pointer("/spec/containerNetwork/cidr"),
        );
    }

    let tags = cluster
        .pointer("/spec/clusterTags")
        .and_then(JsonValue::as_array)
        .map(|tags| flatten_tags(tags))
        .unwrap_or_default();
    attributes.insert("tags".to_string(), Value::Map(tags));

    let hibernating = json_str(cluster, "/status/phase") == Some("Hibernation");
    attributes.insert("hibernate".to_string(), Value::Bool(hibernating));
    attributes
}

pub async fn update(
    client: &Client,
    id: &ResourceId,
    identifier: &str,
    from: &State,
    to: &Resource,
) -> ProviderResult<State> {
    let region = get_region(&to.attributes, client.region());
    let cce = client.service_client("cce", &region).await?;
    let timeout = operation_timeout(&to.attributes, &schema(), Operation::Update);

    if has_changes(from, to, &["alias", "description", "security_group_id"]) {
        let mut body = Map::new();
        if has_change(from, to, "alias") {
            body.insert(
                "metadata".to_string(),
                json!({ "alias": to.get_str("alias").unwrap_or_default() }),
            );
        }
        let mut spec = Map::new();
        if has_change(from, to, "description") {
            spec.insert(
                "description".to_string(),
                json!(to.get_str("description").unwrap_or_default()),
            );
        }
        if has_change(from, to, "security_group_id") {
            spec.insert(
                "hostNetwork".to_string(),
                json!({ "SecurityGroup": to.get_str("security_group_id").unwrap_or_default() }),
            );
        }
        body.insert("spec".to_string(), JsonValue::Object(spec));

        log::debug!("Update CCE cluster ({}) options: {:?}", identifier, body);
        cce.put(&cluster_url(&cce, identifier), &JsonValue::Object(body))
            .await
            .context_for(id, "error updating CCE cluster")?;
    }

    if has_change(from, to, "hibernate") {
        if to.get_bool("hibernate") == Some(true) {
            hibernate(&cce, identifier, timeout)
                .await
                .context_for(id, "error hibernating CCE cluster")?;
        } else {
            awake(&cce, identifier, timeout)
                .await
                .context_for(id, "error awaking CCE cluster")?;
        }
    }

    let (removed, added) = diff_tags(from.attributes.get("tags"), to.attributes.get("tags"));
    if !removed.is_empty() {
        update_tags(&cce, identifier, "delete", removed)
            .await
            .context_for(id, "error deleting tags from CCE cluster")?;
    }
    if !added.is_empty() {
        update_tags(&cce, identifier, "create", added)
            .await
            .context_for(id, "error adding tags to CCE cluster")?;
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
    let cce = client.service_client("cce", &region).await?;

    let mut url = cluster_url(&cce, identifier);
    let delete_all = known
        .get("delete_all")
        .and_then(Value::as_str)
        .filter(|v| *v != "false");
    if let Some(option) = delete_all {
        let query: Vec<String> = DELETE_OPTIONS
            .iter()
            .map(|name| format!("{}={}", name, option))
            .collect();
        url = format!("{}?{}", url, query.join("&"));
    }

    if check_deleted(cce.delete(&url).await)
        .context_for(id, "error deleting CCE cluster")?
        .is_none()
    {
        log::info!("CCE cluster ({}) is already deleted", identifier);
        return Ok(());
    }

    let timeout = operation_timeout(known, &schema(), Operation::Delete);
    wait_for_phase(&cce, identifier, &[], Duration::from_secs(60), timeout)
        .await
        .context_for(id, "error deleting CCE cluster")
}

async fn hibernate(cce: &ServiceClient, cluster_id: &str, timeout: Duration) -> ProviderResult<()> {
    cce.post(
        &cce.service_url(&format!("clusters/{}/operation/hibernate", cluster_id)),
        &json!({}),
    )
    .await?;
    log::debug!("Waiting for CCE cluster ({}) to become hibernate", cluster_id);
    wait_for_phase(cce, cluster_id, &["Hibernation"], Duration::from_secs(20), timeout).await
}

async fn awake(cce: &ServiceClient, cluster_id: &str, timeout: Duration) -> ProviderResult<()> {
    cce.post(
        &cce.service_url(&format!("clusters/{}/operation/awake", cluster_id)),
        &json!({}),
    )
    .await?;
    log::debug!("Waiting for CCE cluster ({}) to become available", cluster_id);
    wait_for_phase(cce, cluster_id, &["Available"], Duration::from_secs(100), timeout).await
}

async fn update_tags(
    cce: &ServiceClient,
    cluster_id: &str,
    action: &str,
    tags: Vec<JsonValue>,
) -> Result<JsonValue, ApiError> {
    let url = cce.service_url(&format!("clusters/{}/tags/{}", cluster_id, action));
    cce.post(&url, &json!({ "tags": tags })).await
}
