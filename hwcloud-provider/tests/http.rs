//! CRUD flows against a mocked HuaweiCloud API

use std::collections::HashMap;
use std::time::Duration;

use hwcloud_core::provider::{ErrorKind, Provider};
use hwcloud_core::resource::{Resource, ResourceId, State, Value};
use hwcloud_provider::{Config, HuaweiCloudProvider};
use serde_json::json;
use wiremock::matchers::{header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn endpoints(server: &MockServer) -> HashMap<String, String> {
    ["vpc", "vpcv2", "kms", "dns", "dns_region", "cce"]
        .iter()
        .map(|s| (s.to_string(), format!("{}/", server.uri())))
        .collect()
}

fn token_provider(server: &MockServer) -> HuaweiCloudProvider {
    HuaweiCloudProvider::new(Config {
        region: "cn-north-4".to_string(),
        token: Some("tok".to_string()),
        project_id: Some("p-1".to_string()),
        endpoints: endpoints(server),
        max_retries: 0,
        max_poll_wait: Some(Duration::from_millis(10)),
        ..Config::default()
    })
    .unwrap()
}

fn vpc_body(status: &str) -> serde_json::Value {
    json!({
        "vpc": {
            "id": "vpc-1",
            "name": "vpc-test",
            "cidr": "192.168.0.0/16",
            "description": "",
            "status": status,
            "enterprise_project_id": "0",
            "routes": []
        }
    })
}

/// Path and JSON body of every request sent to the mock, in order
async fn sent(server: &MockServer) -> Vec<(String, serde_json::Value)> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| {
            let body = serde_json::from_slice(&r.body).unwrap_or(serde_json::Value::Null);
            (r.url.path().to_string(), body)
        })
        .collect()
}

/// Bodies of the requests sent to `request_path`
async fn bodies(server: &MockServer, request_path: &str) -> Vec<serde_json::Value> {
    sent(server)
        .await
        .into_iter()
        .filter(|(p, _)| p == request_path)
        .map(|(_, body)| body)
        .collect()
}

fn strings(pairs: &[(&str, &str)]) -> HashMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect()
}

fn tags(pairs: &[(&str, &str)]) -> Value {
    Value::Map(strings(pairs))
}

async fn mount_ok(server: &MockServer, http_method: &str, request_path: &str) {
    Mock::given(method(http_method))
        .and(path(request_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(server)
        .await;
}

async fn mount_vpc_read(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/p-1/vpcs/vpc-1"))
        .and(header("X-Auth-Token", "tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vpc_body("OK")))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2.0/p-1/vpcs/vpc-1/tags"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "tags": [{ "key": "foo", "value": "bar" }] })),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn read_vpc_maps_response_and_tags() {
    let server = MockServer::start().await;
    mount_vpc_read(&server).await;

    let provider = token_provider(&server);
    let id = ResourceId::new("huaweicloud_vpc", "test");
    let state = provider.read(&id, Some("vpc-1"), &HashMap::new()).await.unwrap();

    assert!(state.exists);
    assert_eq!(state.identifier.as_deref(), Some("vpc-1"));
    assert_eq!(state.attributes["status"], Value::String("OK".into()));
    assert_eq!(state.attributes["cidr"], Value::String("192.168.0.0/16".into()));
    assert_eq!(state.attributes["shared"], Value::Bool(false));
    assert_eq!(state.attributes["region"], Value::String("cn-north-4".into()));
    assert_eq!(state.lookup("tags.foo"), Some(&Value::String("bar".into())));
}

#[tokio::test]
async fn read_missing_vpc_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/p-1/vpcs/vpc-gone"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error_code": "VPC.0202",
            "error_msg": "Query resource by id vpc-gone fail."
        })))
        .mount(&server)
        .await;

    let provider = token_provider(&server);
    let id = ResourceId::new("huaweicloud_vpc", "test");
    let state = provider.read(&id, Some("vpc-gone"), &HashMap::new()).await.unwrap();
    assert!(!state.exists);
}

#[tokio::test]
async fn api_errors_carry_huaweicloud_code() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/p-1/vpcs/vpc-1"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": "VPC.0101", "message": "Invalid vpc id" }
        })))
        .mount(&server)
        .await;

    let provider = token_provider(&server);
    let id = ResourceId::new("huaweicloud_vpc", "test");
    let err = provider.read(&id, Some("vpc-1"), &HashMap::new()).await.unwrap_err();

    assert_eq!(
        err.kind,
        ErrorKind::Api {
            status: 400,
            code: Some("VPC.0101".to_string())
        }
    );
    assert!(err.to_string().contains("Invalid vpc id"));
    assert_eq!(err.resource_id, Some(id));
}

#[tokio::test]
async fn create_vpc_waits_for_ok() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/p-1/vpcs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vpc_body("CREATING")))
        .expect(1)
        .mount(&server)
        .await;
    mount_vpc_read(&server).await;

    let provider = token_provider(&server);
    let resource = Resource::new("huaweicloud_vpc", "test")
        .with_attribute("name", Value::String("vpc-test".into()))
        .with_attribute("cidr", Value::String("192.168.0.0/16".into()));
    let state = provider.create(&resource).await.unwrap();

    assert_eq!(state.identifier.as_deref(), Some("vpc-1"));
    assert_eq!(state.attributes["status"], Value::String("OK".into()));

    let requests = server.received_requests().await.unwrap();
    let create: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(create["vpc"]["name"], "vpc-test");
    assert_eq!(create["vpc"]["cidr"], "192.168.0.0/16");
}

#[tokio::test]
async fn delete_of_missing_vpc_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v1/p-1/vpcs/vpc-1"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let provider = token_provider(&server);
    let id = ResourceId::new("huaweicloud_vpc", "test");
    provider.delete(&id, "vpc-1", &HashMap::new()).await.unwrap();
}

#[tokio::test]
async fn vpc_data_source_filters_by_name() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/p-1/vpcs"))
        .and(query_param("limit", "2000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "vpcs": [
                { "id": "vpc-1", "name": "vpc-test", "cidr": "192.168.0.0/16", "status": "OK" },
                { "id": "vpc-2", "name": "vpc-other", "cidr": "10.0.0.0/8", "status": "OK" }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2.0/p-1/vpcs/vpc-1/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "tags": [] })))
        .mount(&server)
        .await;

    let provider = token_provider(&server);
    let lookup = Resource::new("huaweicloud_vpc", "by_name")
        .with_attribute("name", Value::String("vpc-test".into()))
        .with_read_only(true);
    let state = provider.read_data_source(&lookup).await.unwrap();
    assert_eq!(state.identifier.as_deref(), Some("vpc-1"));
    assert_eq!(state.attributes["cidr"], Value::String("192.168.0.0/16".into()));
}

#[tokio::test]
async fn read_kms_key_reports_enabled_and_rotation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1.0/p-1/kms/describe-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "key_info": {
                "key_id": "key-1",
                "key_alias": "kms-test",
                "key_spec": "AES_256",
                "key_state": "2",
                "origin": "kms"
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1.0/p-1/kms/get-key-rotation-status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "key_rotation_enabled": true,
            "rotation_interval": 365,
            "number_of_rotations": 0
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/p-1/kms/key-1/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "tags": [] })))
        .mount(&server)
        .await;

    let provider = token_provider(&server);
    let id = ResourceId::new("huaweicloud_kms_key", "test");
    let known = HashMap::from([("pending_days".to_string(), Value::String("7".into()))]);
    let state = provider.read(&id, Some("key-1"), &known).await.unwrap();

    assert_eq!(state.attributes["is_enabled"], Value::Bool(true));
    assert_eq!(state.attributes["key_algorithm"], Value::String("AES_256".into()));
    assert_eq!(state.attributes["rotation_enabled"], Value::Bool(true));
    assert_eq!(state.attributes["rotation_interval"], Value::Int(365));
    assert_eq!(state.attributes["pending_days"], Value::String("7".into()));
}

#[tokio::test]
async fn kms_key_pending_deletion_is_gone() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1.0/p-1/kms/describe-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "key_info": { "key_id": "key-1", "key_state": "4" }
        })))
        .mount(&server)
        .await;

    let provider = token_provider(&server);
    let id = ResourceId::new("huaweicloud_kms_key", "test");
    let state = provider.read(&id, Some("key-1"), &HashMap::new()).await.unwrap();
    assert!(!state.exists);

    // Deleting a key already scheduled for deletion is a no-op
    provider.delete(&id, "key-1", &HashMap::new()).await.unwrap();
    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| !r.url.path().ends_with("schedule-key-deletion")));
}

#[tokio::test]
async fn aksk_requests_are_signed_and_resolve_project_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/projects"))
        .and(query_param("name", "cn-north-4"))
        .and(header_exists("Authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "projects": [{ "id": "p-1", "name": "cn-north-4" }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/p-1/vpcs/vpc-1"))
        .and(header_exists("Authorization"))
        .and(header_exists("X-Sdk-Date"))
        .and(header("X-Project-Id", "p-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vpc_body("OK")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2.0/p-1/vpcs/vpc-1/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "tags": [] })))
        .mount(&server)
        .await;

    let provider = HuaweiCloudProvider::new(Config {
        region: "cn-north-4".to_string(),
        access_key: Some("ak".to_string()),
        secret_key: Some("sk".to_string()),
        auth_url: Some(format!("{}/v3", server.uri())),
        endpoints: endpoints(&server),
        ..Config::default()
    })
    .unwrap();

    let id = ResourceId::new("huaweicloud_vpc", "test");
    let first = provider.read(&id, Some("vpc-1"), &HashMap::new()).await.unwrap();
    let second = provider.read(&id, Some("vpc-1"), &HashMap::new()).await.unwrap();
    assert!(first.exists && second.exists);
}

#[tokio::test]
async fn read_public_dns_zone() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/zones/zone-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "zone-1",
            "name": "example.com.",
            "email": "admin@example.com",
            "ttl": 300,
            "zone_type": "public",
            "status": "ACTIVE",
            "serial": 1,
            "masters": []
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/p-1/DNS-public_zone/zone-1/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "tags": [] })))
        .mount(&server)
        .await;

    let provider = token_provider(&server);
    let id = ResourceId::new("huaweicloud_dns_zone", "test");
    let state = provider.read(&id, Some("zone-1"), &HashMap::new()).await.unwrap();
    assert!(state.exists);
    assert_eq!(state.attributes["status"], Value::String("ENABLE".into()));
    assert_eq!(state.attributes["ttl"], Value::Int(300));
}

#[tokio::test]
async fn failed_vpc_creation_keeps_the_new_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/p-1/vpcs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "vpc": { "id": "vpc-leaked", "status": "CREATING" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/p-1/vpcs/vpc-leaked"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "vpc": { "id": "vpc-leaked", "status": "ERROR" }
        })))
        .mount(&server)
        .await;

    let provider = token_provider(&server);
    let resource = Resource::new("huaweicloud_vpc", "test")
        .with_attribute("name", Value::String("vpc-test".into()))
        .with_attribute("cidr", Value::String("192.168.0.0/16".into()));
    let err = provider.create(&resource).await.unwrap_err();

    assert_eq!(err.resource_id, Some(resource.id.clone()));
    let partial = err.partial_state().expect("the created VPC is kept");
    assert_eq!(partial.identifier.as_deref(), Some("vpc-leaked"));
    assert!(partial.exists);
    assert!(partial.tainted);
    assert_eq!(partial.attributes["name"], Value::String("vpc-test".into()));
    assert_eq!(partial.attributes["region"], Value::String("cn-north-4".into()));
}

#[tokio::test]
async fn rejected_vpc_creation_has_nothing_to_keep() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/p-1/vpcs"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error_code": "VPC.0003",
            "error_msg": "cidr is invalid"
        })))
        .mount(&server)
        .await;

    let provider = token_provider(&server);
    let resource = Resource::new("huaweicloud_vpc", "test")
        .with_attribute("name", Value::String("vpc-test".into()))
        .with_attribute("cidr", Value::String("192.168.0.0/16".into()));
    let err = provider.create(&resource).await.unwrap_err();
    assert!(err.partial_state().is_none());
}

#[tokio::test]
async fn removed_vpc_description_is_cleared() {
    let server = MockServer::start().await;
    mount_ok(&server, "PUT", "/v1/p-1/vpcs/vpc-1").await;
    mount_vpc_read(&server).await;

    let provider = token_provider(&server);
    let id = ResourceId::new("huaweicloud_vpc", "test");
    let from = State::existing(
        id.clone(),
        strings(&[
            ("name", "vpc-test"),
            ("cidr", "192.168.0.0/16"),
            ("description", "created by hand"),
        ]),
    )
    .with_identifier("vpc-1");
    let to = Resource::new("huaweicloud_vpc", "test")
        .with_attribute("name", Value::String("vpc-test".into()))
        .with_attribute("cidr", Value::String("192.168.0.0/16".into()));
    provider.update(&id, "vpc-1", &from, &to).await.unwrap();

    assert_eq!(
        bodies(&server, "/v1/p-1/vpcs/vpc-1").await[0],
        json!({ "vpc": { "name": "vpc-test", "cidr": "192.168.0.0/16", "description": "" } })
    );
}

fn kms_from_state() -> State {
    let mut attributes = strings(&[
        ("key_alias", "kms-old"),
        ("key_description", "old description"),
        ("key_algorithm", "AES_256"),
    ]);
    attributes.insert("is_enabled".to_string(), Value::Bool(true));
    attributes.insert("rotation_enabled".to_string(), Value::Bool(false));
    attributes.insert("rotation_interval".to_string(), Value::Int(365));
    attributes.insert("tags".to_string(), tags(&[("env", "dev"), ("team", "a")]));
    State::existing(ResourceId::new("huaweicloud_kms_key", "test"), attributes)
        .with_identifier("key-1")
}

async fn mount_kms_key(server: &MockServer, key_state: &str) {
    Mock::given(method("POST"))
        .and(path("/v1.0/p-1/kms/describe-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "key_info": {
                "key_id": "key-1",
                "key_alias": "kms-new",
                "key_spec": "AES_256",
                "key_state": key_state
            }
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1.0/p-1/kms/get-key-rotation-status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "key_rotation_enabled": false,
            "rotation_interval": 365
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/p-1/kms/key-1/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "tags": [] })))
        .mount(server)
        .await;
}

/// KMS calls that change something, skipping the reads
async fn kms_mutations(server: &MockServer) -> Vec<(String, serde_json::Value)> {
    sent(server)
        .await
        .into_iter()
        .filter(|(p, _)| {
            !p.ends_with("/describe-key")
                && !p.ends_with("/get-key-rotation-status")
                && !p.ends_with("/key-1/tags")
        })
        .collect()
}

#[tokio::test]
async fn kms_update_sends_every_changed_setting() {
    let server = MockServer::start().await;
    mount_kms_key(&server, "3").await;
    for action in [
        "update-key-alias",
        "update-key-description",
        "disable-key",
        "enable-key-rotation",
        "update-key-rotation-interval",
    ] {
        mount_ok(&server, "POST", &format!("/v1.0/p-1/kms/{}", action)).await;
    }
    mount_ok(&server, "POST", "/v1.0/p-1/kms/key-1/tags/action").await;

    let provider = token_provider(&server);
    let from = kms_from_state();
    let to = Resource::new("huaweicloud_kms_key", "test")
        .with_attribute("key_alias", Value::String("kms-new".into()))
        .with_attribute("key_description", Value::String("new description".into()))
        .with_attribute("is_enabled", Value::Bool(false))
        .with_attribute("rotation_enabled", Value::Bool(true))
        .with_attribute("rotation_interval", Value::Int(90))
        .with_attribute("tags", tags(&[("env", "prod"), ("team", "a")]));
    let state = provider.update(&from.id, "key-1", &from, &to).await.unwrap();
    assert_eq!(state.attributes["is_enabled"], Value::Bool(false));

    let base = "/v1.0/p-1/kms";
    assert_eq!(
        kms_mutations(&server).await,
        vec![
            (
                format!("{}/update-key-alias", base),
                json!({ "key_id": "key-1", "key_alias": "kms-new" })
            ),
            (
                format!("{}/update-key-description", base),
                json!({ "key_id": "key-1", "key_description": "new description" })
            ),
            (format!("{}/disable-key", base), json!({ "key_id": "key-1" })),
            (format!("{}/enable-key-rotation", base), json!({ "key_id": "key-1" })),
            (
                format!("{}/update-key-rotation-interval", base),
                json!({ "key_id": "key-1", "rotation_interval": 90 })
            ),
            (
                format!("{}/key-1/tags/action", base),
                json!({ "action": "delete", "tags": [{ "key": "env", "value": "dev" }] })
            ),
            (
                format!("{}/key-1/tags/action", base),
                json!({ "action": "create", "tags": [{ "key": "env", "value": "prod" }] })
            ),
        ]
    );
}

#[tokio::test]
async fn kms_update_of_one_setting_leaves_the_rest_alone() {
    let server = MockServer::start().await;
    mount_kms_key(&server, "2").await;
    mount_ok(&server, "POST", "/v1.0/p-1/kms/update-key-alias").await;

    let provider = token_provider(&server);
    let from = kms_from_state();
    let to = Resource::new("huaweicloud_kms_key", "test")
        .with_attribute("key_alias", Value::String("kms-new".into()))
        .with_attribute("key_description", Value::String("old description".into()))
        .with_attribute("tags", tags(&[("env", "dev"), ("team", "a")]));
    provider.update(&from.id, "key-1", &from, &to).await.unwrap();

    assert_eq!(
        kms_mutations(&server).await,
        vec![(
            "/v1.0/p-1/kms/update-key-alias".to_string(),
            json!({ "key_id": "key-1", "key_alias": "kms-new" })
        )]
    );
}

#[tokio::test]
async fn kms_delete_schedules_with_pending_days() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1.0/p-1/kms/describe-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "key_info": { "key_id": "key-1", "key_state": "2" }
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1.0/p-1/kms/describe-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "key_info": { "key_id": "key-1", "key_state": "4" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1.0/p-1/kms/schedule-key-deletion"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "key_id": "key-1",
            "key_state": "4"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = token_provider(&server);
    let id = ResourceId::new("huaweicloud_kms_key", "test");
    let known = strings(&[("pending_days", "30")]);
    provider.delete(&id, "key-1", &known).await.unwrap();

    assert_eq!(
        bodies(&server, "/v1.0/p-1/kms/schedule-key-deletion").await,
        vec![json!({ "key_id": "key-1", "pending_days": "30" })]
    );
}

fn zone_body(status: &str, routers: serde_json::Value) -> serde_json::Value {
    let zone_type = if routers.is_null() { "public" } else { "private" };
    json!({
        "id": "zone-1",
        "name": "example.com.",
        "email": "admin@example.com",
        "ttl": 300,
        "zone_type": zone_type,
        "status": status,
        "routers": routers
    })
}

async fn mount_zone(server: &MockServer, body: serde_json::Value, times: Option<u64>) {
    let mock = Mock::given(method("GET"))
        .and(path("/v2/zones/zone-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body));
    match times {
        Some(n) => mock.up_to_n_times(n).expect(n).mount(server).await,
        None => mock.mount(server).await,
    }
}

#[tokio::test]
async fn dns_create_waits_until_active() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/zones"))
        .respond_with(
            ResponseTemplate::new(202).set_body_json(zone_body("PENDING_CREATE", json!(null))),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_zone(&server, zone_body("PENDING_CREATE", json!(null)), Some(1)).await;
    mount_zone(&server, zone_body("ACTIVE", json!(null)), None).await;
    Mock::given(method("GET"))
        .and(path("/v2/p-1/DNS-public_zone/zone-1/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "tags": [] })))
        .mount(&server)
        .await;

    let provider = token_provider(&server);
    let resource = Resource::new("huaweicloud_dns_zone", "test")
        .with_attribute("name", Value::String("example.com.".into()))
        .with_attribute("email", Value::String("admin@example.com".into()));
    let state = provider.create(&resource).await.unwrap();

    assert_eq!(state.identifier.as_deref(), Some("zone-1"));
    assert_eq!(state.attributes["status"], Value::String("ENABLE".into()));
    assert_eq!(
        bodies(&server, "/v2/zones").await,
        vec![json!({
            "name": "example.com.",
            "email": "admin@example.com",
            "zone_type": "public",
            "ttl": 300
        })]
    );
}

#[tokio::test]
async fn dns_delete_waits_until_gone() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v2/zones/zone-1"))
        .respond_with(
            ResponseTemplate::new(202).set_body_json(zone_body("PENDING_DELETE", json!(null))),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_zone(&server, zone_body("PENDING_DELETE", json!(null)), Some(2)).await;
    Mock::given(method("GET"))
        .and(path("/v2/zones/zone-1"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let provider = token_provider(&server);
    let id = ResourceId::new("huaweicloud_dns_zone", "test");
    provider.delete(&id, "zone-1", &HashMap::new()).await.unwrap();
}

#[tokio::test]
async fn dns_update_sends_changed_fields_status_and_tags() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/v2/zones/zone-1"))
        .respond_with(
            ResponseTemplate::new(202).set_body_json(zone_body("PENDING_UPDATE", json!(null))),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_ok(&server, "PUT", "/v2/zones/zone-1/statuses").await;
    mount_zone(&server, zone_body("DISABLE", json!(null)), None).await;
    mount_ok(&server, "POST", "/v2/p-1/DNS-public_zone/zone-1/tags/action").await;
    Mock::given(method("GET"))
        .and(path("/v2/p-1/DNS-public_zone/zone-1/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "tags": [] })))
        .mount(&server)
        .await;

    let provider = token_provider(&server);
    let id = ResourceId::new("huaweicloud_dns_zone", "test");
    let mut attributes = strings(&[
        ("name", "example.com."),
        ("email", "admin@example.com"),
        ("description", "old"),
        ("zone_type", "public"),
        ("status", "ENABLE"),
    ]);
    attributes.insert("ttl".to_string(), Value::Int(300));
    attributes.insert("tags".to_string(), tags(&[("owner", "ops")]));
    let from = State::existing(id.clone(), attributes).with_identifier("zone-1");
    let to = Resource::new("huaweicloud_dns_zone", "test")
        .with_attribute("name", Value::String("example.com".into()))
        .with_attribute("email", Value::String("dns@example.com".into()))
        .with_attribute("ttl", Value::Int(600))
        .with_attribute("status", Value::String("DISABLE".into()))
        .with_attribute("tags", tags(&[("owner", "dev")]));
    let state = provider.update(&id, "zone-1", &from, &to).await.unwrap();
    assert_eq!(state.attributes["status"], Value::String("DISABLE".into()));

    // The removed description is cleared; the name only differs by its trailing dot
    assert_eq!(
        bodies(&server, "/v2/zones/zone-1").await.into_iter().find(|b| !b.is_null()),
        Some(json!({ "email": "dns@example.com", "ttl": 600, "description": "" }))
    );
    assert_eq!(
        bodies(&server, "/v2/zones/zone-1/statuses").await,
        vec![json!({ "status": "DISABLE" })]
    );
    assert_eq!(
        bodies(&server, "/v2/p-1/DNS-public_zone/zone-1/tags/action").await,
        vec![
            json!({ "action": "delete", "tags": [{ "key": "owner", "value": "ops" }] }),
            json!({ "action": "create", "tags": [{ "key": "owner", "value": "dev" }] }),
        ]
    );
}

#[tokio::test]
async fn dns_update_moves_private_zone_to_another_router() {
    let server = MockServer::start().await;
    let router = |id: &str| {
        json!([{ "router_id": id, "router_region": "cn-north-4", "status": "ACTIVE" }])
    };
    mount_zone(&server, zone_body("ACTIVE", router("vpc-1")), Some(1)).await;
    mount_zone(&server, zone_body("ACTIVE", router("vpc-2")), None).await;
    mount_ok(&server, "POST", "/v2/zones/zone-1/associaterouter").await;
    mount_ok(&server, "POST", "/v2/zones/zone-1/disassociaterouter").await;
    Mock::given(method("GET"))
        .and(path("/v2/p-1/DNS-private_zone/zone-1/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "tags": [] })))
        .mount(&server)
        .await;

    let provider = token_provider(&server);
    let id = ResourceId::new("huaweicloud_dns_zone", "test");
    let router_block = |id: &str| {
        Value::List(vec![Value::Map(strings(&[
            ("router_id", id),
            ("router_region", "cn-north-4"),
        ]))])
    };
    let mut attributes = strings(&[
        ("name", "example.com."),
        ("email", "admin@example.com"),
        ("zone_type", "private"),
        ("status", "ENABLE"),
    ]);
    attributes.insert("ttl".to_string(), Value::Int(300));
    attributes.insert("router".to_string(), router_block("vpc-1"));
    let from = State::existing(id.clone(), attributes).with_identifier("zone-1");
    let to = Resource::new("huaweicloud_dns_zone", "test")
        .with_attribute("name", Value::String("example.com.".into()))
        .with_attribute("zone_type", Value::String("private".into()))
        .with_attribute("router", router_block("vpc-2"));
    provider.update(&id, "zone-1", &from, &to).await.unwrap();

    assert_eq!(
        bodies(&server, "/v2/zones/zone-1/associaterouter").await,
        vec![json!({ "router": { "router_id": "vpc-2", "router_region": "cn-north-4" } })]
    );
    assert_eq!(
        bodies(&server, "/v2/zones/zone-1/disassociaterouter").await,
        vec![json!({ "router": { "router_id": "vpc-1", "router_region": "cn-north-4" } })]
    );
    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.method.to_string() != "PATCH"));
}

fn cluster_body(phase: &str) -> serde_json::Value {
    json!({
        "metadata": { "uid": "c-1", "name": "cce-test" },
        "spec": {
            "type": "VirtualMachine",
            "flavor": "cce.s1.small",
            "hostNetwork": { "vpc": "vpc-1", "subnet": "subnet-1" },
            "containerNetwork": { "mode": "overlay_l2" },
            "authentication": { "mode": "rbac" }
        },
        "status": { "phase": phase }
    })
}

fn cluster_resource() -> Resource {
    [
        ("name", "cce-test"),
        ("flavor_id", "cce.s1.small"),
        ("vpc_id", "vpc-1"),
        ("subnet_id", "subnet-1"),
        ("container_network_type", "overlay_l2"),
    ]
    .iter()
    .fold(Resource::new("huaweicloud_cce_cluster", "test"), |r, (k, v)| {
        r.with_attribute(*k, Value::String(v.to_string()))
    })
}

fn cluster_state(hibernating: bool) -> State {
    let mut attributes = strings(&[
        ("name", "cce-test"),
        ("flavor_id", "cce.s1.small"),
        ("vpc_id", "vpc-1"),
        ("subnet_id", "subnet-1"),
        ("container_network_type", "overlay_l2"),
        ("cluster_type", "VirtualMachine"),
        ("authentication_mode", "rbac"),
    ]);
    attributes.insert("hibernate".to_string(), Value::Bool(hibernating));
    attributes.insert("tags".to_string(), tags(&[]));
    State::existing(ResourceId::new("huaweicloud_cce_cluster", "test"), attributes)
        .with_identifier("c-1")
}

const CLUSTER_PATH: &str = "/api/v3/projects/p-1/clusters/c-1";

#[tokio::test]
async fn cce_create_follows_job_to_available_cluster() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v3/projects/p-1/clusters"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "status": { "jobID": "job-1" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/projects/p-1/jobs/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": { "phase": "Running" }
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/projects/p-1/jobs/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "spec": { "clusterUID": "c-1" },
            "status": { "phase": "Success" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CLUSTER_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(cluster_body("Creating")))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CLUSTER_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(cluster_body("Available")))
        .mount(&server)
        .await;

    let provider = token_provider(&server);
    let state = provider.create(&cluster_resource()).await.unwrap();

    assert_eq!(state.identifier.as_deref(), Some("c-1"));
    assert_eq!(state.attributes["status"], Value::String("Available".into()));
    assert_eq!(state.attributes["hibernate"], Value::Bool(false));
    assert_eq!(
        bodies(&server, "/api/v3/projects/p-1/clusters").await,
        vec![json!({
            "kind": "Cluster",
            "apiVersion": "v3",
            "metadata": { "name": "cce-test" },
            "spec": {
                "type": "VirtualMachine",
                "flavor": "cce.s1.small",
                "hostNetwork": { "vpc": "vpc-1", "subnet": "subnet-1" },
                "containerNetwork": { "mode": "overlay_l2" },
                "authentication": { "mode": "rbac" }
            }
        })]
    );
}

#[tokio::test]
async fn cce_update_hibernates_cluster() {
    let server = MockServer::start().await;
    mount_ok(&server, "POST", &format!("{}/operation/hibernate", CLUSTER_PATH)).await;
    Mock::given(method("GET"))
        .and(path(CLUSTER_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(cluster_body("Hibernation")))
        .mount(&server)
        .await;

    let provider = token_provider(&server);
    let from = cluster_state(false);
    let to = cluster_resource().with_attribute("hibernate", Value::Bool(true));
    let state = provider.update(&from.id, "c-1", &from, &to).await.unwrap();

    assert_eq!(state.attributes["hibernate"], Value::Bool(true));
    assert_eq!(
        bodies(&server, &format!("{}/operation/hibernate", CLUSTER_PATH)).await,
        vec![json!({})]
    );
    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.method.to_string() != "PUT"));
}

#[tokio::test]
async fn cce_update_wakes_cluster() {
    let server = MockServer::start().await;
    mount_ok(&server, "POST", &format!("{}/operation/awake", CLUSTER_PATH)).await;
    Mock::given(method("GET"))
        .and(path(CLUSTER_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(cluster_body("Hibernation")))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CLUSTER_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(cluster_body("Available")))
        .mount(&server)
        .await;

    let provider = token_provider(&server);
    let from = cluster_state(true);
    let to = cluster_resource().with_attribute("hibernate", Value::Bool(false));
    let state = provider.update(&from.id, "c-1", &from, &to).await.unwrap();

    assert_eq!(state.attributes["hibernate"], Value::Bool(false));
    assert_eq!(
        bodies(&server, &format!("{}/operation/awake", CLUSTER_PATH)).await,
        vec![json!({})]
    );
}
