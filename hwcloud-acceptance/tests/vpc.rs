mod common;

use hwcloud_acceptance::{Check, TestCase, TestStep, random_name, run};
use serde_json::json;

const ADDRESS: &str = "huaweicloud_vpc.test";

fn vpc_config(name: &str, description: &str) -> String {
    json!({
        "resource": {
            "huaweicloud_vpc": {
                "test": {
                    "name": name,
                    "cidr": "192.168.0.0/16",
                    "description": description,
                    "tags": { "foo": "bar", "key": "value" }
                }
            }
        }
    })
    .to_string()
}

#[tokio::test]
async fn vpc_basic() {
    let Some((_, provider)) = common::setup(&[]) else {
        return;
    };
    let name = random_name();
    let updated = format!("{}-update", name);

    let case = TestCase::new()
        .step(TestStep::apply(vpc_config(&name, "created by acc test")).checks([
            Check::attr(ADDRESS, "name", name.as_str()),
            Check::attr(ADDRESS, "cidr", "192.168.0.0/16"),
            Check::attr(ADDRESS, "status", "OK"),
            Check::attr(ADDRESS, "shared", "false"),
            Check::attr(ADDRESS, "tags.foo", "bar"),
            Check::attr_set(ADDRESS, "id"),
        ]))
        .step(TestStep::import(ADDRESS))
        .step(TestStep::apply(vpc_config(&updated, "updated by acc test")).checks([
            Check::attr(ADDRESS, "name", updated.as_str()),
            Check::attr(ADDRESS, "description", "updated by acc test"),
            Check::attr(ADDRESS, "cidr", "192.168.0.0/16"),
        ]));

    run(provider, case).await.unwrap();
}

#[tokio::test]
async fn vpc_data_source_by_name() {
    let Some((_, provider)) = common::setup(&[]) else {
        return;
    };
    let config = json!({
        "resource": {
            "huaweicloud_vpc": {
                "test": { "name": random_name(), "cidr": "172.16.0.0/16" }
            }
        },
        "data": {
            "huaweicloud_vpc": {
                "by_name": { "name": "${huaweicloud_vpc.test.name}" }
            }
        }
    })
    .to_string();

    let case = TestCase::new().step(TestStep::apply(config).checks([
        Check::attr_pair("data.huaweicloud_vpc.by_name", "id", ADDRESS, "id"),
        Check::attr("data.huaweicloud_vpc.by_name", "cidr", "172.16.0.0/16"),
        Check::attr("data.huaweicloud_vpc.by_name", "status", "OK"),
    ]));

    run(provider, case).await.unwrap();
}
