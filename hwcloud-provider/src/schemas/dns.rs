//! DNS zone resource schema

use std::time::Duration;

use hwcloud_core::resource::Value;
use hwcloud_core::schema::{AttributeSchema, AttributeType, ResourceSchema, Timeouts, types};

use super::{bounded_string, check_length, computed_string};

pub const RESOURCE_TYPE: &str = "huaweicloud_dns_zone";

/// Zone names compare equal with or without the trailing dot
pub fn same_zone_name(a: &Value, b: &Value) -> bool {
    match (a.as_str(), b.as_str()) {
        (Some(a), Some(b)) => a.trim_end_matches('.') == b.trim_end_matches('.'),
        _ => a == b,
    }
}

/// Routers compare by id; `router_region` defaults to the zone region
pub fn same_routers(a: &Value, b: &Value) -> bool {
    fn ids(value: &Value) -> Option<Vec<&str>> {
        let Value::List(items) = value else {
            return None;
        };
        let mut ids: Vec<&str> = items
            .iter()
            .filter_map(|item| item.as_map()?.get("router_id")?.as_str())
            .collect();
        ids.sort_unstable();
        Some(ids)
    }
    ids(a) == ids(b)
}

/// Each router is a map with `router_id` and an optional `router_region`
fn routers() -> AttributeType {
    AttributeType::Custom {
        name: "Routers".to_string(),
        base: Box::new(AttributeType::List(Box::new(AttributeType::Map(Box::new(
            AttributeType::String,
        ))))),
        validate: |value| {
            let Value::List(items) = value else {
                return Err("Expected list".to_string());
            };
            for item in items {
                let Value::Map(router) = item else {
                    return Err("Expected router block".to_string());
                };
                if !router.contains_key("router_id") {
                    return Err("router_id is required in every router block".to_string());
                }
                if let Some(key) = router
                    .keys()
                    .find(|k| !matches!(k.as_str(), "router_id" | "router_region"))
                {
                    return Err(format!("Unknown router argument '{}'", key));
                }
            }
            Ok(())
        },
    }
}

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(RESOURCE_TYPE)
        .with_description("Public or private DNS zone")
        .with_timeouts(Timeouts {
            create: Some(Duration::from_secs(10 * 60)),
            update: Some(Duration::from_secs(10 * 60)),
            delete: Some(Duration::from_secs(10 * 60)),
        })
        .attribute(super::region())
        .attribute(
            AttributeSchema::new("name", bounded_string("ZoneName", |v| check_length(v, 1, 255)))
                .required()
                .force_new()
                .with_diff_suppress(same_zone_name)
                .with_description("Zone name, e.g. \"example.com.\""),
        )
        .attribute(AttributeSchema::new("email", AttributeType::String).optional_computed())
        .attribute(
            AttributeSchema::new(
                "zone_type",
                AttributeType::Enum(vec!["public".to_string(), "private".to_string()]),
            )
            .force_new()
            .with_default(Value::String("public".to_string())),
        )
        .attribute(
            AttributeSchema::new("ttl", types::positive_int()).with_default(Value::Int(300)),
        )
        .attribute(AttributeSchema::new(
            "description",
            bounded_string("ZoneDescription", |v| check_length(v, 0, 255)),
        ))
        .attribute(
            AttributeSchema::new("router", routers())
                .with_diff_suppress(same_routers)
                .with_description("VPCs associated with a private zone"),
        )
        .attribute(
            AttributeSchema::new(
                "status",
                AttributeType::Enum(vec!["ENABLE".to_string(), "DISABLE".to_string()]),
            )
            .optional_computed(),
        )
        .attribute(super::enterprise_project_id())
        .attribute(super::tags())
        .attribute(super::timeouts())
        .attribute(
            AttributeSchema::new("masters", AttributeType::List(Box::new(AttributeType::String)))
                .computed(),
        )
        .attribute(computed_string("serial"))
}
