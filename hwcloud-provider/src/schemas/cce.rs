//! CCE cluster resource schema

use std::time::Duration;

use hwcloud_core::resource::Value;
use hwcloud_core::schema::{AttributeSchema, AttributeType, ResourceSchema, Timeouts, types};

use super::{computed_string, string};

pub const RESOURCE_TYPE: &str = "huaweicloud_cce_cluster";

/// Cluster phases that abort any wait
pub const INVALID_PHASES: &[&str] = &["Error", "Shelved", "Unknow"];

fn enum_of(values: &[&str]) -> AttributeType {
    AttributeType::Enum(values.iter().map(|v| v.to_string()).collect())
}

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(RESOURCE_TYPE)
        .with_description("Cloud Container Engine cluster")
        .with_timeouts(Timeouts {
            create: Some(Duration::from_secs(30 * 60)),
            update: Some(Duration::from_secs(30 * 60)),
            delete: Some(Duration::from_secs(30 * 60)),
        })
        .attribute(super::region())
        .attribute(string("name").required().force_new())
        .attribute(
            string("flavor_id")
                .required()
                .force_new()
                .with_description("Cluster specification, e.g. cce.s1.small"),
        )
        .attribute(string("cluster_version").optional_computed().force_new())
        .attribute(
            AttributeSchema::new("cluster_type", enum_of(&["VirtualMachine", "ARM64"]))
                .force_new()
                .with_default(Value::String("VirtualMachine".to_string())),
        )
        .attribute(string("alias").optional_computed())
        .attribute(string("description").optional_computed())
        .attribute(string("vpc_id").required().force_new())
        .attribute(string("subnet_id").required().force_new())
        .attribute(string("security_group_id").optional_computed())
        .attribute(
            AttributeSchema::new(
                "container_network_type",
                enum_of(&["overlay_l2", "vpc-router", "eni"]),
            )
            .required()
            .force_new(),
        )
        .attribute(
            AttributeSchema::new("container_network_cidr", types::cidr())
                .optional_computed()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("service_network_cidr", types::cidr())
                .optional_computed()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new(
                "authentication_mode",
                enum_of(&["rbac", "authenticating_proxy"]),
            )
            .force_new()
            .with_default(Value::String("rbac".to_string())),
        )
        .attribute(
            AttributeSchema::new("kube_proxy_mode", enum_of(&["iptables", "ipvs"]))
                .optional_computed()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("hibernate", AttributeType::Bool)
                .with_description("Hibernate the cluster (true) or wake it up (false)"),
        )
        .attribute(
            AttributeSchema::new("delete_all", enum_of(&["true", "false", "try"]))
                .write_only()
                .with_description("Delete the storage and network resources of the cluster too"),
        )
        .attribute(super::enterprise_project_id())
        .attribute(super::tags())
        .attribute(super::timeouts())
        .attribute(computed_string("status"))
        .attribute(computed_string("category"))
}
