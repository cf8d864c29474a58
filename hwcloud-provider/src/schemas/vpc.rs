//! VPC resource and data source schemas

use std::time::Duration;

use hwcloud_core::resource::Value;
use hwcloud_core::schema::{AttributeSchema, AttributeType, ResourceSchema, Timeouts, types};

use super::{bounded_string, check_length, computed_string, string};

pub const RESOURCE_TYPE: &str = "huaweicloud_vpc";

fn vpc_name() -> AttributeType {
    bounded_string("VpcName", |v| check_length(v, 1, 64))
}

fn vpc_description() -> AttributeType {
    bounded_string("VpcDescription", |v| check_length(v, 0, 255))
}

fn routes() -> AttributeSchema {
    AttributeSchema::new(
        "routes",
        AttributeType::List(Box::new(AttributeType::Map(Box::new(AttributeType::String)))),
    )
    .computed()
    .with_description("Routes of the VPC (destination, nexthop)")
}

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(RESOURCE_TYPE)
        .with_description("Virtual Private Cloud")
        .with_timeouts(Timeouts {
            create: Some(Duration::from_secs(10 * 60)),
            update: None,
            delete: Some(Duration::from_secs(10 * 60)),
        })
        .attribute(super::region())
        .attribute(
            AttributeSchema::new("name", vpc_name())
                .required()
                .with_description("Name of the VPC"),
        )
        .attribute(
            AttributeSchema::new("cidr", types::cidr())
                .required()
                .with_description("IPv4 range of the VPC (e.g., \"192.168.0.0/16\")"),
        )
        .attribute(AttributeSchema::new("description", vpc_description()))
        .attribute(super::enterprise_project_id())
        .attribute(super::tags())
        .attribute(super::timeouts())
        .attribute(computed_string("status"))
        .attribute(AttributeSchema::new("shared", AttributeType::Bool).computed())
        .attribute(routes())
}

pub fn data_source_schema() -> ResourceSchema {
    ResourceSchema::data_source(RESOURCE_TYPE)
        .with_description("Look up a single VPC by id or filters")
        .attribute(super::region())
        .attribute(string("id").optional_computed())
        .attribute(string("name").optional_computed())
        .attribute(AttributeSchema::new("cidr", types::cidr()).optional_computed())
        .attribute(
            AttributeSchema::new(
                "status",
                AttributeType::Enum(vec!["CREATING".to_string(), "OK".to_string()]),
            )
            .optional_computed(),
        )
        .attribute(string("enterprise_project_id").optional_computed())
        .attribute(computed_string("description"))
        .attribute(AttributeSchema::new("shared", AttributeType::Bool).computed())
        .attribute(AttributeSchema::new("tags", types::tags()).computed())
        .attribute(routes())
}

/// `shared` is false unless the API says otherwise
pub fn default_shared() -> Value {
    Value::Bool(false)
}
