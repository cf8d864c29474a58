//! HuaweiCloud resource schema definitions

pub mod cce;
pub mod dns;
pub mod kms;
pub mod vpc;

use hwcloud_core::resource::Value;
use hwcloud_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

/// Returns every resource and data source schema of the provider
pub fn all_schemas() -> Vec<ResourceSchema> {
    vec![
        vpc::schema(),
        vpc::data_source_schema(),
        kms::schema(),
        kms::data_source_schema(),
        dns::schema(),
        cce::schema(),
    ]
}

/// Region name such as `cn-north-4` or `ap-southeast-1`
pub fn region_type() -> AttributeType {
    AttributeType::Custom {
        name: "Region".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| match value {
            Value::String(s) => validate_region(s),
            _ => Err("Expected string".to_string()),
        },
    }
}

fn validate_region(region: &str) -> Result<(), String> {
    let parts: Vec<&str> = region.split('-').collect();
    let well_formed = parts.len() >= 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()))
        && parts
            .last()
            .is_some_and(|p| p.chars().all(|c| c.is_ascii_digit()));
    if well_formed {
        Ok(())
    } else {
        Err(format!(
            "Invalid region '{}', expected a name like cn-north-4",
            region
        ))
    }
}

/// String type with an extra check
pub fn bounded_string(name: &str, validate: fn(&Value) -> Result<(), String>) -> AttributeType {
    AttributeType::Custom {
        name: name.to_string(),
        base: Box::new(AttributeType::String),
        validate,
    }
}

pub(crate) fn check_length(value: &Value, min: usize, max: usize) -> Result<(), String> {
    match value {
        Value::String(s) if (min..=max).contains(&s.chars().count()) => Ok(()),
        Value::String(s) => Err(format!(
            "'{}' must be between {} and {} characters",
            s, min, max
        )),
        _ => Err("Expected string".to_string()),
    }
}

pub fn region() -> AttributeSchema {
    AttributeSchema::new("region", region_type())
        .optional_computed()
        .force_new()
        .with_description("Region of the resource; defaults to the provider region")
}

pub fn timeouts() -> AttributeSchema {
    AttributeSchema::new("timeouts", types::timeouts())
        .with_description("Operation timeouts, e.g. { create = \"10m\" }")
}

pub fn tags() -> AttributeSchema {
    AttributeSchema::new("tags", types::tags()).with_description("Key/value tags")
}

pub fn enterprise_project_id() -> AttributeSchema {
    AttributeSchema::new("enterprise_project_id", AttributeType::String)
        .optional_computed()
        .force_new()
}

fn string(name: &str) -> AttributeSchema {
    AttributeSchema::new(name, AttributeType::String)
}

fn computed_string(name: &str) -> AttributeSchema {
    string(name).computed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_names() {
        assert!(validate_region("cn-north-4").is_ok());
        assert!(validate_region("ap-southeast-1").is_ok());
        assert!(validate_region("eu-west-101").is_ok());
        assert!(validate_region("cn-north").is_err());
        assert!(validate_region("CN-NORTH-4").is_err());
        assert!(validate_region("cn--4").is_err());
    }

    #[test]
    fn every_schema_has_region() {
        for schema in all_schemas() {
            assert!(
                schema.attributes.contains_key("region"),
                "{} lacks region",
                schema.resource_type
            );
            assert!(schema.resource_type.starts_with("huaweicloud_"));
        }
    }

    #[test]
    fn length_checks() {
        assert!(check_length(&Value::String("vpc".into()), 1, 64).is_ok());
        assert!(check_length(&Value::String(String::new()), 1, 64).is_err());
        assert!(check_length(&Value::Int(1), 1, 64).is_err());
    }
}
