//! KMS key resource and data source schemas

use std::time::Duration;

use hwcloud_core::resource::Value;
use hwcloud_core::schema::{AttributeSchema, AttributeType, ResourceSchema, Timeouts, types};

use super::{bounded_string, check_length, computed_string, string};

pub const RESOURCE_TYPE: &str = "huaweicloud_kms_key";

/// Key states reported by `describe-key`
pub const STATE_PENDING_ACTIVATION: &str = "1";
pub const STATE_ENABLED: &str = "2";
pub const STATE_DISABLED: &str = "3";
pub const STATE_PENDING_DELETION: &str = "4";
pub const STATE_PENDING_IMPORT: &str = "5";

const KEY_ALGORITHMS: &[&str] = &[
    "AES_256",
    "SM4",
    "RSA_2048",
    "RSA_3072",
    "RSA_4096",
    "EC_P256",
    "EC_P384",
    "SM2",
];

fn enum_of(values: &[&str]) -> AttributeType {
    AttributeType::Enum(values.iter().map(|v| v.to_string()).collect())
}

/// Days before a scheduled deletion takes effect, "7" to "1096"
fn pending_days() -> AttributeType {
    bounded_string("PendingDays", |v| match v {
        Value::String(s) => match s.parse::<u32>() {
            Ok(n) if (7..=1096).contains(&n) => Ok(()),
            _ => Err(format!("pending_days must be a number between 7 and 1096, got '{}'", s)),
        },
        _ => Err("Expected string".to_string()),
    })
}

/// Rotation interval in days, 30 to 365
fn rotation_interval() -> AttributeType {
    AttributeType::Custom {
        name: "RotationInterval".to_string(),
        base: Box::new(AttributeType::Int),
        validate: |v| match v {
            Value::Int(n) if (30..=365).contains(n) => Ok(()),
            Value::Int(n) => Err(format!("rotation_interval must be between 30 and 365, got {}", n)),
            _ => Err("Expected integer".to_string()),
        },
    }
}

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(RESOURCE_TYPE)
        .with_description("KMS customer master key")
        .with_timeouts(Timeouts {
            create: Some(Duration::from_secs(10 * 60)),
            update: Some(Duration::from_secs(10 * 60)),
            delete: Some(Duration::from_secs(10 * 60)),
        })
        .attribute(super::region())
        .attribute(
            AttributeSchema::new("key_alias", bounded_string("KeyAlias", |v| check_length(v, 1, 255)))
                .required()
                .with_description("Alias of the key"),
        )
        .attribute(AttributeSchema::new(
            "key_description",
            bounded_string("KeyDescription", |v| check_length(v, 0, 255)),
        ))
        .attribute(
            AttributeSchema::new("key_algorithm", enum_of(KEY_ALGORITHMS))
                .force_new()
                .with_default(Value::String("AES_256".to_string())),
        )
        .attribute(
            AttributeSchema::new(
                "key_usage",
                enum_of(&["ENCRYPT_DECRYPT", "SIGN_VERIFY"]),
            )
            .optional_computed()
            .force_new(),
        )
        .attribute(
            AttributeSchema::new("origin", enum_of(&["kms", "external"]))
                .optional_computed()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("pending_days", pending_days())
                .write_only()
                .with_default(Value::String("7".to_string()))
                .with_description("Waiting period in days before the key is deleted"),
        )
        .attribute(
            AttributeSchema::new("is_enabled", AttributeType::Bool)
                .with_default(Value::Bool(true)),
        )
        .attribute(
            AttributeSchema::new("rotation_enabled", AttributeType::Bool)
                .with_default(Value::Bool(false)),
        )
        .attribute(AttributeSchema::new("rotation_interval", rotation_interval()).optional_computed())
        .attribute(super::enterprise_project_id())
        .attribute(super::tags())
        .attribute(super::timeouts())
        .attribute(computed_string("key_id"))
        .attribute(computed_string("domain_id"))
        .attribute(computed_string("realm"))
        .attribute(computed_string("creation_date"))
        .attribute(computed_string("scheduled_deletion_date"))
        .attribute(computed_string("expiration_time"))
        .attribute(computed_string("default_key_flag"))
        .attribute(computed_string("key_state"))
        .attribute(AttributeSchema::new("rotation_number", AttributeType::Int).computed())
}

pub fn data_source_schema() -> ResourceSchema {
    ResourceSchema::data_source(RESOURCE_TYPE)
        .with_description("Look up a single KMS key")
        .attribute(super::region())
        .attribute(string("key_id").optional_computed())
        .attribute(string("key_alias").optional_computed())
        .attribute(string("key_description").optional_computed())
        .attribute(
            AttributeSchema::new(
                "key_state",
                enum_of(&[
                    STATE_PENDING_ACTIVATION,
                    STATE_ENABLED,
                    STATE_DISABLED,
                    STATE_PENDING_DELETION,
                    STATE_PENDING_IMPORT,
                ]),
            )
            .optional_computed(),
        )
        .attribute(string("enterprise_project_id").optional_computed())
        .attribute(computed_string("domain_id"))
        .attribute(computed_string("realm"))
        .attribute(computed_string("creation_date"))
        .attribute(computed_string("scheduled_deletion_date"))
        .attribute(computed_string("expiration_time"))
        .attribute(computed_string("default_key_flag"))
        .attribute(computed_string("origin"))
        .attribute(computed_string("key_usage"))
        .attribute(computed_string("key_algorithm"))
        .attribute(AttributeSchema::new("rotation_enabled", AttributeType::Bool).computed())
        .attribute(AttributeSchema::new("rotation_interval", AttributeType::Int).computed())
        .attribute(AttributeSchema::new("tags", types::tags()).computed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_applied() {
        let mut attributes = HashMap::new();
        attributes.insert("key_alias".to_string(), Value::String("key-1".into()));
        schema().apply_defaults(&mut attributes);

        assert_eq!(attributes["key_algorithm"], Value::String("AES_256".into()));
        assert_eq!(attributes["pending_days"], Value::String("7".into()));
        assert_eq!(attributes["is_enabled"], Value::Bool(true));
        assert!(schema().validate(&attributes).is_ok());
    }

    #[test]
    fn ranges_are_enforced() {
        let mut attributes = HashMap::new();
        attributes.insert("key_alias".to_string(), Value::String("key-1".into()));
        attributes.insert("pending_days".to_string(), Value::String("3".into()));
        attributes.insert("rotation_interval".to_string(), Value::Int(400));
        let errors = schema().validate(&attributes).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn pending_days_is_write_only() {
        let schema = schema();
        assert!(schema.attributes["pending_days"].write_only);
        assert!(schema.attributes["key_algorithm"].force_new);
    }
}
