//! Resource and data source types served by the HuaweiCloud provider

use hwcloud_core::provider::ResourceType;
use hwcloud_core::schema::ResourceSchema;

use crate::schemas::{cce, dns, kms, vpc};

macro_rules! define_resource_type {
    ($name:ident, $type_name:expr, $schema:path) => {
        define_resource_type!($name, $type_name, $schema, false);
    };
    ($name:ident, $type_name:expr, $schema:path, data_source) => {
        define_resource_type!($name, $type_name, $schema, true);
    };
    ($name:ident, $type_name:expr, $schema:path, $data_source:literal) => {
        pub struct $name;
        impl ResourceType for $name {
            fn name(&self) -> &'static str {
                $type_name
            }
            fn is_data_source(&self) -> bool {
                $data_source
            }
            fn schema(&self) -> ResourceSchema {
                $schema()
            }
        }
    };
}

define_resource_type!(VpcType, vpc::RESOURCE_TYPE, vpc::schema);
define_resource_type!(KmsKeyType, kms::RESOURCE_TYPE, kms::schema);
define_resource_type!(DnsZoneType, dns::RESOURCE_TYPE, dns::schema);
define_resource_type!(CceClusterType, cce::RESOURCE_TYPE, cce::schema);

define_resource_type!(VpcDataSource, vpc::RESOURCE_TYPE, vpc::data_source_schema, data_source);
define_resource_type!(KmsKeyDataSource, kms::RESOURCE_TYPE, kms::data_source_schema, data_source);

/// Returns all resource and data source types supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![
        Box::new(VpcType),
        Box::new(KmsKeyType),
        Box::new(DnsZoneType),
        Box::new(CceClusterType),
        Box::new(VpcDataSource),
        Box::new(KmsKeyDataSource),
    ]
}
