//! hwcloud HuaweiCloud Provider
//!
//! Exposes VPC, KMS, DNS and CCE resources through the `hwcloud-core`
//! [`Provider`] trait.
//!
//! ## Module Structure
//!
//! - `config` - Provider settings from `HW_*` variables and the provider block
//! - `signer` - AK/SK request signing
//! - `client` - Service catalog, endpoints, project ids and signed HTTP calls
//! - `schemas` - Resource and data source schemas
//! - `services` - Per-service CRUD handlers
//! - `provider` - HuaweiCloudProvider dispatching to the handlers

pub mod client;
pub mod config;
pub mod error;
pub mod provider;
pub mod resources;
pub mod schemas;
pub mod services;
pub mod signer;
pub mod utils;

pub use config::Config;
pub use provider::HuaweiCloudProvider;

use std::collections::HashMap;

use hwcloud_core::provider::{BoxFuture, Provider, ProviderResult};
use hwcloud_core::resource::{Resource, ResourceId, State, Value};

use resources::resource_types;

impl Provider for HuaweiCloudProvider {
    fn name(&self) -> &'static str {
        "huaweicloud"
    }

    fn resource_types(&self) -> Vec<Box<dyn hwcloud_core::provider::ResourceType>> {
        resource_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
        known: &HashMap<String, Value>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.map(|s| s.to_string());
        let known = known.clone();
        Box::pin(async move {
            self.read_resource(&id, identifier.as_deref(), &known)
                .await
        })
    }

    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.query_data_source(&resource).await })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.create_resource(&resource).await })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move { self.update_resource(&id, &identifier, &from, &to).await })
    }

    fn delete(
        &self,
        id: &ResourceId,
        identifier: &str,
        known: &HashMap<String, Value>,
    ) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let known = known.clone();
        Box::pin(async move { self.delete_resource(&id, &identifier, &known).await })
    }
}
