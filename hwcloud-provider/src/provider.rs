//! HuaweiCloud Provider implementation
//!
//! Routes each CRUD call to the handler of its resource type under
//! [`crate::services`].

use std::collections::HashMap;

use hwcloud_core::provider::{ProviderError, ProviderResult};
use hwcloud_core::resource::{Resource, ResourceId, State, Value};
use hwcloud_core::schema::ResourceSchema;

use crate::client::Client;
use crate::config::Config;
use crate::schemas::{cce, dns, kms, vpc};
use crate::services;

/// Resource schema for a managed resource type
pub(crate) fn resource_schema(resource_type: &str) -> Option<ResourceSchema> {
    match resource_type {
        vpc::RESOURCE_TYPE => Some(vpc::schema()),
        kms::RESOURCE_TYPE => Some(kms::schema()),
        dns::RESOURCE_TYPE => Some(dns::schema()),
        cce::RESOURCE_TYPE => Some(cce::schema()),
        _ => None,
    }
}

fn data_source_schema(resource_type: &str) -> Option<ResourceSchema> {
    match resource_type {
        vpc::RESOURCE_TYPE => Some(vpc::data_source_schema()),
        kms::RESOURCE_TYPE => Some(kms::data_source_schema()),
        _ => None,
    }
}

fn unsupported(id: &ResourceId) -> ProviderError {
    ProviderError::unsupported(format!("Unknown resource type: {}", id.resource_type))
        .for_resource(id.clone())
}

/// Fill in schema defaults and reject invalid arguments before any API call
fn prepare(resource: &Resource, schema: &ResourceSchema) -> ProviderResult<Resource> {
    let mut resource = resource.clone();
    schema.apply_defaults(&mut resource.attributes);
    schema.validate(&resource.attributes).map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        ProviderError::validation(messages.join("; ")).for_resource(resource.id.clone())
    })?;
    Ok(resource)
}

pub struct HuaweiCloudProvider {
    client: Client,
}

impl HuaweiCloudProvider {
    /// Create a provider from a validated configuration
    pub fn new(config: Config) -> ProviderResult<Self> {
        let client = Client::new(config)?;
        log::debug!("HuaweiCloud provider configured for region {}", client.region());
        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Read a resource by its cloud ID
    pub async fn read_resource(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
        known: &HashMap<String, Value>,
    ) -> ProviderResult<State> {
        let Some(identifier) = identifier else {
            return Ok(State::not_found(id.clone()));
        };

        match id.resource_type.as_str() {
            vpc::RESOURCE_TYPE => services::vpc::read(&self.client, id, identifier, known).await,
            kms::RESOURCE_TYPE => services::kms::read(&self.client, id, identifier, known).await,
            dns::RESOURCE_TYPE => services::dns::read(&self.client, id, identifier, known).await,
            cce::RESOURCE_TYPE => services::cce::read(&self.client, id, identifier, known).await,
            _ => Err(unsupported(id)),
        }
    }

    pub async fn create_resource(&self, resource: &Resource) -> ProviderResult<State> {
        let schema = resource_schema(&resource.id.resource_type)
            .ok_or_else(|| unsupported(&resource.id))?;
        let resource = prepare(resource, &schema)?;
        log::info!("Creating {}", resource.id);

        match resource.id.resource_type.as_str() {
            vpc::RESOURCE_TYPE => services::vpc::create(&self.client, &resource).await,
            kms::RESOURCE_TYPE => services::kms::create(&self.client, &resource).await,
            dns::RESOURCE_TYPE => services::dns::create(&self.client, &resource).await,
            cce::RESOURCE_TYPE => services::cce::create(&self.client, &resource).await,
            _ => Err(unsupported(&resource.id)),
        }
    }

    pub async fn update_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let schema = resource_schema(&id.resource_type).ok_or_else(|| unsupported(id))?;
        let to = prepare(to, &schema)?;
        log::info!("Updating {} ({})", id, identifier);

        match id.resource_type.as_str() {
            vpc::RESOURCE_TYPE => services::vpc::update(&self.client, id, identifier, from, &to).await,
            kms::RESOURCE_TYPE => services::kms::update(&self.client, id, identifier, from, &to).await,
            dns::RESOURCE_TYPE => services::dns::update(&self.client, id, identifier, from, &to).await,
            cce::RESOURCE_TYPE => services::cce::update(&self.client, id, identifier, from, &to).await,
            _ => Err(unsupported(id)),
        }
    }

    pub async fn delete_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        known: &HashMap<String, Value>,
    ) -> ProviderResult<()> {
        log::info!("Deleting {} ({})", id, identifier);

        match id.resource_type.as_str() {
            vpc::RESOURCE_TYPE => services::vpc::delete(&self.client, id, identifier, known).await,
            kms::RESOURCE_TYPE => services::kms::delete(&self.client, id, identifier, known).await,
            dns::RESOURCE_TYPE => services::dns::delete(&self.client, id, identifier, known).await,
            cce::RESOURCE_TYPE => services::cce::delete(&self.client, id, identifier, known).await,
            _ => Err(unsupported(id)),
        }
    }

    pub async fn query_data_source(&self, resource: &Resource) -> ProviderResult<State> {
        let schema = data_source_schema(&resource.id.resource_type)
            .ok_or_else(|| unsupported(&resource.id))?;
        let resource = prepare(resource, &schema)?;

        match resource.id.resource_type.as_str() {
            vpc::RESOURCE_TYPE => services::vpc::read_data_source(&self.client, &resource).await,
            kms::RESOURCE_TYPE => services::kms::read_data_source(&self.client, &resource).await,
            _ => Err(unsupported(&resource.id)),
        }
    }
}
