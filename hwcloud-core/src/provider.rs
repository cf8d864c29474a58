//! Provider - Trait abstracting resource operations
//!
//! A Provider maps resource types onto a cloud API. It is responsible for
//! turning Effects into actual API calls and API responses back into State.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use std::collections::HashMap;

use crate::resource::{Resource, ResourceId, State, Value};
use crate::schema::ResourceSchema;

/// Classification of a provider failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The remote object does not exist (HTTP 404 or equivalent)
    NotFound,
    /// A wait did not reach its target within the configured duration
    Timeout,
    /// A wait observed a state that is neither pending nor target
    UnexpectedState,
    /// The API answered with a non-success status
    Api { status: u16, code: Option<String> },
    /// The request never produced a response
    Transport,
    /// Provider configuration is invalid or incomplete
    Config,
    /// Resource attributes are invalid
    Validation,
    /// The operation is not supported for this resource type
    Unsupported,
    /// Anything else
    Other,
}

/// Error type for Provider operations
#[derive(Debug)]
pub struct ProviderError {
    pub kind: ErrorKind,
    pub message: String,
    pub resource_id: Option<ResourceId>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// State of an object that was created before the failure
    pub partial: Option<Box<State>>,
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref id) = self.resource_id {
            write!(f, "[{}] {}", id, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Other, message)
    }

    pub fn with_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            resource_id: None,
            cause: None,
            partial: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::NotFound, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Timeout, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Config, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Validation, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Unsupported, message)
    }

    pub fn for_resource(mut self, id: ResourceId) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Prefix the message with context, keeping kind and cause
    pub fn context(mut self, context: impl fmt::Display) -> Self {
        self.message = format!("{}: {}", context, self.message);
        self
    }

    /// Attach the tainted state of an object the failed operation left behind
    pub fn with_partial(mut self, state: State) -> Self {
        self.partial = Some(Box::new(state.mark_tainted()));
        self
    }

    pub fn partial_state(&self) -> Option<&State> {
        self.partial.as_deref()
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Definition of resource types that a Provider can handle
pub trait ResourceType: Send + Sync {
    /// Resource type name (e.g., "huaweicloud_vpc")
    fn name(&self) -> &'static str;

    /// Whether this is a data source rather than a managed resource
    fn is_data_source(&self) -> bool {
        false
    }

    /// Attribute schema for this resource type
    fn schema(&self) -> ResourceSchema;
}

/// Main Provider trait
///
/// All operations are async and involve side effects.
pub trait Provider: Send + Sync {
    /// Name of this Provider (e.g., "huaweicloud")
    fn name(&self) -> &'static str;

    /// Resource and data source types this Provider can handle
    fn resource_types(&self) -> Vec<Box<dyn ResourceType>>;

    /// Schema for a managed resource or data source type
    fn schema(&self, resource_type: &str, data_source: bool) -> Option<ResourceSchema> {
        self.resource_types()
            .into_iter()
            .find(|t| t.name() == resource_type && t.is_data_source() == data_source)
            .map(|t| t.schema())
    }

    /// Get the current state of a resource
    ///
    /// `known` carries attributes from configuration or stored state that
    /// help locate the object, such as `region`. Returns
    /// `State::not_found()` if the resource does not exist or if no
    /// identifier is known yet.
    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
        known: &HashMap<String, Value>,
    ) -> BoxFuture<'_, ProviderResult<State>>;

    /// Read a data source using its configured arguments as filters
    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>>;

    /// Create a resource
    ///
    /// Returns State with identifier set to the cloud ID
    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>>;

    /// Update a resource identified by its cloud ID
    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>>;

    /// Delete a resource identified by its cloud ID
    fn delete(
        &self,
        id: &ResourceId,
        identifier: &str,
        known: &HashMap<String, Value>,
    ) -> BoxFuture<'_, ProviderResult<()>>;

    /// Import an existing resource by its cloud ID
    fn import(
        &self,
        id: &ResourceId,
        identifier: &str,
        known: &HashMap<String, Value>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let known = known.clone();
        Box::pin(async move {
            let state = self.read(&id, Some(&identifier), &known).await?;
            if !state.exists {
                return Err(ProviderError::not_found(format!(
                    "cannot import non-existent remote object {}",
                    identifier
                ))
                .for_resource(id));
            }
            Ok(state)
        })
    }
}

/// Provider implementation for Box<dyn Provider>
/// This enables dynamic dispatch for Providers
impl Provider for Box<dyn Provider> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        (**self).resource_types()
    }

    fn schema(&self, resource_type: &str, data_source: bool) -> Option<ResourceSchema> {
        (**self).schema(resource_type, data_source)
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
        known: &HashMap<String, Value>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).read(id, identifier, known)
    }

    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).read_data_source(resource)
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).create(resource)
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).update(id, identifier, from, to)
    }

    fn delete(
        &self,
        id: &ResourceId,
        identifier: &str,
        known: &HashMap<String, Value>,
    ) -> BoxFuture<'_, ProviderResult<()>> {
        (**self).delete(id, identifier, known)
    }

    fn import(
        &self,
        id: &ResourceId,
        identifier: &str,
        known: &HashMap<String, Value>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).import(id, identifier, known)
    }
}
