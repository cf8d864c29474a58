//! Service clients
//!
//! A [`Client`] holds the credentials, the HTTP connection pool and the
//! per-region project ids. [`ServiceClient`]s are cheap per-service,
//! per-region views on it that know their endpoint and resource base.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hwcloud_core::provider::{ProviderError, ProviderResult};
use hwcloud_core::wait::StateChangeConf;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde_json::{Value as JsonValue, json};
use tokio::sync::Mutex;
use url::Url;

use crate::config::{AuthMethod, Config};
use crate::error::ApiError;
use crate::signer::Signer;

/// Whether a service is served from one endpoint for all regions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Global,
    Regional,
}

/// Static description of a service API
#[derive(Debug, Clone, Copy)]
pub struct ServiceCatalog {
    /// Host label, e.g. `vpc` in `vpc.cn-north-4.myhuaweicloud.com`
    pub name: &'static str,
    pub version: &'static str,
    pub scope: Scope,
    pub without_project_id: bool,
    /// Path segment placed before the project id (`projects` for CCE)
    pub project_prefix: &'static str,
    pub resource_base: &'static str,
    /// Uses domain-level credentials
    pub admin: bool,
}

impl ServiceCatalog {
    const fn regional(name: &'static str, version: &'static str) -> Self {
        Self {
            name,
            version,
            scope: Scope::Regional,
            without_project_id: false,
            project_prefix: "",
            resource_base: "",
            admin: false,
        }
    }
}

static CATALOG: &[(&str, ServiceCatalog)] = &[
    ("vpc", ServiceCatalog::regional("vpc", "v1")),
    ("vpcv2", ServiceCatalog::regional("vpc", "v2.0")),
    (
        "kms",
        ServiceCatalog {
            resource_base: "kms",
            ..ServiceCatalog::regional("kms", "v1.0")
        },
    ),
    (
        "dns",
        ServiceCatalog {
            scope: Scope::Global,
            without_project_id: true,
            ..ServiceCatalog::regional("dns", "v2")
        },
    ),
    (
        "dns_region",
        ServiceCatalog {
            without_project_id: true,
            ..ServiceCatalog::regional("dns", "v2")
        },
    ),
    (
        "cce",
        ServiceCatalog {
            project_prefix: "projects",
            ..ServiceCatalog::regional("cce", "api/v3")
        },
    ),
];

/// Look up a service by its catalog key
pub fn catalog(service: &str) -> Option<&'static ServiceCatalog> {
    CATALOG
        .iter()
        .find(|(key, _)| *key == service)
        .map(|(_, catalog)| catalog)
}

/// Endpoint of a service in a region, ending with a slash
pub fn service_endpoint(config: &Config, service: &str, catalog: &ServiceCatalog, region: &str) -> String {
    if let Some(endpoint) = config.endpoints.get(service) {
        return endpoint.clone();
    }
    if catalog.scope == Scope::Global && !config.region_client {
        format!("https://{}.{}/", catalog.name, config.cloud)
    } else {
        format!("https://{}.{}.{}/", catalog.name, region, config.cloud)
    }
}

/// `{endpoint}{version}/[{prefix}/]{project_id}/[{resource_base}/]`
pub fn resource_base(endpoint: &str, catalog: &ServiceCatalog, project_id: Option<&str>) -> String {
    let mut base = format!("{}{}/", endpoint, catalog.version);
    if !catalog.without_project_id
        && let Some(project_id) = project_id
    {
        if !catalog.project_prefix.is_empty() {
            base.push_str(catalog.project_prefix);
            base.push('/');
        }
        base.push_str(project_id);
        base.push('/');
    }
    if !catalog.resource_base.is_empty() {
        base.push_str(catalog.resource_base);
        base.push('/');
    }
    base
}

/// Wait before retrying a throttled request: 2^n minutes, at most 30
pub fn retry_backoff(retries: u32) -> Duration {
    let minutes = 2u64.saturating_pow(retries).min(30);
    Duration::from_secs(minutes * 60)
}

/// Authenticated entry point shared by all service clients
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    auth: AuthMethod,
    signer: Option<Signer>,
    http: reqwest::Client,
    projects: Mutex<HashMap<String, String>>,
    token: Mutex<Option<String>>,
}

impl Client {
    /// Validate the configuration and prepare the HTTP client
    pub fn new(config: Config) -> ProviderResult<Self> {
        let auth = config.validate()?;
        let signer = match auth {
            AuthMethod::AkSk {
                ref access_key,
                ref secret_key,
                ..
            } => Some(Signer::new(access_key.clone(), secret_key.clone())),
            _ => None,
        };

        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent(concat!("hwcloud/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(config.insecure);

        if let Some(ref path) = config.ca_cert_file {
            let pem = std::fs::read(path).map_err(|e| {
                ProviderError::config(format!("error reading CA certificate '{}'", path)).with_cause(e)
            })?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                ProviderError::config(format!("invalid CA certificate '{}'", path)).with_cause(e)
            })?;
            builder = builder.add_root_certificate(cert);
        }

        if let (Some(cert_path), Some(key_path)) = (&config.client_cert_file, &config.client_key_file) {
            let mut pem = std::fs::read(cert_path).map_err(|e| {
                ProviderError::config(format!("error reading client certificate '{}'", cert_path))
                    .with_cause(e)
            })?;
            let key = std::fs::read(key_path).map_err(|e| {
                ProviderError::config(format!("error reading client key '{}'", key_path)).with_cause(e)
            })?;
            pem.push(b'\n');
            pem.extend(key);
            let identity = reqwest::Identity::from_pem(&pem).map_err(|e| {
                ProviderError::config("invalid client certificate or key").with_cause(e)
            })?;
            builder = builder.identity(identity);
        }

        let http = builder
            .build()
            .map_err(|e| ProviderError::config("error building HTTP client").with_cause(e))?;

        let mut projects = HashMap::new();
        if let Some(ref project_id) = config.project_id {
            projects.insert(config.region.clone(), project_id.clone());
        }

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                auth,
                signer,
                http,
                projects: Mutex::new(projects),
                token: Mutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn auth_method(&self) -> &AuthMethod {
        &self.inner.auth
    }

    /// Provider-level region
    pub fn region(&self) -> &str {
        &self.inner.config.region
    }

    /// A resource-level region is only honored with AK/SK credentials
    pub fn check_region(&self, region: &str) -> ProviderResult<()> {
        if region != self.region() && !matches!(self.inner.auth, AuthMethod::AkSk { .. }) {
            return Err(ProviderError::config(format!(
                "resource-level region '{}' must be the same as provider-level region '{}' \
                 when using non AK/SK authentication",
                region,
                self.region()
            )));
        }
        Ok(())
    }

    /// Build a client for a service in a region
    pub async fn service_client(&self, service: &str, region: &str) -> ProviderResult<ServiceClient> {
        let catalog = catalog(service).ok_or_else(|| {
            ProviderError::config(format!("service type {} is invalid or not supported", service))
        })?;
        self.check_region(region)?;

        let project_id = if catalog.admin {
            None
        } else {
            Some(self.project_id(region).await?)
        };
        let endpoint = service_endpoint(self.config(), service, catalog, region);
        let resource_base = resource_base(&endpoint, catalog, project_id.as_deref());
        let token = self.token().await?;

        Ok(ServiceClient {
            client: self.clone(),
            catalog,
            region: region.to_string(),
            endpoint,
            resource_base,
            project_id,
            token,
        })
    }

    /// Project id of a region, resolved through IAM once and cached
    pub async fn project_id(&self, region: &str) -> ProviderResult<String> {
        // Password authentication learns the project id from the token
        if matches!(self.inner.auth, AuthMethod::Password { .. }) {
            self.token().await?;
        }

        let mut projects = self.inner.projects.lock().await;
        if let Some(id) = projects.get(region) {
            return Ok(id.clone());
        }
        self.load_user_projects(region, &mut projects).await?;
        projects.get(region).cloned().ok_or_else(|| {
            ProviderError::config(format!("wrong name or no access to the region: {}", region))
        })
    }

    async fn load_user_projects(
        &self,
        region: &str,
        projects: &mut HashMap<String, String>,
    ) -> ProviderResult<()> {
        log::info!("Load project id for region: {}", region);
        let mut url = format!("{}/projects?name={}", self.config().identity_endpoint(), region);
        if let Some(ref domain_id) = self.config().domain_id {
            url.push_str(&format!("&domain_id={}", domain_id));
        }

        let mut headers = BTreeMap::new();
        if let Some(ref domain_id) = self.config().domain_id {
            headers.insert("X-Domain-Id".to_string(), domain_id.clone());
        }
        let token = self.token().await?;
        let (_, body) = self
            .execute(Method::GET, &url, None, headers, token.as_deref(), false)
            .await
            .map_err(|e| ProviderError::from(e).context("list projects failed"))?;

        let listed = body
            .get("projects")
            .and_then(JsonValue::as_array)
            .cloned()
            .unwrap_or_default();
        if listed.is_empty() {
            return Err(ProviderError::config(format!(
                "wrong name or no access to the region: {}",
                region
            )));
        }
        for project in listed {
            if let (Some(name), Some(id)) = (
                project.get("name").and_then(JsonValue::as_str),
                project.get("id").and_then(JsonValue::as_str),
            ) {
                projects.insert(name.to_string(), id.to_string());
            }
        }
        Ok(())
    }

    /// Token sent as `X-Auth-Token`; none for AK/SK
    pub async fn token(&self) -> ProviderResult<Option<String>> {
        match self.inner.auth {
            AuthMethod::Token(ref token) => Ok(Some(token.clone())),
            AuthMethod::AkSk { .. } => Ok(None),
            AuthMethod::Password {
                ref user_name,
                ref user_id,
                ref password,
            } => {
                let mut cached = self.inner.token.lock().await;
                if let Some(ref token) = *cached {
                    return Ok(Some(token.clone()));
                }
                let token = self
                    .issue_token(user_name.as_deref(), user_id.as_deref(), password)
                    .await?;
                *cached = Some(token.clone());
                Ok(Some(token))
            }
        }
    }

    async fn issue_token(
        &self,
        user_name: Option<&str>,
        user_id: Option<&str>,
        password: &str,
    ) -> ProviderResult<String> {
        let config = self.config();
        let mut user = json!({ "password": password });
        if let Some(id) = user_id {
            user["id"] = json!(id);
        } else if let Some(name) = user_name {
            user["name"] = json!(name);
            if let Some(ref domain_id) = config.domain_id {
                user["domain"] = json!({ "id": domain_id });
            } else if let Some(ref domain_name) = config.domain_name {
                user["domain"] = json!({ "name": domain_name });
            }
        }
        let project = match (&config.project_id, &config.project_name) {
            (Some(id), _) => json!({ "id": id }),
            (None, Some(name)) => json!({ "name": name }),
            (None, None) => json!({ "name": config.region }),
        };
        let body = json!({
            "auth": {
                "identity": { "methods": ["password"], "password": { "user": user } },
                "scope": { "project": project }
            }
        });

        let url = format!("{}/auth/tokens", config.identity_endpoint());
        let (headers, response) = self
            .execute(Method::POST, &url, Some(&body), BTreeMap::new(), None, true)
            .await
            .map_err(|e| ProviderError::from(e).context("authentication failed"))?;

        let token = headers
            .get("X-Subject-Token")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ProviderError::config("IAM response carries no X-Subject-Token"))?
            .to_string();

        if let Some(project_id) = response
            .pointer("/token/project/id")
            .and_then(JsonValue::as_str)
        {
            self.inner
                .projects
                .lock()
                .await
                .insert(config.region.clone(), project_id.to_string());
        }
        Ok(token)
    }

    /// Send a request, retrying throttled responses
    ///
    /// `sensitive` keeps the request body out of the debug log.
    async fn execute(
        &self,
        method: Method,
        url: &str,
        body: Option<&JsonValue>,
        headers: BTreeMap<String, String>,
        token: Option<&str>,
        sensitive: bool,
    ) -> Result<(HeaderMap, JsonValue), ApiError> {
        let parsed = Url::parse(url).map_err(|source| ApiError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        let payload = body.map(|b| b.to_string()).unwrap_or_default();
        if !sensitive && !payload.is_empty() {
            log::debug!("{} {} request body: {}", method, url, payload);
        }

        let max_retries = self.config().max_retries();
        let mut retries = 0;
        loop {
            let mut request_headers = headers.clone();
            if body.is_some() {
                request_headers.insert("Content-Type".to_string(), "application/json".to_string());
            }
            if let Some(token) = token {
                request_headers.insert("X-Auth-Token".to_string(), token.to_string());
            }
            if let AuthMethod::AkSk {
                security_token: Some(ref security_token),
                ..
            } = self.inner.auth
            {
                request_headers.insert("X-Security-Token".to_string(), security_token.clone());
            }
            if let Some(ref signer) = self.inner.signer {
                let authorization = signer.sign(
                    method.as_str(),
                    &parsed,
                    &mut request_headers,
                    payload.as_bytes(),
                    Utc::now(),
                );
                request_headers.insert("Authorization".to_string(), authorization);
            }

            let mut request = self.inner.http.request(method.clone(), parsed.clone());
            for (name, value) in &request_headers {
                // reqwest derives Host from the URL
                if !name.eq_ignore_ascii_case("host") {
                    request = request.header(name.as_str(), value.as_str());
                }
            }
            if body.is_some() {
                request = request.body(payload.clone());
            }

            let response = request.send().await.map_err(|source| ApiError::Transport {
                method: method.to_string(),
                url: url.to_string(),
                source,
            })?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS && retries < max_retries {
                let wait = retry_backoff(retries);
                log::warn!(
                    "Received StatusTooManyRequests from {}, sleeping {} minutes",
                    url,
                    wait.as_secs() / 60
                );
                tokio::time::sleep(wait).await;
                retries += 1;
                continue;
            }

            let response_headers = response.headers().clone();
            let text = response.text().await.map_err(|source| ApiError::Transport {
                method: method.to_string(),
                url: url.to_string(),
                source,
            })?;

            if !status.is_success() {
                return Err(ApiError::from_response(
                    method.as_str(),
                    url,
                    status.as_u16(),
                    &text,
                ));
            }
            if !sensitive {
                log::debug!("{} {} response ({}): {}", method, url, status.as_u16(), text);
            }

            if text.trim().is_empty() {
                return Ok((response_headers, JsonValue::Null));
            }
            let json = serde_json::from_str(&text).map_err(|source| ApiError::Decode {
                url: url.to_string(),
                source,
            })?;
            return Ok((response_headers, json));
        }
    }
}

/// Per-service, per-region client
#[derive(Clone)]
pub struct ServiceClient {
    client: Client,
    catalog: &'static ServiceCatalog,
    region: String,
    endpoint: String,
    resource_base: String,
    project_id: Option<String>,
    token: Option<String>,
}

impl std::fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient")
            .field("service", &self.catalog.name)
            .field("region", &self.region)
            .field("resource_base", &self.resource_base)
            .finish()
    }
}

impl ServiceClient {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn resource_base(&self) -> &str {
        &self.resource_base
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn project_id(&self) -> &str {
        self.project_id.as_deref().unwrap_or_default()
    }

    /// URL relative to the resource base
    pub fn service_url(&self, path: &str) -> String {
        format!("{}{}", self.resource_base, path.trim_start_matches('/'))
    }

    /// URL relative to the endpoint root
    pub fn endpoint_url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path.trim_start_matches('/'))
    }

    /// Status wait paced by the provider's `max_poll_wait`
    pub fn state_change(
        &self,
        pending: &[&str],
        target: &[&str],
        timeout: Duration,
    ) -> StateChangeConf {
        StateChangeConf::new(pending, target, timeout)
            .with_max_wait(self.client.config().max_poll_wait)
    }

    pub async fn get(&self, url: &str) -> Result<JsonValue, ApiError> {
        self.request(Method::GET, url, None).await
    }

    pub async fn post(&self, url: &str, body: &JsonValue) -> Result<JsonValue, ApiError> {
        self.request(Method::POST, url, Some(body)).await
    }

    pub async fn put(&self, url: &str, body: &JsonValue) -> Result<JsonValue, ApiError> {
        self.request(Method::PUT, url, Some(body)).await
    }

    pub async fn patch(&self, url: &str, body: &JsonValue) -> Result<JsonValue, ApiError> {
        self.request(Method::PATCH, url, Some(body)).await
    }

    pub async fn delete(&self, url: &str) -> Result<JsonValue, ApiError> {
        self.request(Method::DELETE, url, None).await
    }

    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&JsonValue>,
    ) -> Result<JsonValue, ApiError> {
        let mut headers = BTreeMap::new();
        if self.catalog.scope == Scope::Regional
            && let Some(ref project_id) = self.project_id
        {
            headers.insert("X-Project-Id".to_string(), project_id.clone());
        }
        self.client
            .execute(method, url, body, headers, self.token.as_deref(), false)
            .await
            .map(|(_, json)| json)
    }
}
