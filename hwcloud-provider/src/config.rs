//! Provider configuration
//!
//! Settings are read from `HW_*` environment variables first and then
//! overridden by the arguments of the `provider.huaweicloud` block.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use hwcloud_core::provider::{ProviderError, ProviderResult};
use hwcloud_core::resource::Value;

pub const DEFAULT_CLOUD: &str = "myhuaweicloud.com";
pub const DEFAULT_MAX_RETRIES: i64 = 5;

/// How requests are authenticated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// Pre-issued IAM token sent as `X-Auth-Token`
    Token(String),
    /// Every request is signed with the access key pair
    AkSk {
        access_key: String,
        secret_key: String,
        security_token: Option<String>,
    },
    /// A project-scoped token is obtained from IAM with user credentials
    Password {
        user_name: Option<String>,
        user_id: Option<String>,
        password: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub security_token: Option<String>,
    pub token: Option<String>,
    pub user_name: Option<String>,
    pub user_id: Option<String>,
    pub password: Option<String>,
    pub project_id: Option<String>,
    pub project_name: Option<String>,
    pub domain_id: Option<String>,
    pub domain_name: Option<String>,
    pub auth_url: Option<String>,
    pub cloud: String,
    pub insecure: bool,
    pub ca_cert_file: Option<String>,
    pub client_cert_file: Option<String>,
    pub client_key_file: Option<String>,
    pub max_retries: i64,
    pub enterprise_project_id: Option<String>,
    /// Use regional endpoints for global services too
    pub region_client: bool,
    /// Per-service endpoint overrides, keyed by catalog name
    pub endpoints: HashMap<String, String>,
    /// Upper bound on every pause while waiting for a remote status
    pub max_poll_wait: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: String::new(),
            access_key: None,
            secret_key: None,
            security_token: None,
            token: None,
            user_name: None,
            user_id: None,
            password: None,
            project_id: None,
            project_name: None,
            domain_id: None,
            domain_name: None,
            auth_url: None,
            cloud: DEFAULT_CLOUD.to_string(),
            insecure: false,
            ca_cert_file: None,
            client_cert_file: None,
            client_key_file: None,
            max_retries: DEFAULT_MAX_RETRIES,
            enterprise_project_id: None,
            region_client: false,
            endpoints: HashMap::new(),
            max_poll_wait: None,
        }
    }
}

impl Config {
    /// Build a configuration from `HW_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let mut config = Self {
            region: get("HW_REGION_NAME").unwrap_or_default(),
            access_key: get("HW_ACCESS_KEY"),
            secret_key: get("HW_SECRET_KEY"),
            security_token: get("HW_SECURITY_TOKEN"),
            token: get("HW_AUTH_TOKEN"),
            user_name: get("HW_USER_NAME"),
            user_id: get("HW_USER_ID"),
            password: get("HW_USER_PASSWORD"),
            project_id: get("HW_PROJECT_ID"),
            project_name: get("HW_PROJECT_NAME"),
            domain_id: get("HW_DOMAIN_ID"),
            domain_name: get("HW_DOMAIN_NAME"),
            auth_url: get("HW_AUTH_URL"),
            ca_cert_file: get("HW_CACERT_FILE"),
            client_cert_file: get("HW_CLIENT_CERT_FILE"),
            client_key_file: get("HW_CLIENT_KEY_FILE"),
            enterprise_project_id: get("HW_ENTERPRISE_PROJECT_ID"),
            ..Self::default()
        };
        if let Some(cloud) = get("HW_CLOUD") {
            config.cloud = cloud;
        }
        if let Some(insecure) = get("HW_INSECURE") {
            config.insecure = matches!(insecure.as_str(), "1" | "true" | "TRUE" | "True");
        }
        if let Some(retries) = get("HW_MAX_RETRIES").and_then(|v| v.parse().ok()) {
            config.max_retries = retries;
        }
        config
    }

    /// Override settings with the arguments of the provider block
    pub fn apply_provider_block(&mut self, block: &HashMap<String, Value>) -> ProviderResult<()> {
        for (key, value) in block {
            let text = || -> ProviderResult<String> {
                value
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ProviderError::config(format!("'{}' must be a string", key)))
            };
            match key.as_str() {
                "region" => self.region = text()?,
                "access_key" => self.access_key = Some(text()?),
                "secret_key" => self.secret_key = Some(text()?),
                "security_token" => self.security_token = Some(text()?),
                "token" => self.token = Some(text()?),
                "user_name" => self.user_name = Some(text()?),
                "user_id" => self.user_id = Some(text()?),
                "password" => self.password = Some(text()?),
                "project_id" => self.project_id = Some(text()?),
                "project_name" => self.project_name = Some(text()?),
                "domain_id" => self.domain_id = Some(text()?),
                "domain_name" => self.domain_name = Some(text()?),
                "auth_url" => self.auth_url = Some(text()?),
                "cloud" => self.cloud = text()?,
                "cacert_file" => self.ca_cert_file = Some(text()?),
                "cert" => self.client_cert_file = Some(text()?),
                "key" => self.client_key_file = Some(text()?),
                "enterprise_project_id" => self.enterprise_project_id = Some(text()?),
                "insecure" => {
                    self.insecure = value.as_bool().ok_or_else(|| {
                        ProviderError::config("'insecure' must be a boolean")
                    })?
                }
                "region_client" => {
                    self.region_client = value.as_bool().ok_or_else(|| {
                        ProviderError::config("'region_client' must be a boolean")
                    })?
                }
                "max_retries" => {
                    self.max_retries = value.as_int().ok_or_else(|| {
                        ProviderError::config("'max_retries' must be a number")
                    })?
                }
                "endpoints" => {
                    let map = value
                        .as_map()
                        .ok_or_else(|| ProviderError::config("'endpoints' must be a map"))?;
                    for (service, endpoint) in map {
                        let endpoint = endpoint.as_str().ok_or_else(|| {
                            ProviderError::config(format!("endpoint of '{}' must be a string", service))
                        })?;
                        self.endpoints.insert(service.clone(), normalize_endpoint(endpoint));
                    }
                }
                other => {
                    return Err(ProviderError::config(format!(
                        "unsupported provider argument '{}'",
                        other
                    )));
                }
            }
        }
        Ok(())
    }

    /// Check the configuration and pick the authentication method
    pub fn validate(&self) -> ProviderResult<AuthMethod> {
        if self.max_retries < 0 {
            return Err(ProviderError::config("max_retries should be a positive value"));
        }
        if self.region.is_empty() {
            return Err(ProviderError::config(
                "region must be set through the provider block or HW_REGION_NAME",
            ));
        }
        if self.client_cert_file.is_some() != self.client_key_file.is_some() {
            return Err(ProviderError::config(
                "client certificate and client key must be set together",
            ));
        }

        if let Some(ref token) = self.token {
            return Ok(AuthMethod::Token(token.clone()));
        }

        match (&self.access_key, &self.secret_key) {
            (Some(ak), Some(sk)) => {
                return Ok(AuthMethod::AkSk {
                    access_key: ak.clone(),
                    secret_key: sk.clone(),
                    security_token: self.security_token.clone(),
                });
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(ProviderError::config(
                    "access_key and secret_key must be set together",
                ));
            }
            (None, None) => {}
        }

        if let Some(ref password) = self.password {
            if self.user_name.is_none() && self.user_id.is_none() {
                return Err(ProviderError::config(
                    "\"password\": one of `user_name, user_id` must be specified",
                ));
            }
            return Ok(AuthMethod::Password {
                user_name: self.user_name.clone(),
                user_id: self.user_id.clone(),
                password: password.clone(),
            });
        }

        Err(ProviderError::config(
            "must config token or aksk or username password to be authorized",
        ))
    }

    /// IAM v3 endpoint without trailing slash
    pub fn identity_endpoint(&self) -> String {
        match self.auth_url {
            Some(ref url) => url.trim_end_matches('/').to_string(),
            None => format!("https://iam.{}.{}/v3", self.region, self.cloud),
        }
    }

    pub fn max_retries(&self) -> u32 {
        u32::try_from(self.max_retries).unwrap_or(0)
    }
}

/// Endpoints always end with a slash so paths can be appended
fn normalize_endpoint(endpoint: &str) -> String {
    if endpoint.ends_with('/') {
        endpoint.to_string()
    } else {
        format!("{}/", endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn reads_environment() {
        let config = Config::from_lookup(lookup(&[
            ("HW_REGION_NAME", "cn-north-4"),
            ("HW_ACCESS_KEY", "ak"),
            ("HW_SECRET_KEY", "sk"),
            ("HW_MAX_RETRIES", "2"),
            ("HW_INSECURE", "true"),
            ("HW_PROJECT_ID", ""),
        ]));
        assert_eq!(config.region, "cn-north-4");
        assert_eq!(config.max_retries, 2);
        assert!(config.insecure);
        assert_eq!(config.cloud, DEFAULT_CLOUD);
        assert!(config.project_id.is_none());
        assert!(matches!(config.validate(), Ok(AuthMethod::AkSk { .. })));
    }

    #[test]
    fn provider_block_overrides_environment() {
        let mut config = Config::from_lookup(lookup(&[("HW_REGION_NAME", "cn-north-4")]));
        let mut endpoints = HashMap::new();
        endpoints.insert(
            "vpc".to_string(),
            Value::String("http://127.0.0.1:8080".to_string()),
        );
        let mut block = HashMap::new();
        block.insert("region".to_string(), Value::String("cn-south-1".to_string()));
        block.insert("token".to_string(), Value::String("t0k3n".to_string()));
        block.insert("max_retries".to_string(), Value::Int(0));
        block.insert("endpoints".to_string(), Value::Map(endpoints));

        config.apply_provider_block(&block).unwrap();
        assert_eq!(config.region, "cn-south-1");
        assert_eq!(config.max_retries(), 0);
        assert_eq!(config.endpoints["vpc"], "http://127.0.0.1:8080/");
        assert_eq!(config.validate().unwrap(), AuthMethod::Token("t0k3n".to_string()));
    }

    #[test]
    fn unknown_provider_argument_is_rejected() {
        let mut block = HashMap::new();
        block.insert("colour".to_string(), Value::String("red".to_string()));
        let err = Config::default().apply_provider_block(&block).unwrap_err();
        assert_eq!(err.kind, hwcloud_core::provider::ErrorKind::Config);
    }

    #[test]
    fn validation_errors() {
        let base = Config {
            region: "cn-north-4".to_string(),
            ..Config::default()
        };

        let negative = Config {
            max_retries: -1,
            access_key: Some("ak".into()),
            secret_key: Some("sk".into()),
            ..base.clone()
        };
        assert!(negative.validate().unwrap_err().message.contains("max_retries"));

        assert!(base.validate().unwrap_err().message.contains("authorized"));

        let half_aksk = Config {
            access_key: Some("ak".into()),
            ..base.clone()
        };
        assert!(half_aksk.validate().is_err());

        let no_user = Config {
            password: Some("secret".into()),
            ..base.clone()
        };
        assert!(no_user.validate().unwrap_err().message.contains("user_name"));

        let with_user = Config {
            password: Some("secret".into()),
            user_name: Some("admin".into()),
            ..base.clone()
        };
        assert!(matches!(with_user.validate(), Ok(AuthMethod::Password { .. })));

        let no_region = Config {
            token: Some("t".into()),
            ..Config::default()
        };
        assert!(no_region.validate().is_err());
    }

    #[test]
    fn token_takes_precedence_over_aksk() {
        let config = Config {
            region: "cn-north-4".to_string(),
            token: Some("t".into()),
            access_key: Some("ak".into()),
            secret_key: Some("sk".into()),
            ..Config::default()
        };
        assert_eq!(config.validate().unwrap(), AuthMethod::Token("t".to_string()));
    }

    #[test]
    fn identity_endpoint_defaults_to_region() {
        let mut config = Config {
            region: "cn-north-4".to_string(),
            ..Config::default()
        };
        assert_eq!(
            config.identity_endpoint(),
            "https://iam.cn-north-4.myhuaweicloud.com/v3"
        );
        config.auth_url = Some("https://iam.example.com/v3/".to_string());
        assert_eq!(config.identity_endpoint(), "https://iam.example.com/v3");
    }
}
