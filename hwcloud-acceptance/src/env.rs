//! Test environment read from `HW_*` variables

use hwcloud_provider::Config;

/// Variable that turns live acceptance tests on
pub const ACC_FLAG: &str = "HW_ACC";

/// Conditions a live test needs before it touches the cloud
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Enterprise project to place resources in
    EnterpriseProject,
    /// Existing VPC and subnet to attach to
    VpcSubnet,
    AvailabilityZone,
    /// Data Encryption Workshop is enabled for the account
    Kms,
    /// The account may create CCE clusters
    Cce,
}

/// Settings shared by every acceptance test
#[derive(Debug, Clone, Default)]
pub struct TestEnv {
    pub enabled: bool,
    pub region: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub token: Option<String>,
    pub project_id: Option<String>,
    pub enterprise_project_id: Option<String>,
    pub availability_zone: Option<String>,
    pub vpc_id: Option<String>,
    pub subnet_id: Option<String>,
    pub kms_enabled: bool,
    pub cce_enabled: bool,
    config: Config,
}

impl TestEnv {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let flag = |key: &str| get(key).is_some();
        Self {
            enabled: flag(ACC_FLAG),
            region: get("HW_REGION_NAME"),
            access_key: get("HW_ACCESS_KEY"),
            secret_key: get("HW_SECRET_KEY"),
            token: get("HW_AUTH_TOKEN"),
            project_id: get("HW_PROJECT_ID"),
            enterprise_project_id: get("HW_ENTERPRISE_PROJECT_ID"),
            availability_zone: get("HW_AVAILABILITY_ZONE"),
            vpc_id: get("HW_VPC_ID"),
            subnet_id: get("HW_SUBNET_ID"),
            kms_enabled: flag("HW_DEW_ENABLE_FLAG"),
            cce_enabled: flag("HW_CCE_ENABLE_FLAG"),
            config: Config::from_lookup(&lookup),
        }
    }

    /// Provider configuration built from the same variables
    pub fn provider_config(&self) -> Config {
        self.config.clone()
    }

    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or_default()
    }

    /// Check the base settings and every requirement.
    ///
    /// The error is a human readable reason for skipping the test.
    pub fn pre_check(&self, requirements: &[Requirement]) -> Result<(), String> {
        if !self.enabled {
            return Err(format!("acceptance tests skipped unless {} is set", ACC_FLAG));
        }
        if self.region.is_none() {
            return Err("HW_REGION_NAME must be set for acceptance tests".to_string());
        }
        let has_aksk = self.access_key.is_some() && self.secret_key.is_some();
        if !has_aksk && self.token.is_none() {
            return Err(
                "HW_ACCESS_KEY and HW_SECRET_KEY (or HW_AUTH_TOKEN) must be set for acceptance tests"
                    .to_string(),
            );
        }

        for requirement in requirements {
            let missing = match requirement {
                Requirement::EnterpriseProject => {
                    self.enterprise_project_id.is_none().then_some("HW_ENTERPRISE_PROJECT_ID")
                }
                Requirement::VpcSubnet => (self.vpc_id.is_none() || self.subnet_id.is_none())
                    .then_some("HW_VPC_ID and HW_SUBNET_ID"),
                Requirement::AvailabilityZone => {
                    self.availability_zone.is_none().then_some("HW_AVAILABILITY_ZONE")
                }
                Requirement::Kms => (!self.kms_enabled).then_some("HW_DEW_ENABLE_FLAG"),
                Requirement::Cce => (!self.cce_enabled).then_some("HW_CCE_ENABLE_FLAG"),
            };
            if let Some(missing) = missing {
                return Err(format!("{} must be set for this acceptance test", missing));
            }
        }
        Ok(())
    }

    /// Environment for a live test, or `None` after logging why it is skipped
    pub fn setup(requirements: &[Requirement]) -> Option<Self> {
        let env = Self::from_env();
        match env.pre_check(requirements) {
            Ok(()) => Some(env),
            Err(reason) => {
                eprintln!("skipping: {}", reason);
                None
            }
        }
    }
}

/// Name prefixed with `tf-acc-test-` and five random characters
pub fn random_name() -> String {
    format!("tf-acc-test-{}", random_suffix(5))
}

/// Random `172.16.x.0/24` block
pub fn random_cidr() -> String {
    format!("172.16.{}.0/24", uuid::Uuid::new_v4().as_bytes()[0])
}

fn random_suffix(len: usize) -> String {
    uuid::Uuid::new_v4().simple().to_string().chars().take(len).collect()
}
