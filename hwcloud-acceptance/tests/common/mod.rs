use hwcloud_acceptance::{Requirement, TestEnv};
use hwcloud_provider::HuaweiCloudProvider;

/// Environment and provider for a live test, or `None` when it is skipped
pub fn setup(requirements: &[Requirement]) -> Option<(TestEnv, HuaweiCloudProvider)> {
    let _ = env_logger::Builder::from_env(env_logger::Env::new().filter_or("HWCLOUD_LOG", "info"))
        .is_test(true)
        .try_init();
    let env = TestEnv::setup(requirements)?;
    let provider = HuaweiCloudProvider::new(env.provider_config()).expect("provider config");
    Some((env, provider))
}
