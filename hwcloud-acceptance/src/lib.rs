//! hwcloud Acceptance
//!
//! Harness for acceptance tests of the HuaweiCloud provider:
//!
//! - **TestEnv**: settings read from `HW_*` variables, with pre-checks that
//!   skip a live test when its prerequisites are missing
//! - **TestCase**: apply and import steps run against a provider, with
//!   attribute checks after each apply and a destroy check at the end
//!
//! ```ignore
//! let Some(env) = TestEnv::setup(&[]) else { return };
//! let provider = HuaweiCloudProvider::new(env.provider_config())?;
//! let case = TestCase::new().step(
//!     TestStep::apply(config).check(Check::attr("huaweicloud_vpc.test", "status", "OK")),
//! );
//! run(provider, case).await?;
//! ```

pub mod check;
pub mod env;
pub mod runner;

pub use check::{Check, TestState};
pub use env::{Requirement, TestEnv, random_cidr, random_name};
pub use runner::{ApplyStep, ImportStep, Runner, TestCase, TestError, TestStep, run};
