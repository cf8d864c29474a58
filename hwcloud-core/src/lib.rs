//! hwcloud Core
//!
//! Resource model, schemas, the status poller and the plan/apply engine
//! shared by the HuaweiCloud provider, the acceptance harness and the CLI

pub mod binding;
pub mod differ;
pub mod effect;
pub mod interpreter;
pub mod parser;
pub mod plan;
pub mod provider;
pub mod resource;
pub mod schema;
pub mod wait;
