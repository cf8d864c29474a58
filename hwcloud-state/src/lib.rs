//! hwcloud State Management
//!
//! Persists the observed state of managed resources between runs.
//!
//! - **StateFile**: every managed resource with its cloud ID and attributes,
//!   in creation order
//! - **StateBackend**: storage trait with advisory locking
//! - **LocalBackend**: JSON file plus `.lock` file next to it
//!
//! ```ignore
//! use hwcloud_state::{LocalBackend, StateBackend, StateFile};
//!
//! let backend = LocalBackend::with_path("hwcloud.state.json");
//! let lock = backend.acquire_lock("apply").await?;
//! let mut state = backend.read_state().await?.unwrap_or_default();
//! // ... apply, then record each outcome ...
//! state.increment_serial();
//! backend.write_state(&state).await?;
//! backend.release_lock(&lock).await?;
//! ```

pub mod backend;
pub mod backends;
pub mod lock;
pub mod state;

pub use backend::{BackendError, BackendResult, StateBackend};
pub use backends::LocalBackend;
pub use lock::LockInfo;
pub use state::{ResourceState, StateFile};
