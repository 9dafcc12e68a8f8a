//! voxhub - speak through whatever speech service is available
//!
//! Backends for platform speech services register with a priority-ordered
//! [`BackendRegistry`]; callers ask for a backend by id, by name, or for the
//! best one that initializes, then drive it through the
//! [`TextToSpeechBackend`] contract. A C ABI over the same operations lives
//! in [`ffi`].

pub mod backend;
pub mod backends;
pub mod config;
pub mod context;
pub mod error;
pub mod ffi;
pub mod platform;
pub mod registry;
pub mod render;
pub mod util;

pub use backend::{lock_backend, Capabilities, SharedBackend, TextToSpeechBackend};
pub use context::{global_registry, Context};
pub use error::{BackendError, Result, VoxError};
pub use registry::{BackendId, BackendRegistry, Lookup};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "voxhub";
