//! Genus Library
//!
//! Fixed capacity budget shared by process "genera": copy-on-fork views,
//! owner-only release, and reclamation deferred until the owner is reaped.

pub mod commands;
pub mod config;
pub mod core;
pub mod error;
pub mod hooks;
pub mod logging;
pub mod process_table;
pub mod registry;
pub mod scenario;
pub mod utils;

// Re-export commonly used types for convenience
pub use crate::config::RegistryConfig;
pub use crate::core::models::*;
pub use crate::error::{ConfigError, GenusError, GenusErrorKind, GenusResult, ProcessError};
pub use crate::hooks::LifecycleHooks;
pub use crate::process_table::{HostCapabilities, ProcessEntry, ProcessTable, Reaped};
pub use crate::registry::{CapacityRegistry, ReleaseOutcome};
