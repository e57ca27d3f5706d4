//! Hive Configuration
//!
//! Centralized configuration and process identity for Hive services.
//! Configuration is consumed once at the process boundary: environment
//! variables with the `HIVE_` prefix are deserialized into [`RuntimeConfig`]
//! and passed into the runtime at construction. Nothing in the core reads
//! the environment directly.
//!
//! [`identity`] derives the stable naming every service shares: the
//! `{namespace}/{host}/{pid}` topic path and its channel suffixes.

pub mod identity;
pub mod runtime;

pub use identity::{hostname, pid, username, ServiceIdentity};
pub use runtime::RuntimeConfig;
