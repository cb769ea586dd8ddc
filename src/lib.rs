#![forbid(unsafe_code)]

//! Model Migration Assessor (mma): acceptance harness for live model
//! migration between two controllers.
//!
//! A run drives real `juju` commands against two already-bootstrapped
//! controllers and judges:
//! 1. **Ownership transfer**: the model leaves the source and appears on the destination
//! 2. **State preservation**: workloads keep serving the same payload
//! 3. **Log continuity**: pre-migration logs are replayed afterwards
//! 4. **Permissions**: only superusers may migrate
//! 5. **Rollback**: a destination outage mid-migration returns the model home
//!
//! # Library usage
//!
//! ```rust,no_run
//! use model_migration_assessor::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use model_migration_assessor::core::config::Config;
//! use model_migration_assessor::migration::protocol::ProtocolVariant;
//! ```

pub mod prelude;

pub mod core;
pub mod juju;
pub mod logger;
pub mod migration;
pub mod scenarios;
pub mod wait;
