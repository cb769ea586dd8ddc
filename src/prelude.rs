//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use model_migration_assessor::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{MmaError, Result};

// Observability
pub use crate::logger::recorder::{Echo, Recorder, RunEvent};

// Command surface
pub use crate::juju::client::JujuClient;
pub use crate::juju::handle::{ControlPlaneHandle, ModelHandle};
pub use crate::juju::remote::{RemoteShell, ServiceAction, SshRemote};
pub use crate::juju::runner::{CliRunner, CommandRunner, Invocation};

// Waiting
pub use crate::wait::clock::{Clock, SystemClock};
pub use crate::wait::condition::{Evaluation, WaitCondition};
pub use crate::wait::poll::{PollEngine, PollError};

// Migration
pub use crate::migration::attempt::{MigrationAttempt, MigrationPhase};
pub use crate::migration::driver::MigrationDriver;
pub use crate::migration::inject::{ApiServerOutage, FailureInjector};
pub use crate::migration::oracle::{ContinuityOracle, HttpProbe};
pub use crate::migration::protocol::ProtocolVariant;

// Scenarios
pub use crate::scenarios::{Harness, HarnessParts, RunReport, Scenario, ScenarioRunner};
