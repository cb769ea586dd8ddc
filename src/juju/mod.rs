//! Control-plane client layer: identity handles, command execution, typed
//! output, the local controller registry, and the remote shell channel.

pub mod client;
pub mod handle;
pub mod registry;
pub mod remote;
pub mod runner;
pub mod status;
