//! Migration orchestration: command protocol, attempt tracking, the
//! driver, failure injection, permission checks, and the post-migration
//! oracle.

pub mod attempt;
pub mod driver;
pub mod inject;
pub mod oracle;
pub mod permissions;
pub mod protocol;
