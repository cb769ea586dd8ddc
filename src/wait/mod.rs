//! Polling: time source, soft deadline, wait predicates, and the poll loop.

pub mod clock;
pub mod condition;
pub mod deadline;
pub mod poll;
