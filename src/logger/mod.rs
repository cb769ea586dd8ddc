//! Run logging: JSONL activity trail plus the recorder handle threaded
//! through every component.

pub mod jsonl;
pub mod recorder;
