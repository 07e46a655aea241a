//! Response shaping: turns a raw completion into a deliverable reply.
//!
//! Every stage is a pure string transform except the truncation guard, which
//! may make one extra provider call. `pipeline` wires them together.

pub mod citations;
pub mod coach_block;
pub mod leaks;
pub mod pipeline;
pub mod sanitize;
pub mod scoring;
pub mod sections;
pub mod sentences;
pub mod truncation;
