//! Deterministic types shared by the orchestrator.
//!
//! Core modules are free of I/O side effects: endpoint parsing, policies, and
//! the phase model can be tested in isolation.

pub mod budget;
pub mod endpoint;
pub mod phase;
pub mod policy;
