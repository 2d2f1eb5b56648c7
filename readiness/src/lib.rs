//! Readiness orchestration for integration-test harnesses.
//!
//! Given a target endpoint, decide whether the service behind it is already up;
//! if not, optionally launch the process that provides it, poll until it
//! accepts connections, run a verification step, and always tear down what was
//! launched. The crate keeps a strict separation:
//!
//! - **[`core`]**: Pure types (endpoint, policies, phases). No I/O.
//! - **[`io`]**: Probing, process supervision, polling, configuration, and
//!   verification collaborators.
//!
//! [`orchestrate`] ties both together.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrate;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
