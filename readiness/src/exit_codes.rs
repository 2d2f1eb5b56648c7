//! Stable exit codes for readiness CLI commands.

/// Endpoint reachable and verification passed.
pub const OK: i32 = 0;
/// Invalid configuration, arguments, or other errors.
pub const INVALID: i32 = 1;
/// Endpoint unreachable after the fast probe and any supervised launch.
pub const UNREACHABLE: i32 = 2;
/// Endpoint reachable but verification failed.
pub const VERIFICATION_FAILED: i32 = 3;
