//! Side-effecting components: sockets, child processes, files.

pub mod config;
pub mod poller;
pub mod probe;
pub mod process;
pub mod supervisor;
pub mod verify;
