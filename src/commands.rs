//! Subcommand handlers
//!
//! Handlers take the loaded config and write their user-facing output to `output`.
//! Saving the config and restoring the backup is left to the caller.

pub mod install;
pub mod remove;
pub mod status;
pub mod update;
