//! Logging facility
//!
//! Structured logging for the access layer: a single initialization point
//! built on `tracing-subscriber` plus canonical operation-logging macros
//! whose field keys come from `carta_core_types::schema`.
//!
//! Lower layers (store, core) use only `tracing::debug!()` for internal
//! details; the `log_op_*` macros are the surface applications log
//! operations with.

mod init;
mod macros;

pub use init::{init, Profile};
