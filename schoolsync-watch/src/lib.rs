//! schoolsync-watch library exports.
//!
//! Wires the realtime layer to Supabase Realtime for one configured session
//! and logs every cache invalidation it would cause.

pub mod cache;
pub mod config;
pub mod console;
pub mod error;
pub mod protocol;
pub mod telemetry;
pub mod transport;
