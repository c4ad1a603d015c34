//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod runtime;
pub mod telemetry;
