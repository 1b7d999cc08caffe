//! Infrastructure adapters and runtime bootstrap.

pub mod browser;
pub mod error;
pub mod host;
pub mod http;
pub mod telemetry;
