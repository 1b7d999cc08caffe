//! Request-level domain types: typed render parameters and their validation.

pub mod error;
pub mod params;
pub mod source;
