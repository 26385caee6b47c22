//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod fetch;
pub mod notice;
pub mod output;
pub mod showdoc;
pub mod telemetry;
pub mod vault;
