pub mod config;
pub mod error;
pub mod linkage;
pub mod telemetry;
