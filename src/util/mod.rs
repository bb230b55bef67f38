pub mod env;
pub mod jitter;
pub mod telemetry;
