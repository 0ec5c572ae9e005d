pub mod config;
pub mod engine;
pub mod feeds;
pub mod gateway;
pub mod grid;
pub mod math;
pub mod telemetry;
pub mod types;
