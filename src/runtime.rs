//! Runtime glue that wires configuration, the first-error latch, telemetry,
//! task orchestration and the hosting runner.

pub mod config;
pub mod fatal;
pub mod runner;
pub mod task;
pub mod telemetry;
