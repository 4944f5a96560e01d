pub mod config;
pub mod connectors;
pub mod error;
pub mod logging;
pub mod mask;
pub mod orchestrator;
