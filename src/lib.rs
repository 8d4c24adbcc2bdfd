pub mod active_service;
pub mod clock;
pub mod coerce;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod loader;
pub mod orchestrator;
pub mod output;
pub mod report;
pub mod runner;
pub mod schema;
