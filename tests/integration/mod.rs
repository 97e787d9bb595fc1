//! Integration tests for the Pulse metrics pipeline

mod cli_commands;
mod config_integration;
mod ingestion_reconnect;
mod lifecycle;
mod pipeline_shutdown;
mod test_utils;
