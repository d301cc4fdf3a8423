//! Command line front end of the open data ingestion pipeline.
pub mod commands;
pub mod config;
pub mod logging;
