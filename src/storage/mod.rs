//! Storage Layer
//!
//! Handles the queried dataset (SQLite) and the JSON config.

pub mod config;
pub mod database;

pub use config::*;
pub use database::*;
