//! Data Models
//!
//! Contains all data structures used throughout the application.

pub mod query;
pub mod settings;

pub use query::*;
pub use settings::*;
