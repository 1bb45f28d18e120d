//! Query Cascade - Rust Backend Library
//!
//! Self-correcting natural-language to SQL synthesis over SQLite datasets.
//! It includes:
//! - Query synthesis services and the retry/reflection orchestrator
//! - Storage layer (SQLite dataset, JSON config)
//! - Data models and utilities
//!
//! Model providers live in `query-cascade-llm`, SQL text utilities in
//! `query-cascade-validation` and shared value types in `query-cascade-core`.

pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

pub use models::query::{ConversationTurn, QueryData, QueryRequest, QueryResponse};
pub use models::settings::Settings;
pub use services::{router_from_settings, QueryService};
pub use storage::{ConfigService, Dataset, SqliteDataset};
pub use utils::error::{AppError, AppResult};

pub use query_cascade_core::{ModelRole, TerminationReason, Topology, ValidationResult};
