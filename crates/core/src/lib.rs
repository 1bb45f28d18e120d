//! Query Cascade Core
//!
//! Foundational value types and error types for the Query Cascade workspace.
//! This crate has no dependencies on application-level code (datasets,
//! providers, orchestration).
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `types` - Values passed between orchestration stages (`ValidationResult`,
//!   `ModelRole`, `TerminationReason`, `Topology`)
//!
//! ## Design Principles
//!
//! 1. **Only serde/thiserror** - keeps build times minimal
//! 2. **Immutable values** - stages exchange values, never shared mutable state
//! 3. **Unidirectional dependency** - this crate depends on nothing else in the workspace

pub mod error;
pub mod types;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Stage Values ───────────────────────────────────────────────────────
pub use types::{ModelRole, TerminationReason, Topology, ValidationResult};
