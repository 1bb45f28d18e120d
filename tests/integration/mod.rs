//! Integration Tests Module
//!
//! End-to-end tests for query synthesis. Model providers are scripted and
//! datasets are in-memory SQLite or stubs, so no test touches the network.

// Scripted providers, stub datasets and the clinic fixture
mod support;

// Retry loop termination, reflection and prompt context
mod orchestrator_test;

// Topology routing, multi-role handoff, fallback, execution and config
mod query_service_test;
