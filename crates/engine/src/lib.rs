//! Owned-store facade for the bid-reconciliation system.
//!
//! This crate handles:
//! - Loading the store at start-up and flushing it after every mutation
//! - Running each mutation atomically against the store
//! - Exposing ingestion, review, aggregation and validation operations
//! - SQLite persistence

pub mod engine;
pub mod sqlite;

pub use engine::Engine;
pub use sqlite::SqliteGateway;
