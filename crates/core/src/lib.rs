//! Core types and configuration for the bid-reconciliation system.
//!
//! This crate provides shared types used across all other crates:
//! - Domain records (projects, packages, bids, bidders, bid events, snapshots)
//! - The owned in-memory store and its transaction/cascade helpers
//! - The persistence gateway boundary
//! - Configuration structures
//! - Common error types

pub mod config;
pub mod error;
pub mod persistence;
pub mod store;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use persistence::{JsonFileGateway, MemoryGateway, PersistenceGateway};
pub use store::Store;
pub use types::*;
