//! Persistence layer.
//!
//! # Responsibility
//! - Define the blob store contract and its SQLite/in-memory backends.
//! - Own annotation records and browser settings on top of that contract.
//!
//! # Invariants
//! - Each logical document is serialized whole under one fixed key.
//! - Persistence failures are surfaced as `StoreError`, never panics.

pub mod blob_repo;
pub mod metadata_store;
pub mod settings_repo;
