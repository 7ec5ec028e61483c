//! Domain model for browser tabs and their annotations.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Keep browser-specific facts in a descriptor table.
//!
//! # Invariants
//! - Annotations are keyed by URL, identities by `TabId`.

pub mod browser;
pub mod tab;
