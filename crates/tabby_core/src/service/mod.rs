//! Core use-case services.
//!
//! # Responsibility
//! - Reconcile snapshots into the published tab set.
//! - Plan and dispatch reminder delivery.
//! - Own session state behind one mutation surface.

pub mod reconciler;
pub mod reminder_service;
pub mod session;
