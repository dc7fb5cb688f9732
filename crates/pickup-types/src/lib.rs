//! Common types module for the pickup order lifecycle system.
//!
//! This module defines the core data types shared by every crate in the
//! workspace: orders and their status codes, the reference data orders point
//! at, deferred task payloads, change events, outbound notifications and the
//! configuration validation framework used by pluggable implementations.

/// API types for HTTP endpoints and request/response structures.
pub mod api;
/// Change events flowing through the engine's event bus.
pub mod events;
/// Reference data looked up by the lifecycle core (items and businesses).
pub mod item;
/// Outbound notification records.
pub mod notification;
/// Orders and the order status codes.
pub mod order;
/// Registry trait for self-registering implementations.
pub mod registry;
/// Storage namespaces.
pub mod storage;
/// Deferred task payloads and schedules.
pub mod task;
/// Utility functions for display formatting.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

// Re-export all types for convenient access
pub use api::*;
pub use events::*;
pub use item::*;
pub use notification::*;
pub use order::*;
pub use registry::ImplementationRegistry;
pub use storage::*;
pub use task::*;
pub use utils::{format_time_of_day, truncate_id};
pub use validation::*;
