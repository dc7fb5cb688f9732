//! Utility functions for display formatting.

pub mod formatting;

pub use formatting::{format_time_of_day, truncate_id};
