//! State management for orders.
//!
//! The order record is the only mutable shared state in the service. Every
//! status write goes through [`OrderStateMachine`], which performs it as an
//! atomic compare-and-swap on the stored record.

pub mod order;

pub use order::{
	is_external_edge, OrderStateError, OrderStateMachine, StatusUpdate, TransitionOutcome,
};
