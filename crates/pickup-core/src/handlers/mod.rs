//! Event handlers for the order lifecycle.
//!
//! Each handler reacts to one kind of trigger and can be exercised on its own
//! with in-memory collaborators: the scheduling handler turns order changes
//! into deferred tasks, the task handler runs delivered tasks through the
//! transition guard, and the notification handler tells customers and
//! businesses about committed changes.

pub mod notification;
pub mod scheduling;
pub mod stats;
pub mod task;

pub use notification::{NotificationError, NotificationHandler};
pub use scheduling::{SchedulingError, SchedulingHandler};
pub use stats::{TaskCounts, TaskStats};
pub use task::{TaskError, TaskHandler, TaskOutcome};
