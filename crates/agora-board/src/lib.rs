//! Agora Board - Task and assignment state
//!
//! The board owns the records every other component keys off: tasks and the
//! assignments that bind them to winners. Its central primitive is the
//! conditional status transition: a test-and-set performed under a single
//! lock acquisition, never a read followed by a separate write. That is
//! what makes auction close and the escrow lifecycle exactly-once under
//! concurrent callers.

pub mod assignments;
pub mod tasks;

pub use assignments::AssignmentBook;
pub use tasks::TaskBoard;
