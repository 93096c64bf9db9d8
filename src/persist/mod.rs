//! Persistence Module
//!
//! Write-behind delivery of already-applied mutations to the backing store.
//!
//! ## Responsibilities
//! - Describe each durable write as a [`Statement`] (template + arguments)
//! - Buffer statements in a bounded FIFO, blocking producers when full
//! - Apply them with exactly one background worker, in submission order
//! - Log and count failed statements without retrying them
//!
//! ## Flow
//! ```text
//!  insert/delete ──submit──▶ ┌──────────────────┐
//!  insert/delete ──submit──▶ │ bounded channel  │──▶ writer thread ──▶ Backend
//!  insert/delete ──submit──▶ └──────────────────┘     (one, FIFO)
//! ```

mod queue;
mod statement;

pub use queue::{QueueStats, WriteBehindQueue};
pub use statement::{Statement, StatementKind};
