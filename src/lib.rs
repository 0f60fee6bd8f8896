//! Weft
//!
//! A cooperative task-scheduling pool. Work is expressed as frames —
//! suspended state machines advanced exactly one step per resume — that
//! stack into chains when a task awaits a sub-task, and a [`Pool`]
//! advances every chain one step per [`tick`](Pool::tick) from a single
//! host-driven polling loop.
//!
//! # Example
//!
//! ```
//! use weft::{Frame, Pool, Step};
//!
//! fn countdown(mut n: u32) -> Frame {
//!     Frame::new(move || {
//!         if n == 0 {
//!             return Ok(Step::Complete);
//!         }
//!         n -= 1;
//!         Ok(Step::Yield)
//!     })
//! }
//!
//! fn main() -> Result<(), weft::TaskFault> {
//!     let mut pool = Pool::new();
//!     pool.spawn(countdown(3));
//!     while !pool.is_empty() {
//!         pool.tick()?;
//!     }
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/weft")]
#![warn(rust_2018_idioms)]

// Public modules
pub mod runtime;

// Utility modules
pub mod util;

// Re-exports
pub use anyhow::{Context, Result};
pub use thiserror::Error;

pub use runtime::{
    Frame, FrameId, Pool, PoolId, Resumed, Step, StepResult, TaskBody, TaskFault,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
