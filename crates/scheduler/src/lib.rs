//! PDF Compare Scheduler Library
//!
//! Scheduling primitives for progressive, cancellable page rendering.
//!
//! - [`TicketCounter`] / [`Ticket`]: generation counters. A new source issues
//!   a new ticket; work holding an older ticket checks [`Ticket::is_stale`]
//!   at every resumption point and discards itself.
//! - [`PageRenderPool`]: a small, fixed number of cooperative workers that
//!   pull page indices from a shared counter.
//! - [`CancellationRegistry`]: advisory cancel handles for in-flight renders.
//! - [`Throttle`]: trailing-edge rate limiting that keeps the latest event.
//! - [`HostLoop`]: timeouts and animation frames, with tokio and manual
//!   implementations.
//!
//! # Example
//!
//! ```
//! use pdf_compare_scheduler::{PageRenderPool, PoolConfig, TicketCounter};
//!
//! # futures::executor::block_on(async {
//! let tickets = TicketCounter::new();
//! let ticket = tickets.issue();
//!
//! let pool = PageRenderPool::new(PoolConfig::default());
//! let report = pool.run(4, &ticket, |page| async move {
//!     // Render page `page` (1-based) here.
//!     let _ = page;
//! }).await;
//!
//! assert_eq!(report.finished, 4);
//! # });
//! ```

mod cancel;
mod pool;
mod retry;
mod throttle;
mod ticket;
mod timer;

// Re-export public API
pub use cancel::{CancelHandle, CancellationRegistry};
pub use pool::{PageRenderPool, PoolConfig, PoolReport, DEFAULT_RENDER_CONCURRENCY};
pub use retry::{RetryPolicy, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_INTERVAL};
pub use throttle::{Throttle, ThrottleDecision};
pub use ticket::{Ticket, TicketCounter};
pub use timer::{HostLoop, ManualLoop, TimerCallback, TimerId, TokioLoop, DEFAULT_FRAME_INTERVAL};
