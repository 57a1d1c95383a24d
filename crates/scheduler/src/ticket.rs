//! Generation tickets for cooperative cancellation
//!
//! Every source change issues a new ticket from the owning controller's
//! counter. Work tagged with an older ticket is stale and must be dropped
//! without touching shared state. Staleness is checked, never awaited, so
//! no lock is held across a suspension point.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Monotonic generation counter owned by one controller.
///
/// Cloning the counter shares the underlying generation, so tickets issued
/// from any clone compare against the same "live" value.
///
/// # Example
///
/// ```
/// use pdf_compare_scheduler::TicketCounter;
///
/// let counter = TicketCounter::new();
/// let first = counter.issue();
/// assert!(first.is_live());
///
/// let second = counter.issue();
/// assert!(first.is_stale());
/// assert!(second.is_live());
/// ```
#[derive(Debug, Clone, Default)]
pub struct TicketCounter {
    current: Arc<AtomicU64>,
}

impl TicketCounter {
    /// Create a counter; no ticket is live until the first `issue()`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next ticket, superseding every ticket issued before it.
    pub fn issue(&self) -> Ticket {
        let value = self.current.fetch_add(1, Ordering::AcqRel) + 1;
        Ticket { value, counter: self.clone() }
    }

    /// Supersede all outstanding tickets without handing out a new one.
    ///
    /// Returns the new generation value.
    pub fn invalidate(&self) -> u64 {
        self.current.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// The generation currently considered live.
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }
}

/// One generation of work.
#[derive(Debug, Clone)]
pub struct Ticket {
    value: u64,
    counter: TicketCounter,
}

impl Ticket {
    /// Numeric value of this ticket.
    pub fn value(&self) -> u64 {
        self.value
    }

    /// `true` while no newer ticket has been issued on the same counter.
    pub fn is_live(&self) -> bool {
        self.counter.current() == self.value
    }

    /// `true` once a newer ticket has been issued.
    pub fn is_stale(&self) -> bool {
        !self.is_live()
    }
}
