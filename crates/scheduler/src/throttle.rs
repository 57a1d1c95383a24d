//! Trailing-edge throttle
//!
//! At most one invocation per interval, and the invocation always carries
//! the most recent event. The throttle only decides; the caller owns the
//! timer that delivers the trailing invocation.

use std::time::Duration;

/// What the caller should do with an offered event.
#[derive(Debug, Clone, PartialEq)]
pub enum ThrottleDecision<T> {
    /// Invoke the handler now with this event.
    Fire(T),
    /// Arm a timer for `delay`, then call [`Throttle::take_trailing`].
    Schedule(Duration),
    /// A trailing invocation is already armed; the event replaced its payload.
    Coalesced,
}

/// Rate limiter that keeps the latest event instead of dropping it.
///
/// # Example
///
/// ```
/// use pdf_compare_scheduler::{Throttle, ThrottleDecision};
/// use std::time::Duration;
///
/// let mut throttle = Throttle::new(Duration::from_millis(50));
/// let ms = Duration::from_millis;
///
/// assert_eq!(throttle.offer(ms(0), 1), ThrottleDecision::Fire(1));
/// assert_eq!(throttle.offer(ms(10), 2), ThrottleDecision::Schedule(ms(40)));
/// assert_eq!(throttle.offer(ms(20), 3), ThrottleDecision::Coalesced);
///
/// // The timer fires at 50ms and delivers the latest event.
/// assert_eq!(throttle.take_trailing(ms(50)), Some(3));
/// ```
#[derive(Debug, Clone)]
pub struct Throttle<T> {
    interval: Duration,
    last_fired: Option<Duration>,
    trailing: Option<T>,
    armed: bool,
}

impl<T> Throttle<T> {
    /// Create a throttle allowing one invocation per `interval`.
    pub fn new(interval: Duration) -> Self {
        Self { interval, last_fired: None, trailing: None, armed: false }
    }

    /// Minimum time between invocations.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Offer an event observed at `now` (monotonic time since an arbitrary origin).
    pub fn offer(&mut self, now: Duration, event: T) -> ThrottleDecision<T> {
        if self.armed {
            self.trailing = Some(event);
            return ThrottleDecision::Coalesced;
        }

        match self.last_fired {
            Some(last) if now.saturating_sub(last) < self.interval => {
                self.trailing = Some(event);
                self.armed = true;
                ThrottleDecision::Schedule(self.interval - now.saturating_sub(last))
            }
            _ => {
                self.last_fired = Some(now);
                ThrottleDecision::Fire(event)
            }
        }
    }

    /// Called when the armed timer fires; returns the latest pending event.
    pub fn take_trailing(&mut self, now: Duration) -> Option<T> {
        self.armed = false;
        let event = self.trailing.take();
        if event.is_some() {
            self.last_fired = Some(now);
        }
        event
    }

    /// `true` while a trailing invocation is armed.
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Forget all history and any pending event.
    pub fn reset(&mut self) {
        self.last_fired = None;
        self.trailing = None;
        self.armed = false;
    }
}
