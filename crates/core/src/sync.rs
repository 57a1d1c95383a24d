//! Proportional scroll synchronization between two panes
//!
//! A scroll event on a pair's source is mirrored onto its target as a
//! ratio of the scrollable range, so panes of different content heights
//! stay aligned. Writes made by the synchronizer set a guard that is only
//! released on the next animation frame. While it is set, the scroll event
//! caused by that write on the target is dropped, which stops the mirrored
//! write from bouncing back. Every other event goes through the throttle.
//!
//! Handler invocations are throttled per direction with trailing-edge
//! semantics. An invocation that finds the guard held is retried on the
//! next frame against the source's position at that time. Panes that are not mounted yet are resolved again on a fixed
//! interval until a bounded number of retries is used up; giving up leaves
//! the panes unsynchronized and is reported through [`AttachState`].

use crate::scroll::{resolve_scroll_owner, ListenerId, ScrollElement, ScrollMetrics, ScrollPane};
use parking_lot::Mutex;
use pdf_compare_scheduler::{HostLoop, RetryPolicy, Throttle, ThrottleDecision, TimerId};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;

/// Tunables of a [`ScrollSynchronizer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncOptions {
    pub throttle: Duration,
    pub retry: RetryPolicy,
    pub search_depth: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            throttle: crate::config::DEFAULT_SCROLL_THROTTLE,
            retry: RetryPolicy::default(),
            search_depth: crate::config::DEFAULT_SCROLL_SEARCH_DEPTH,
        }
    }
}

/// Mirror scroll position from `source` onto `target`.
#[derive(Clone)]
pub struct SyncPair {
    pub source: Arc<dyn ScrollPane>,
    pub target: Arc<dyn ScrollPane>,
}

impl SyncPair {
    /// Mirror `source` onto `target` only.
    pub fn new(source: Arc<dyn ScrollPane>, target: Arc<dyn ScrollPane>) -> Self {
        Self { source, target }
    }

    /// Both directions between `a` and `b`.
    pub fn both(a: Arc<dyn ScrollPane>, b: Arc<dyn ScrollPane>) -> Vec<SyncPair> {
        vec![SyncPair::new(a.clone(), b.clone()), SyncPair::new(b, a)]
    }
}

/// Attachment progress, published on every change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachState {
    Detached,
    /// Waiting to run retry number `attempt`.
    Resolving { attempt: u32 },
    /// Listeners are bound; `attempts` retries were needed.
    Attached { attempts: u32 },
    /// Every retry ran without resolving both sides.
    GaveUp { attempts: u32 },
}

impl AttachState {
    /// `true` while listeners are bound.
    pub fn is_attached(&self) -> bool {
        matches!(self, AttachState::Attached { .. })
    }
}

/// Counters for one synchronizer, across attachments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Scroll events that reached the throttle.
    pub handled: u64,
    /// Positions written to a target.
    pub mirrored: u64,
    /// Echoes of the synchronizer's own writes that were dropped.
    pub suppressed: u64,
    /// Invocations pushed to the next frame because a write was in progress.
    pub deferred: u64,
}

/// Slack allowed between a written offset and the position a host reports.
const ECHO_TOLERANCE: f32 = 1.0;

struct BoundPair {
    source: Arc<dyn ScrollElement>,
    target: Arc<dyn ScrollElement>,
    listener: ListenerId,
    throttle: Throttle<ScrollMetrics>,
    trailing_timer: Option<TimerId>,
    deferred_frame: Option<TimerId>,
}

impl BoundPair {
    /// `true` if `metrics` is the event caused by writing `echo` to this
    /// pair's source.
    fn is_echo(&self, echo: Option<&(Arc<dyn ScrollElement>, f32)>, metrics: &ScrollMetrics) -> bool {
        echo.is_some_and(|(element, offset)| {
            Arc::ptr_eq(element, &self.source) && (metrics.scroll_top - offset).abs() < ECHO_TOLERANCE
        })
    }
}

#[derive(Default)]
struct SyncState {
    generation: u64,
    pending: Vec<SyncPair>,
    bound: Vec<BoundPair>,
    retry_timer: Option<TimerId>,
    release_frame: Option<TimerId>,
    /// Target and offset of the write holding the guard.
    echo: Option<(Arc<dyn ScrollElement>, f32)>,
}

struct SyncInner {
    host: Arc<dyn HostLoop>,
    options: SyncOptions,
    guard: AtomicBool,
    state: Mutex<SyncState>,
    attach_state: watch::Sender<AttachState>,
    handled: AtomicU64,
    mirrored: AtomicU64,
    suppressed: AtomicU64,
    deferred: AtomicU64,
}

/// Keeps two or more scroll containers at the same relative position.
///
/// Dropping the synchronizer detaches it.
pub struct ScrollSynchronizer {
    inner: Arc<SyncInner>,
}

impl ScrollSynchronizer {
    /// Create a detached synchronizer scheduling on `host`.
    pub fn new(host: Arc<dyn HostLoop>, options: SyncOptions) -> Self {
        let (attach_state, _) = watch::channel(AttachState::Detached);
        Self {
            inner: Arc::new(SyncInner {
                host,
                options,
                guard: AtomicBool::new(false),
                state: Mutex::new(SyncState::default()),
                attach_state,
                handled: AtomicU64::new(0),
                mirrored: AtomicU64::new(0),
                suppressed: AtomicU64::new(0),
                deferred: AtomicU64::new(0),
            }),
        }
    }

    /// Bind listeners for every pair, replacing any previous attachment.
    ///
    /// Resolution is tried immediately, then retried on the configured
    /// interval while either side of any pair is unresolved.
    pub fn attach(&self, pairs: Vec<SyncPair>) {
        self.detach();

        let generation = {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            state.pending = pairs;
            state.generation
        };
        self.inner.try_attach(generation, 0);
    }

    /// Remove every listener and pending timer.
    pub fn detach(&self) {
        self.inner.detach();
    }

    /// Current attachment state.
    pub fn state(&self) -> AttachState {
        *self.inner.attach_state.borrow()
    }

    /// Subscribe to attachment state changes.
    pub fn watch_state(&self) -> watch::Receiver<AttachState> {
        self.inner.attach_state.subscribe()
    }

    /// Snapshot of the event counters.
    pub fn stats(&self) -> SyncStats {
        SyncStats {
            handled: self.inner.handled.load(Ordering::Acquire),
            mirrored: self.inner.mirrored.load(Ordering::Acquire),
            suppressed: self.inner.suppressed.load(Ordering::Acquire),
            deferred: self.inner.deferred.load(Ordering::Acquire),
        }
    }

    /// Options this synchronizer was created with.
    pub fn options(&self) -> SyncOptions {
        self.inner.options
    }
}

impl Drop for ScrollSynchronizer {
    fn drop(&mut self) {
        self.inner.detach();
    }
}

impl SyncInner {
    fn publish(&self, next: AttachState) {
        self.attach_state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    fn detach(&self) {
        let (bound, timers) = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.pending.clear();
            let bound = std::mem::take(&mut state.bound);
            let mut timers: Vec<TimerId> = bound
                .iter()
                .flat_map(|pair| pair.trailing_timer.into_iter().chain(pair.deferred_frame))
                .collect();
            timers.extend(state.retry_timer.take());
            timers.extend(state.release_frame.take());
            state.echo = None;
            (bound, timers)
        };

        for id in timers {
            self.host.clear(id);
        }
        for pair in &bound {
            pair.source.remove_scroll_listener(pair.listener);
        }
        self.guard.store(false, Ordering::Release);

        if !bound.is_empty() {
            tracing::debug!(pairs = bound.len(), "scroll sync detached");
        }
        self.publish(AttachState::Detached);
    }

    fn try_attach(self: &Arc<Self>, generation: u64, attempt: u32) {
        let pairs = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            state.retry_timer = None;
            state.pending.clone()
        };

        let depth = self.options.search_depth;
        let resolved: Option<Vec<(Arc<dyn ScrollElement>, Arc<dyn ScrollElement>)>> = pairs
            .iter()
            .map(|pair| {
                let source = resolve_scroll_owner(pair.source.as_ref(), depth)?;
                let target = resolve_scroll_owner(pair.target.as_ref(), depth)?;
                Some((source, target))
            })
            .collect();

        match resolved {
            Some(owners) => self.bind(generation, attempt, owners),
            None if self.options.retry.allows(attempt + 1) => {
                let next = attempt + 1;
                tracing::trace!(attempt = next, "scroll containers unresolved, retrying");
                self.publish(AttachState::Resolving { attempt: next });

                let weak = Arc::downgrade(self);
                let id = self.host.set_timeout(
                    self.options.retry.interval,
                    Box::new(move || {
                        if let Some(inner) = weak.upgrade() {
                            inner.try_attach(generation, next);
                        }
                    }),
                );

                let mut state = self.state.lock();
                if state.generation == generation {
                    state.retry_timer = Some(id);
                } else {
                    drop(state);
                    self.host.clear(id);
                }
            }
            None => {
                tracing::warn!(
                    attempts = attempt,
                    "scroll containers never resolved, panes stay unsynchronized"
                );
                self.state.lock().pending.clear();
                self.publish(AttachState::GaveUp { attempts: attempt });
            }
        }
    }

    fn bind(
        self: &Arc<Self>,
        generation: u64,
        attempts: u32,
        owners: Vec<(Arc<dyn ScrollElement>, Arc<dyn ScrollElement>)>,
    ) {
        let bound: Vec<BoundPair> = owners
            .into_iter()
            .enumerate()
            .map(|(index, (source, target))| {
                let weak: Weak<SyncInner> = Arc::downgrade(self);
                let listener = source.add_scroll_listener(Arc::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_scroll(generation, index);
                    }
                }));
                BoundPair {
                    source,
                    target,
                    listener,
                    throttle: Throttle::new(self.options.throttle),
                    trailing_timer: None,
                    deferred_frame: None,
                }
            })
            .collect();

        let mut state = self.state.lock();
        if state.generation != generation {
            drop(state);
            for pair in &bound {
                pair.source.remove_scroll_listener(pair.listener);
            }
            return;
        }
        let count = bound.len();
        state.bound = bound;
        state.pending.clear();
        drop(state);

        tracing::info!(pairs = count, retries = attempts, "scroll sync attached");
        self.publish(AttachState::Attached { attempts });
    }

    fn on_scroll(self: &Arc<Self>, generation: u64, index: usize) {
        let now = self.host.now();
        let decision = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            let SyncState { bound, echo, .. } = &mut *state;
            let Some(pair) = bound.get_mut(index) else { return };
            let metrics = ScrollMetrics::of(pair.source.as_ref());
            if self.guard.load(Ordering::Acquire) && pair.is_echo(echo.as_ref(), &metrics) {
                None
            } else {
                Some(pair.throttle.offer(now, metrics))
            }
        };
        let Some(decision) = decision else {
            self.suppressed.fetch_add(1, Ordering::AcqRel);
            tracing::trace!(pair = index, "mirrored write echo suppressed");
            return;
        };
        self.handled.fetch_add(1, Ordering::AcqRel);

        match decision {
            ThrottleDecision::Fire(metrics) => self.mirror(generation, index, metrics),
            ThrottleDecision::Schedule(delay) => {
                let weak = Arc::downgrade(self);
                let id = self.host.set_timeout(
                    delay,
                    Box::new(move || {
                        if let Some(inner) = weak.upgrade() {
                            inner.flush_trailing(generation, index);
                        }
                    }),
                );

                let mut state = self.state.lock();
                if state.generation == generation {
                    if let Some(pair) = state.bound.get_mut(index) {
                        pair.trailing_timer = Some(id);
                    }
                } else {
                    drop(state);
                    self.host.clear(id);
                }
            }
            ThrottleDecision::Coalesced => {}
        }
    }

    fn flush_trailing(self: &Arc<Self>, generation: u64, index: usize) {
        let now = self.host.now();
        let metrics = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            let Some(pair) = state.bound.get_mut(index) else { return };
            pair.trailing_timer = None;
            pair.throttle.take_trailing(now)
        };

        if let Some(metrics) = metrics {
            self.mirror(generation, index, metrics);
        }
    }

    fn mirror(self: &Arc<Self>, generation: u64, index: usize, source: ScrollMetrics) {
        let target = {
            let state = self.state.lock();
            if state.generation != generation {
                return;
            }
            match state.bound.get(index) {
                Some(pair) => pair.target.clone(),
                None => return,
            }
        };

        if self.guard.swap(true, Ordering::AcqRel) {
            self.defer(generation, index);
            return;
        }

        let offset = ScrollMetrics::of(target.as_ref()).offset_for_ratio(source.ratio());
        self.state.lock().echo = Some((target.clone(), offset));
        target.set_scroll_top(offset);
        self.mirrored.fetch_add(1, Ordering::AcqRel);

        let weak = Arc::downgrade(self);
        let id = self.host.request_frame(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.release_guard();
            }
        }));
        self.state.lock().release_frame = Some(id);
    }

    /// Retry pair `index` on the next frame. At most one retry is armed per
    /// pair; it reads the source position when it runs.
    fn defer(self: &Arc<Self>, generation: u64, index: usize) {
        {
            let state = self.state.lock();
            if state.generation != generation {
                return;
            }
            match state.bound.get(index) {
                Some(pair) if pair.deferred_frame.is_none() => {}
                _ => return,
            }
        }
        self.deferred.fetch_add(1, Ordering::AcqRel);
        tracing::trace!(pair = index, "mirror deferred to next frame");

        let weak = Arc::downgrade(self);
        let id = self.host.request_frame(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.flush_deferred(generation, index);
            }
        }));

        let mut state = self.state.lock();
        if state.generation == generation {
            if let Some(pair) = state.bound.get_mut(index) {
                pair.deferred_frame = Some(id);
            }
        } else {
            drop(state);
            self.host.clear(id);
        }
    }

    fn flush_deferred(self: &Arc<Self>, generation: u64, index: usize) {
        let metrics = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            let Some(pair) = state.bound.get_mut(index) else { return };
            pair.deferred_frame = None;
            ScrollMetrics::of(pair.source.as_ref())
        };
        self.mirror(generation, index, metrics);
    }

    fn release_guard(&self) {
        {
            let mut state = self.state.lock();
            state.release_frame = None;
            state.echo = None;
        }
        self.guard.store(false, Ordering::Release);
    }
}
