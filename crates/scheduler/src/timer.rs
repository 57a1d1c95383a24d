//! Host event loop abstraction
//!
//! UI-facing components need two scheduling primitives from their host: a
//! one-shot timeout and "run on the next animation frame". `HostLoop`
//! captures exactly those. `TokioLoop` backs them with tokio timers;
//! `ManualLoop` runs on virtual time for deterministic tests.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Callback run by the host loop.
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Identifies a scheduled timeout or frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    /// Raw id value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Scheduling primitives provided by the host environment.
pub trait HostLoop: Send + Sync {
    /// Monotonic time since the loop was created.
    fn now(&self) -> Duration;

    /// Run `callback` once after `delay`.
    fn set_timeout(&self, delay: Duration, callback: TimerCallback) -> TimerId;

    /// Run `callback` on the next animation frame.
    fn request_frame(&self, callback: TimerCallback) -> TimerId;

    /// Cancel a pending timeout or frame callback. Unknown ids are ignored.
    fn clear(&self, id: TimerId);
}

/// Default animation frame interval (~60Hz).
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Host loop backed by tokio timers.
///
/// Every scheduled callback is a spawned task; `clear` aborts it.
pub struct TokioLoop {
    handle: Handle,
    origin: tokio::time::Instant,
    frame_interval: Duration,
    next_id: AtomicU64,
    tasks: Arc<Mutex<HashMap<TimerId, JoinHandle<()>>>>,
}

impl TokioLoop {
    /// Bind to the current tokio runtime.
    ///
    /// Returns `None` when called outside a runtime.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::with_handle)
    }

    /// Bind to the runtime behind `handle`.
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle,
            origin: tokio::time::Instant::now(),
            frame_interval: DEFAULT_FRAME_INTERVAL,
            next_id: AtomicU64::new(1),
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Set the delay used for frame callbacks.
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Number of callbacks scheduled but not yet run.
    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }

    fn spawn_after(&self, delay: Duration, callback: TimerCallback) -> TimerId {
        let id = TimerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let tasks = self.tasks.clone();

        // Hold the map lock across spawn so the task cannot remove its entry
        // before it has been inserted.
        let mut guard = self.tasks.lock();
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if tasks.lock().remove(&id).is_some() {
                callback();
            }
        });
        guard.insert(id, task);
        id
    }
}

impl HostLoop for TokioLoop {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn set_timeout(&self, delay: Duration, callback: TimerCallback) -> TimerId {
        self.spawn_after(delay, callback)
    }

    fn request_frame(&self, callback: TimerCallback) -> TimerId {
        self.spawn_after(self.frame_interval, callback)
    }

    fn clear(&self, id: TimerId) {
        if let Some(task) = self.tasks.lock().remove(&id) {
            task.abort();
        }
    }
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_id: u64,
    timers: BTreeMap<(Duration, TimerId), TimerCallback>,
    frames: Vec<(TimerId, TimerCallback)>,
}

impl ManualState {
    fn next_id(&mut self) -> TimerId {
        self.next_id += 1;
        TimerId(self.next_id)
    }
}

/// Host loop driven by explicit calls, for tests and headless hosts.
///
/// Time only moves on [`ManualLoop::advance`]; frame callbacks only run on
/// [`ManualLoop::run_frame`]. Callbacks run without any internal lock held,
/// so they may schedule further callbacks.
///
/// # Example
///
/// ```
/// use pdf_compare_scheduler::{HostLoop, ManualLoop};
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let host = ManualLoop::new();
/// let fired = Arc::new(AtomicBool::new(false));
/// let flag = fired.clone();
/// host.set_timeout(Duration::from_millis(200), Box::new(move || flag.store(true, Ordering::SeqCst)));
///
/// host.advance(Duration::from_millis(199));
/// assert!(!fired.load(Ordering::SeqCst));
/// host.advance(Duration::from_millis(1));
/// assert!(fired.load(Ordering::SeqCst));
/// ```
#[derive(Default)]
pub struct ManualLoop {
    state: Mutex<ManualState>,
}

impl ManualLoop {
    /// Create a loop at time zero with nothing scheduled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move virtual time forward, running every timeout that comes due in order.
    pub fn advance(&self, by: Duration) {
        let target = self.state.lock().now + by;

        loop {
            let due = {
                let mut state = self.state.lock();
                let next = state.timers.keys().next().copied();
                match next {
                    Some(key) if key.0 <= target => {
                        state.now = key.0;
                        state.timers.remove(&key)
                    }
                    _ => None,
                }
            };

            match due {
                Some(callback) => callback(),
                None => break,
            }
        }

        self.state.lock().now = target;
    }

    /// Run every frame callback requested before this call.
    ///
    /// Returns the number of callbacks run.
    pub fn run_frame(&self) -> usize {
        let frames = std::mem::take(&mut self.state.lock().frames);
        let count = frames.len();
        for (_, callback) in frames {
            callback();
        }
        count
    }

    /// Number of timeouts not yet run.
    pub fn pending_timeouts(&self) -> usize {
        self.state.lock().timers.len()
    }

    /// Number of frame callbacks waiting for the next frame.
    pub fn pending_frames(&self) -> usize {
        self.state.lock().frames.len()
    }
}

impl HostLoop for ManualLoop {
    fn now(&self) -> Duration {
        self.state.lock().now
    }

    fn set_timeout(&self, delay: Duration, callback: TimerCallback) -> TimerId {
        let mut state = self.state.lock();
        let id = state.next_id();
        let due = state.now + delay;
        state.timers.insert((due, id), callback);
        id
    }

    fn request_frame(&self, callback: TimerCallback) -> TimerId {
        let mut state = self.state.lock();
        let id = state.next_id();
        state.frames.push((id, callback));
        id
    }

    fn clear(&self, id: TimerId) {
        let mut state = self.state.lock();
        state.timers.retain(|(_, timer), _| *timer != id);
        state.frames.retain(|(frame, _)| *frame != id);
    }
}
