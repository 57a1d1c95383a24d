//! Cancel handles for in-flight render operations
//!
//! A decoder hands back a cancel callback with every render it starts. The
//! registry tracks at most one such handle per key (one per page slot) so a
//! superseded session can ask all of its in-flight renders to stop without
//! waiting for them.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Advisory cancel request for one in-flight operation.
///
/// Cloning shares the same underlying callback; the callback runs at most
/// once no matter how many clones call `cancel()`.
///
/// # Example
///
/// ```
/// use pdf_compare_scheduler::CancelHandle;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let calls = Arc::new(AtomicUsize::new(0));
/// let counter = calls.clone();
/// let handle = CancelHandle::new(move || {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
///
/// handle.cancel();
/// handle.clone().cancel();
/// assert_eq!(calls.load(Ordering::SeqCst), 1);
/// ```
#[derive(Clone)]
pub struct CancelHandle {
    callback: Arc<dyn Fn() + Send + Sync>,
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Create a handle that runs `callback` on the first cancel.
    pub fn new(callback: impl Fn() + Send + Sync + 'static) -> Self {
        Self { callback: Arc::new(callback), cancelled: Arc::new(AtomicBool::new(false)) }
    }

    /// A handle whose operation cannot be interrupted.
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            (self.callback)();
        }
    }

    /// `true` once cancel was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle").field("cancelled", &self.is_cancelled()).finish()
    }
}

struct RegistryState<K> {
    handles: HashMap<K, CancelHandle>,
    closed: bool,
}

/// Registry of in-flight cancel handles keyed by work unit.
///
/// Once closed, the registry cancels every tracked handle and refuses new
/// ones: anything registered afterwards is cancelled on the spot, which
/// covers renders that start after their session was torn down.
///
/// # Example
///
/// ```
/// use pdf_compare_scheduler::{CancelHandle, CancellationRegistry};
///
/// let registry = CancellationRegistry::new();
/// let handle = CancelHandle::noop();
/// registry.register(1_u32, handle.clone());
///
/// registry.close();
/// assert!(handle.is_cancelled());
///
/// let late = CancelHandle::noop();
/// assert!(!registry.register(2, late.clone()));
/// assert!(late.is_cancelled());
/// ```
pub struct CancellationRegistry<K> {
    state: Mutex<RegistryState<K>>,
}

impl<K: Eq + Hash> CancellationRegistry<K> {
    /// Create an empty, open registry.
    pub fn new() -> Self {
        Self { state: Mutex::new(RegistryState { handles: HashMap::new(), closed: false }) }
    }

    /// Track `handle` under `key`.
    ///
    /// A previous handle for the same key is cancelled and replaced. Returns
    /// `false` (and cancels `handle`) if the registry is already closed.
    pub fn register(&self, key: K, handle: CancelHandle) -> bool {
        let replaced = {
            let mut state = self.state.lock();
            if state.closed {
                None
            } else {
                Some(state.handles.insert(key, handle.clone()))
            }
        };

        match replaced {
            None => {
                handle.cancel();
                false
            }
            Some(previous) => {
                if let Some(previous) = previous {
                    previous.cancel();
                }
                true
            }
        }
    }

    /// Stop tracking `key` (its operation finished). Returns `true` if found.
    pub fn unregister(&self, key: &K) -> bool {
        self.state.lock().handles.remove(key).is_some()
    }

    /// Cancel the operation tracked under `key`. Returns `true` if found.
    pub fn cancel(&self, key: &K) -> bool {
        let handle = self.state.lock().handles.remove(key);
        match handle {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every tracked operation, leaving the registry open.
    ///
    /// Returns the number of handles cancelled.
    pub fn cancel_all(&self) -> usize {
        let handles: Vec<CancelHandle> = self.state.lock().handles.drain().map(|(_, h)| h).collect();
        for handle in &handles {
            handle.cancel();
        }
        handles.len()
    }

    /// Cancel everything and refuse further registrations.
    pub fn close(&self) -> usize {
        let handles: Vec<CancelHandle> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.handles.drain().map(|(_, h)| h).collect()
        };
        for handle in &handles {
            handle.cancel();
        }
        handles.len()
    }

    /// `true` after [`CancellationRegistry::close`].
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of registered handles.
    pub fn len(&self) -> usize {
        self.state.lock().handles.len()
    }

    /// `true` if no handle is registered.
    pub fn is_empty(&self) -> bool {
        self.state.lock().handles.is_empty()
    }
}

impl<K: Eq + Hash> Default for CancellationRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}
