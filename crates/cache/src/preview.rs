//! Preview resource cache
//!
//! Maps (task, variant) to a binary handle. Entries are created on first
//! request, shared by every requester of the same key, and live until they
//! are explicitly released; nothing is evicted implicitly.
//!
//! Concurrent requests for a key whose fetch is still in flight join that
//! fetch instead of starting another one. A failed fetch is not cached and
//! its error reaches every caller that was waiting on it.

use crate::handle::BlobHandle;
use crate::key::{PreviewKey, PreviewVariant};
use crate::transport::ResultTransport;
use crate::CacheError;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

type PendingFetch = Shared<BoxFuture<'static, Result<BlobHandle, CacheError>>>;

enum Entry {
    Ready(BlobHandle),
    Pending { fetch_id: u64, fetch: PendingFetch },
}

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Requests answered from a ready entry.
    pub hits: u64,
    /// Fetches started against the transport.
    pub fetches: u64,
    /// Requests that joined a fetch already in flight.
    pub joined: u64,
    /// Fetches that failed (and were therefore not cached).
    pub failures: u64,
    /// Handles revoked by `release`.
    pub revocations: u64,
}

impl CacheStats {
    /// Share of requests served without a new fetch (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.joined + self.fetches;
        if total == 0 {
            0.0
        } else {
            (self.hits + self.joined) as f64 / total as f64
        }
    }
}

struct CacheState {
    entries: HashMap<PreviewKey, Entry>,
    next_fetch_id: u64,
    stats: CacheStats,
}

/// Reference-counted mapping from preview key to binary handle.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use pdf_compare_cache::{PreviewCache, PreviewKey, PreviewVariant, ResultTransport, TransportError};
/// use std::sync::Arc;
///
/// struct Static;
///
/// #[async_trait]
/// impl ResultTransport for Static {
///     async fn fetch_result_bytes(&self, _: &str, _: PreviewVariant) -> Result<Vec<u8>, TransportError> {
///         Ok(b"%PDF-1.7".to_vec())
///     }
/// }
///
/// # futures::executor::block_on(async {
/// let cache = PreviewCache::new(Arc::new(Static));
/// let key = PreviewKey::new("t1", PreviewVariant::Mono);
///
/// let handle = cache.acquire(&key).await.unwrap();
/// assert_eq!(&*handle.bytes().unwrap(), b"%PDF-1.7");
///
/// cache.release(None);
/// assert!(handle.is_revoked());
/// # });
/// ```
pub struct PreviewCache {
    transport: Arc<dyn ResultTransport>,
    state: Mutex<CacheState>,
}

impl PreviewCache {
    /// Create an empty cache fetching through `transport`.
    pub fn new(transport: Arc<dyn ResultTransport>) -> Self {
        Self {
            transport,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                next_fetch_id: 0,
                stats: CacheStats::default(),
            }),
        }
    }

    /// Return the handle for `key`, fetching it on first use.
    pub async fn acquire(&self, key: &PreviewKey) -> Result<BlobHandle, CacheError> {
        let (fetch_id, fetch) = {
            let mut state = self.state.lock();
            match state.entries.get(key) {
                Some(Entry::Ready(handle)) => {
                    let handle = handle.clone();
                    state.stats.hits += 1;
                    tracing::trace!(%key, "preview cache hit");
                    return Ok(handle);
                }
                Some(Entry::Pending { fetch_id, fetch }) => {
                    let joined = (*fetch_id, fetch.clone());
                    state.stats.joined += 1;
                    tracing::debug!(%key, "joining in-flight preview fetch");
                    joined
                }
                None => {
                    state.next_fetch_id += 1;
                    let fetch_id = state.next_fetch_id;
                    let fetch = Self::fetch(self.transport.clone(), key.clone()).boxed().shared();
                    state
                        .entries
                        .insert(key.clone(), Entry::Pending { fetch_id, fetch: fetch.clone() });
                    state.stats.fetches += 1;
                    tracing::debug!(%key, fetch_id, "fetching preview");
                    (fetch_id, fetch)
                }
            }
        };

        let result = fetch.await;
        self.settle(key, fetch_id, &result);
        result
    }

    async fn fetch(
        transport: Arc<dyn ResultTransport>,
        key: PreviewKey,
    ) -> Result<BlobHandle, CacheError> {
        let bytes = transport
            .fetch_result_bytes(&key.task_id, key.variant)
            .await
            .map_err(|source| CacheError::Fetch { key: key.clone(), source })?;
        Ok(BlobHandle::new(key, bytes))
    }

    /// Record the outcome of fetch `fetch_id`, unless the entry was released
    /// (or replaced) while the fetch was in flight.
    fn settle(&self, key: &PreviewKey, fetch_id: u64, result: &Result<BlobHandle, CacheError>) {
        let mut state = self.state.lock();
        let current = matches!(
            state.entries.get(key),
            Some(Entry::Pending { fetch_id: id, .. }) if *id == fetch_id
        );
        if !current {
            return;
        }

        match result {
            Ok(handle) => {
                tracing::debug!(%key, url = handle.url(), bytes = handle.len(), "preview cached");
                state.entries.insert(key.clone(), Entry::Ready(handle.clone()));
            }
            Err(err) => {
                tracing::warn!(%key, error = %err, "preview fetch failed");
                state.entries.remove(key);
                state.stats.failures += 1;
            }
        }
    }

    /// Revoke the handles for `keys`, or for every key when `None`.
    ///
    /// Fetches still in flight for a released key are forgotten: their
    /// callers still receive the result, but it is not cached. Releasing an
    /// unknown or already released key is a no-op. Returns the number of
    /// handles revoked.
    pub fn release(&self, keys: Option<&[PreviewKey]>) -> usize {
        match keys {
            Some(keys) => self.release_where(|key| keys.contains(key)),
            None => self.release_where(|_| true),
        }
    }

    /// Release every key matching the given task and/or variant; `None`
    /// matches anything.
    pub fn release_matching(&self, task_id: Option<&str>, variant: Option<PreviewVariant>) -> usize {
        self.release_where(|key| {
            task_id.map_or(true, |task| key.task_id == task)
                && variant.map_or(true, |variant| key.variant == variant)
        })
    }

    fn release_where(&self, matches: impl Fn(&PreviewKey) -> bool) -> usize {
        let removed: Vec<(PreviewKey, Entry)> = {
            let mut state = self.state.lock();
            let keys: Vec<PreviewKey> =
                state.entries.keys().filter(|key| matches(key)).cloned().collect();
            keys.into_iter()
                .filter_map(|key| state.entries.remove(&key).map(|entry| (key, entry)))
                .collect()
        };

        let mut revoked = 0;
        for (key, entry) in removed {
            match entry {
                Entry::Ready(handle) => {
                    if handle.revoke() {
                        tracing::debug!(%key, url = handle.url(), "preview released");
                        revoked += 1;
                    }
                }
                Entry::Pending { .. } => {
                    tracing::debug!(%key, "released preview while fetch in flight");
                }
            }
        }

        self.state.lock().stats.revocations += revoked as u64;
        revoked
    }

    /// `true` if a ready handle is cached for `key`.
    pub fn contains(&self, key: &PreviewKey) -> bool {
        matches!(self.state.lock().entries.get(key), Some(Entry::Ready(_)))
    }

    /// `true` if a fetch for `key` is in flight.
    pub fn is_pending(&self, key: &PreviewKey) -> bool {
        matches!(self.state.lock().entries.get(key), Some(Entry::Pending { .. }))
    }

    /// Number of keys with a ready or in-flight entry.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// `true` if no handle is cached or pending.
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        self.state.lock().stats
    }
}
