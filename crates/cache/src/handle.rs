//! Locally-addressable binary handles
//!
//! A handle is the in-memory stand-in for previously fetched bytes: it has
//! a stable URL-like address and can be revoked, after which its bytes are
//! gone for good.

use crate::key::PreviewKey;
use crate::CacheError;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Scheme prefix of every handle address.
pub const HANDLE_SCHEME: &str = "blob:pdf-compare/";

struct HandleInner {
    url: String,
    key: PreviewKey,
    len: usize,
    data: RwLock<Option<Arc<[u8]>>>,
}

/// Shared reference to fetched bytes with a finite lifetime.
///
/// Clones share state: revoking through the cache invalidates every clone.
#[derive(Clone)]
pub struct BlobHandle {
    inner: Arc<HandleInner>,
}

impl BlobHandle {
    pub(crate) fn new(key: PreviewKey, bytes: Vec<u8>) -> Self {
        let len = bytes.len();
        Self {
            inner: Arc::new(HandleInner {
                url: format!("{}{}", HANDLE_SCHEME, Uuid::new_v4()),
                key,
                len,
                data: RwLock::new(Some(Arc::from(bytes))),
            }),
        }
    }

    /// Locally addressable URL of this handle.
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Key the bytes were fetched for.
    pub fn key(&self) -> &PreviewKey {
        &self.inner.key
    }

    /// Size of the fetched payload, still known after revocation.
    pub fn len(&self) -> usize {
        self.inner.len
    }

    /// `true` if the fetched body was empty.
    pub fn is_empty(&self) -> bool {
        self.inner.len == 0
    }

    /// `true` once the cache has released this handle.
    pub fn is_revoked(&self) -> bool {
        self.inner.data.read().is_none()
    }

    /// The handle's bytes, or [`CacheError::Revoked`] once released.
    pub fn bytes(&self) -> Result<Arc<[u8]>, CacheError> {
        self.inner
            .data
            .read()
            .clone()
            .ok_or_else(|| CacheError::Revoked(self.inner.url.clone()))
    }

    /// `true` if both handles refer to the same fetched payload.
    pub fn same_as(&self, other: &BlobHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Drop the bytes. Returns `true` if this call did the revoking.
    pub(crate) fn revoke(&self) -> bool {
        self.inner.data.write().take().is_some()
    }
}

impl fmt::Debug for BlobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobHandle")
            .field("url", &self.inner.url)
            .field("key", &self.inner.key)
            .field("len", &self.inner.len)
            .field("revoked", &self.is_revoked())
            .finish()
    }
}
