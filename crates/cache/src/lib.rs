//! Preview resource cache
//!
//! Fetches finished task outputs once per (task, variant) and hands out
//! revocable in-memory handles to them. Handles stay valid until the cache
//! is told to release them.

mod error;
mod handle;
mod key;
mod preview;
mod transport;

#[cfg(feature = "http")]
mod http;

pub use error::CacheError;
pub use handle::{BlobHandle, HANDLE_SCHEME};
pub use key::{KeyParseError, PreviewKey, PreviewVariant};
pub use preview::{CacheStats, PreviewCache};
pub use transport::{ResultTransport, TransportError};

#[cfg(feature = "http")]
pub use http::HttpResultTransport;
