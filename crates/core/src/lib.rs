//! PDF Compare Core Library
//!
//! Preview orchestration for side-by-side document comparison: viewers that
//! render one document at a time under generation tickets, proportional
//! scroll synchronization between panes, and the service that ties both to
//! the preview cache.

pub mod compare;
pub mod config;
mod error;
pub mod scroll;
mod session;
pub mod service;
pub mod sync;
pub mod viewer;

#[cfg(test)]
pub(crate) mod testing;

pub use compare::{ActiveComparison, ComparisonView, Pane};
pub use config::{ConfigError, ViewerConfig, DEFAULT_SCROLL_SEARCH_DEPTH, DEFAULT_SCROLL_THROTTLE};
pub use error::{ViewerError, ViewerResult};
pub use scroll::{resolve_scroll_owner, ListenerId, ScrollElement, ScrollListener, ScrollMetrics, ScrollPane};
pub use service::PreviewService;
pub use sync::{AttachState, ScrollSynchronizer, SyncOptions, SyncPair, SyncStats};
pub use viewer::{SessionState, SessionStatus, Viewer, ViewerEvent};

pub use pdf_compare_cache::{BlobHandle, PreviewKey, PreviewVariant};
pub use pdf_compare_render::{DocumentDecoder, DocumentSource, PageContainer};
pub use pdf_compare_scheduler::{HostLoop, ManualLoop, TokioLoop};
