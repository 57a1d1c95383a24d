//! Document decoder boundary
//!
//! The decoding library (bytes in, page bitmaps out) lives outside this
//! workspace. These traits are the shape it has to take: open a source into
//! a document with a page count, fetch pages by 1-based index, and start
//! cancellable renders into a sized surface.

use crate::surface::{PageViewport, SurfaceDescriptor};
use async_trait::async_trait;
use futures::future::BoxFuture;
use pdf_compare_scheduler::CancelHandle;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Errors reported by a decoder.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    /// The operation was cancelled because its session was superseded.
    #[error("render cancelled")]
    Cancelled,

    /// The source could not be opened as a document.
    #[error("failed to open document: {0}")]
    Open(String),

    /// Page index outside `1..=page_count`.
    #[error("page {0} is out of range")]
    PageOutOfRange(u32),

    /// A single page failed to rasterize.
    #[error("failed to render page {page}: {message}")]
    Page { page: u32, message: String },

    /// Any other decoder-level failure.
    #[error("decoder error: {0}")]
    Decoder(String),
}

impl RenderError {
    /// Cancellation is expected when a session is superseded and is never
    /// reported as a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, RenderError::Cancelled)
    }
}

/// Where a document's bytes come from.
#[derive(Clone)]
pub enum DocumentSource {
    /// Bytes already in memory, with a label for logs (usually a handle URL).
    Bytes { label: String, data: Arc<[u8]> },
    /// A reference the decoder resolves itself.
    Url(String),
}

impl DocumentSource {
    /// Source reading in-memory bytes, named by `label` in logs.
    pub fn bytes(label: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        DocumentSource::Bytes { label: label.into(), data: data.into() }
    }

    /// Source the decoder fetches from `url`.
    pub fn url(url: impl Into<String>) -> Self {
        DocumentSource::Url(url.into())
    }

    /// Name used for this source in logs.
    pub fn label(&self) -> &str {
        match self {
            DocumentSource::Bytes { label, .. } => label,
            DocumentSource::Url(url) => url,
        }
    }
}

impl fmt::Debug for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentSource::Bytes { label, data } => f
                .debug_struct("Bytes")
                .field("label", label)
                .field("len", &data.len())
                .finish(),
            DocumentSource::Url(url) => f.debug_tuple("Url").field(url).finish(),
        }
    }
}

/// Rasterized page output, RGBA8.
#[derive(Clone, PartialEq, Eq)]
pub struct RenderedBitmap {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RenderedBitmap {
    /// Wrap decoded pixel data.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self { width, height, pixels }
    }

    /// A transparent bitmap sized for `surface`.
    pub fn blank(surface: &SurfaceDescriptor) -> Self {
        Self::new(surface.pixel_width, surface.pixel_height, vec![0; surface.rgba_len()])
    }
}

impl fmt::Debug for RenderedBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderedBitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// An in-flight page render.
///
/// Await it for the bitmap; use [`RenderTask::cancel_handle`] to ask the
/// decoder to stop early. A cancelled render resolves to
/// [`RenderError::Cancelled`].
pub struct RenderTask {
    completion: BoxFuture<'static, Result<RenderedBitmap, RenderError>>,
    cancel: CancelHandle,
}

impl RenderTask {
    /// Pair a render future with the handle that cancels it.
    pub fn new(
        completion: BoxFuture<'static, Result<RenderedBitmap, RenderError>>,
        cancel: CancelHandle,
    ) -> Self {
        Self { completion, cancel }
    }

    /// A render that has already finished.
    pub fn ready(result: Result<RenderedBitmap, RenderError>) -> Self {
        Self::new(Box::pin(futures::future::ready(result)), CancelHandle::noop())
    }

    /// Handle that cancels this render.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Ask the decoder to stop this render.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Future for RenderTask {
    type Output = Result<RenderedBitmap, RenderError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.completion.as_mut().poll(cx)
    }
}

/// Opens sources into documents.
#[async_trait]
pub trait DocumentDecoder: Send + Sync {
    async fn open(&self, source: &DocumentSource) -> Result<Arc<dyn DecodedDocument>, RenderError>;
}

/// An open document. Owned by exactly one render session.
#[async_trait]
pub trait DecodedDocument: Send + Sync {
    fn page_count(&self) -> u32;

    /// Fetch page `index` (1-based).
    async fn page(&self, index: u32) -> Result<Arc<dyn DecodedPage>, RenderError>;

    /// Release decoder resources. Called once, when the session is torn down.
    fn destroy(&self);
}

/// One page of an open document.
pub trait DecodedPage: Send + Sync {
    /// 1-based page number.
    fn index(&self) -> u32;

    /// Page dimensions at `scale`.
    fn viewport(&self, scale: f32) -> PageViewport;

    /// Start rasterizing into `target`.
    fn render(&self, target: &SurfaceDescriptor) -> RenderTask;
}
