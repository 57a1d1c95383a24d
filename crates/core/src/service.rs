//! Preview service
//!
//! Explicitly constructed entry point that owns the preview cache and hands
//! out viewers, synchronizers and comparison views sharing one decoder, one
//! host loop and one configuration.

use crate::compare::{ComparisonView, Pane};
use crate::config::ViewerConfig;
use crate::error::{ViewerError, ViewerResult};
use crate::sync::ScrollSynchronizer;
use crate::viewer::Viewer;
use pdf_compare_cache::{BlobHandle, CacheStats, PreviewCache, PreviewKey, PreviewVariant, ResultTransport};
use pdf_compare_render::{DocumentDecoder, DocumentSource, PageContainer};
use pdf_compare_scheduler::HostLoop;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;

struct ServiceInner {
    cache: PreviewCache,
    decoder: Arc<dyn DocumentDecoder>,
    host: Arc<dyn HostLoop>,
    config: ViewerConfig,
    runtime: Handle,
    closed: AtomicBool,
}

/// Shared handle to the preview pipeline. Clones refer to the same service.
#[derive(Clone)]
pub struct PreviewService {
    inner: Arc<ServiceInner>,
}

impl PreviewService {
    /// Create a service bound to the current tokio runtime.
    pub fn new(
        transport: Arc<dyn ResultTransport>,
        decoder: Arc<dyn DocumentDecoder>,
        host: Arc<dyn HostLoop>,
        config: ViewerConfig,
    ) -> ViewerResult<Self> {
        let runtime = Handle::try_current().map_err(|_| ViewerError::NoRuntime)?;
        tracing::debug!(
            concurrency = config.render_concurrency,
            throttle_ms = config.scroll_throttle.as_millis() as u64,
            "preview service started"
        );
        Ok(Self {
            inner: Arc::new(ServiceInner {
                cache: PreviewCache::new(transport),
                decoder,
                host,
                config,
                runtime,
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Configuration shared by every viewer and synchronizer.
    pub fn config(&self) -> &ViewerConfig {
        &self.inner.config
    }

    fn ensure_open(&self) -> ViewerResult<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            Err(ViewerError::Closed)
        } else {
            Ok(())
        }
    }

    /// Handle for the task's `variant` output, fetched at most once until
    /// released.
    pub async fn request_preview(
        &self,
        task_id: &str,
        variant: PreviewVariant,
    ) -> ViewerResult<BlobHandle> {
        self.ensure_open()?;
        let handle = self.inner.cache.acquire(&PreviewKey::new(task_id, variant)).await?;
        Ok(handle)
    }

    /// Document source reading a handle's bytes.
    pub fn source_for(handle: &BlobHandle) -> ViewerResult<DocumentSource> {
        Ok(DocumentSource::bytes(handle.url(), handle.bytes()?))
    }

    /// A new, unmounted viewer.
    pub fn viewer(&self) -> Viewer {
        Viewer::with_runtime(self.inner.decoder.clone(), &self.inner.config, self.inner.runtime.clone())
    }

    /// Start rendering `source` into `container` with a new viewer.
    ///
    /// The returned viewer's [`Viewer::current_ticket`] identifies the
    /// session for [`Viewer::ready`].
    pub fn mount_viewer(
        &self,
        container: Arc<dyn PageContainer>,
        source: DocumentSource,
    ) -> ViewerResult<Viewer> {
        self.ensure_open()?;
        let viewer = self.viewer();
        viewer.mount(container, source);
        Ok(viewer)
    }

    /// Revoke cached previews matching `task_id` and `variant` (`None`
    /// matches anything). Returns the number of handles revoked.
    pub fn release_preview(&self, task_id: Option<&str>, variant: Option<PreviewVariant>) -> usize {
        let released = self.inner.cache.release_matching(task_id, variant);
        tracing::debug!(task_id, ?variant, released, "previews released");
        released
    }

    /// Snapshot of the preview cache counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    /// `true` if the preview is cached and not released.
    pub fn is_cached(&self, task_id: &str, variant: PreviewVariant) -> bool {
        self.inner.cache.contains(&PreviewKey::new(task_id, variant))
    }

    /// A detached synchronizer on the service's host loop.
    pub fn synchronizer(&self) -> ScrollSynchronizer {
        ScrollSynchronizer::new(self.inner.host.clone(), self.inner.config.sync_options())
    }

    /// A dual-pane comparison view over `left` and `right`.
    pub fn comparison(&self, left: Pane, right: Pane) -> ComparisonView {
        ComparisonView::new(self.clone(), left, right)
    }

    /// Release every cached preview and refuse further requests.
    pub fn shutdown(&self) -> usize {
        self.inner.closed.store(true, Ordering::Release);
        let released = self.inner.cache.release(None);
        tracing::info!(released, "preview service shut down");
        released
    }

    /// `true` after [`PreviewService::shutdown`].
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}
