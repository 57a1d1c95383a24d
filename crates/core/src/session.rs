//! One generation of rendering work for a viewer
//!
//! A session opens its source, inserts one slot per page in reading order,
//! then renders pages through the viewer's [`PageRenderPool`]. Every
//! mutation of the container happens under the viewer's commit lock and
//! only while the session's ticket is live, so a superseded session can
//! finish its awaits but never touches the visible container again.
//!
//! [`PageRenderPool`]: pdf_compare_scheduler::PageRenderPool

use crate::viewer::{SessionState, ViewerEvent, ViewerInner};
use parking_lot::Mutex;
use pdf_compare_render::{
    fit_scale, DecodedDocument, DocumentSource, PageContainer, RenderError, SurfaceDescriptor,
};
use pdf_compare_scheduler::{CancellationRegistry, Ticket};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Resources owned by one session and released on supersession or unmount.
pub(crate) struct SessionResources {
    ticket: u64,
    document: Mutex<Option<Arc<dyn DecodedDocument>>>,
    torn_down: AtomicBool,
    renders: CancellationRegistry<u32>,
}

impl SessionResources {
    pub(crate) fn new(ticket: u64) -> Self {
        Self {
            ticket,
            document: Mutex::new(None),
            torn_down: AtomicBool::new(false),
            renders: CancellationRegistry::new(),
        }
    }

    /// Take ownership of the opened document. A document that arrives after
    /// teardown is destroyed immediately and `false` is returned.
    fn adopt(&self, document: Arc<dyn DecodedDocument>) -> bool {
        let mut slot = self.document.lock();
        if self.torn_down.load(Ordering::Acquire) {
            drop(slot);
            document.destroy();
            return false;
        }
        *slot = Some(document);
        true
    }

    /// Cancel in-flight renders and destroy the document. Never blocks on
    /// the cancellations taking effect.
    pub(crate) fn teardown(&self) {
        let document = {
            let mut slot = self.document.lock();
            self.torn_down.store(true, Ordering::Release);
            slot.take()
        };

        let cancelled = self.renders.close();
        if let Some(document) = document {
            document.destroy();
        }
        tracing::debug!(ticket = self.ticket, cancelled, "render session torn down");
    }
}

pub(crate) struct RenderSession {
    viewer: Arc<ViewerInner>,
    ticket: Ticket,
    container: Arc<dyn PageContainer>,
    source: DocumentSource,
    resources: Arc<SessionResources>,
}

impl RenderSession {
    pub(crate) fn new(
        viewer: Arc<ViewerInner>,
        ticket: Ticket,
        container: Arc<dyn PageContainer>,
        source: DocumentSource,
        resources: Arc<SessionResources>,
    ) -> Self {
        Self { viewer, ticket, container, source, resources }
    }

    pub(crate) async fn run(self) {
        let document = match self.viewer.decoder.open(&self.source).await {
            Ok(document) => document,
            Err(err) => return self.open_failed(err),
        };

        if !self.resources.adopt(document.clone()) || self.ticket.is_stale() {
            tracing::debug!("superseded while opening");
            return;
        }

        let page_count = document.page_count();
        {
            let _commit = self.viewer.commit.lock();
            if self.ticket.is_stale() {
                return;
            }
            for page in 1..=page_count {
                self.container.insert_slot(page);
            }
        }
        self.viewer.publish(&self.ticket, SessionState::Rendering, page_count, None);
        tracing::debug!(page_count, "document opened");

        let painted = AtomicU32::new(0);
        let failed = AtomicU32::new(0);
        let document = document.as_ref();
        let painted_ref = &painted;
        let failed_ref = &failed;
        let session = &self;

        let report = self
            .viewer
            .pool
            .run(page_count, &self.ticket, move |page| {
                session.render_page(document, page, painted_ref, failed_ref)
            })
            .await;

        if report.abandoned || self.ticket.is_stale() {
            tracing::debug!(started = report.started, "superseded while rendering");
            return;
        }

        let painted = painted.load(Ordering::Acquire);
        let failed = failed.load(Ordering::Acquire);
        self.viewer.publish(&self.ticket, SessionState::Settled, page_count, None);
        self.viewer.emit(ViewerEvent::Ready {
            ticket: self.ticket.value(),
            page_count,
            painted,
            failed,
        });
        tracing::info!(page_count, painted, failed, "render session settled");
    }

    fn open_failed(&self, err: RenderError) {
        if err.is_cancellation() || self.ticket.is_stale() {
            tracing::debug!(error = %err, "open abandoned");
            return;
        }

        let message = err.to_string();
        {
            let _commit = self.viewer.commit.lock();
            if self.ticket.is_stale() {
                return;
            }
            self.container.show_error(&message);
        }

        tracing::error!(error = %err, "failed to open document");
        self.viewer.publish(&self.ticket, SessionState::Settled, 0, Some(err));
        self.viewer.emit(ViewerEvent::OpenFailed { ticket: self.ticket.value(), message });
    }

    async fn render_page(
        &self,
        document: &dyn DecodedDocument,
        page: u32,
        painted: &AtomicU32,
        failed: &AtomicU32,
    ) {
        if self.ticket.is_stale() {
            return;
        }

        let decoded = match document.page(page).await {
            Ok(decoded) => decoded,
            Err(err) => return self.page_failed(page, err, failed),
        };
        if self.ticket.is_stale() {
            return;
        }

        let natural = decoded.viewport(1.0);
        let scale = fit_scale(&natural, self.container.available_width(), &self.viewer.bounds);
        let surface = SurfaceDescriptor::for_viewport(
            page,
            &decoded.viewport(scale),
            self.container.device_pixel_ratio(),
        );

        let task = decoded.render(&surface);
        if !self.resources.renders.register(page, task.cancel_handle()) {
            tracing::trace!(page, "session closed before render started");
            return;
        }
        let result = task.await;
        self.resources.renders.unregister(&page);

        match result {
            Ok(bitmap) => {
                let _commit = self.viewer.commit.lock();
                if self.ticket.is_stale() {
                    tracing::trace!(page, "discarding stale render");
                    return;
                }
                self.container.paint(&surface, bitmap);
                painted.fetch_add(1, Ordering::AcqRel);
            }
            Err(err) => self.page_failed(page, err, failed),
        }
    }

    fn page_failed(&self, page: u32, err: RenderError, failed: &AtomicU32) {
        if err.is_cancellation() || self.ticket.is_stale() {
            tracing::debug!(page, error = %err, "page render abandoned");
            return;
        }

        tracing::warn!(page, error = %err, "page render failed");
        failed.fetch_add(1, Ordering::AcqRel);
        self.viewer.emit(ViewerEvent::PageFailed {
            ticket: self.ticket.value(),
            page,
            message: err.to_string(),
        });
    }
}
