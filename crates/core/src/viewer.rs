//! Viewer controller
//!
//! A viewer renders at most one document into one container at a time.
//! Each [`Viewer::mount`] issues a new ticket, clears the container and
//! starts a render session for it; the previous session is torn down
//! without waiting for it. Progress is published as a [`SessionStatus`]
//! and as broadcast [`ViewerEvent`]s.

use crate::config::ViewerConfig;
use crate::error::{ViewerError, ViewerResult};
use crate::session::{RenderSession, SessionResources};
use parking_lot::Mutex;
use pdf_compare_render::{DocumentDecoder, DocumentSource, PageContainer, RenderError, ScaleBounds};
use pdf_compare_scheduler::{PageRenderPool, Ticket, TicketCounter};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tracing::Instrument;

const EVENT_CAPACITY: usize = 64;

/// Lifecycle of the current render session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing mounted.
    Idle,
    /// Waiting for the decoder to open the source.
    Opening,
    /// Slots inserted; pages are rendering.
    Rendering,
    /// Every page rendered or failed, or the open failed.
    Settled,
}

/// Snapshot of the newest session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub ticket: u64,
    pub state: SessionState,
    pub page_count: u32,
    /// Set when the open failed.
    pub error: Option<RenderError>,
}

impl SessionStatus {
    fn idle(ticket: u64) -> Self {
        Self { ticket, state: SessionState::Idle, page_count: 0, error: None }
    }
}

/// Notifications broadcast by a viewer.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    /// Initial paint of every page finished.
    Ready { ticket: u64, page_count: u32, painted: u32, failed: u32 },
    /// One page failed to render; its slot stays blank.
    PageFailed { ticket: u64, page: u32, message: String },
    /// The document could not be opened.
    OpenFailed { ticket: u64, message: String },
}

impl ViewerEvent {
    /// Ticket of the session that produced this event.
    pub fn ticket(&self) -> u64 {
        match self {
            ViewerEvent::Ready { ticket, .. }
            | ViewerEvent::PageFailed { ticket, .. }
            | ViewerEvent::OpenFailed { ticket, .. } => *ticket,
        }
    }
}

pub(crate) struct ViewerInner {
    pub(crate) decoder: Arc<dyn DocumentDecoder>,
    pub(crate) pool: PageRenderPool,
    pub(crate) bounds: ScaleBounds,
    /// Held while checking a ticket and mutating the container.
    pub(crate) commit: Mutex<()>,
    runtime: Handle,
    tickets: TicketCounter,
    current: Mutex<Option<Arc<SessionResources>>>,
    status: watch::Sender<SessionStatus>,
    events: broadcast::Sender<ViewerEvent>,
}

impl ViewerInner {
    /// Publish `state` for `ticket` unless a newer ticket has been issued.
    pub(crate) fn publish(
        &self,
        ticket: &Ticket,
        state: SessionState,
        page_count: u32,
        error: Option<RenderError>,
    ) {
        self.status.send_if_modified(|status| {
            if !ticket.is_live() || status.ticket > ticket.value() {
                return false;
            }
            *status = SessionStatus { ticket: ticket.value(), state, page_count, error };
            true
        });
    }

    pub(crate) fn emit(&self, event: ViewerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn unmount(&self) {
        let generation = {
            let _commit = self.commit.lock();
            self.tickets.invalidate()
        };
        if let Some(resources) = self.current.lock().take() {
            resources.teardown();
        }
        self.status.send_replace(SessionStatus::idle(generation));
        tracing::debug!(generation, "viewer unmounted");
    }
}

struct ViewerHandle {
    inner: Arc<ViewerInner>,
}

impl Drop for ViewerHandle {
    fn drop(&mut self) {
        self.inner.unmount();
    }
}

/// Renders documents into a page container, one source at a time.
///
/// Clones share the same controller; dropping the last clone unmounts it.
#[derive(Clone)]
pub struct Viewer {
    handle: Arc<ViewerHandle>,
}

impl Viewer {
    /// Create a viewer bound to the current tokio runtime.
    pub fn new(decoder: Arc<dyn DocumentDecoder>, config: &ViewerConfig) -> ViewerResult<Self> {
        let runtime = Handle::try_current().map_err(|_| ViewerError::NoRuntime)?;
        Ok(Self::with_runtime(decoder, config, runtime))
    }

    /// Create a viewer spawning its sessions on `runtime`.
    pub fn with_runtime(
        decoder: Arc<dyn DocumentDecoder>,
        config: &ViewerConfig,
        runtime: Handle,
    ) -> Self {
        let (status, _) = watch::channel(SessionStatus::idle(0));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            handle: Arc::new(ViewerHandle {
                inner: Arc::new(ViewerInner {
                    decoder,
                    pool: PageRenderPool::new(config.pool_config()),
                    bounds: config.scale_bounds(),
                    commit: Mutex::new(()),
                    runtime,
                    tickets: TicketCounter::new(),
                    current: Mutex::new(None),
                    status,
                    events,
                }),
            }),
        }
    }

    fn inner(&self) -> &Arc<ViewerInner> {
        &self.handle.inner
    }

    /// Start rendering `source` into `container`, superseding any session
    /// in progress. Returns the new session's ticket.
    ///
    /// The container is cleared before this returns; the rest happens on
    /// a spawned task.
    pub fn mount(&self, container: Arc<dyn PageContainer>, source: DocumentSource) -> u64 {
        let inner = self.inner();
        let ticket = {
            let _commit = inner.commit.lock();
            let ticket = inner.tickets.issue();
            container.clear();
            ticket
        };
        let value = ticket.value();

        let resources = Arc::new(SessionResources::new(value));
        let previous = inner.current.lock().replace(resources.clone());
        if let Some(previous) = previous {
            previous.teardown();
        }

        inner.publish(&ticket, SessionState::Opening, 0, None);

        let span = tracing::info_span!("render_session", ticket = value, source = %source.label());
        let session = RenderSession::new(inner.clone(), ticket, container, source, resources);
        inner.runtime.spawn(session.run().instrument(span));

        value
    }

    /// Stop rendering and release the current document.
    pub fn unmount(&self) {
        self.inner().unmount();
    }

    /// Status of the newest session.
    pub fn status(&self) -> SessionStatus {
        self.inner().status.borrow().clone()
    }

    /// Subscribe to session status changes.
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.inner().status.subscribe()
    }

    /// Subscribe to viewer events.
    pub fn subscribe(&self) -> broadcast::Receiver<ViewerEvent> {
        self.inner().events.subscribe()
    }

    /// Current generation; equals the newest ticket unless unmounted since.
    pub fn current_ticket(&self) -> u64 {
        self.inner().tickets.current()
    }

    /// Wait until session `ticket` settles.
    ///
    /// Resolves to the page count, to [`ViewerError::Open`] if the document
    /// could not be opened, or to [`ViewerError::Superseded`] once a newer
    /// source or an unmount replaced it.
    pub async fn ready(&self, ticket: u64) -> ViewerResult<u32> {
        let mut rx = self.watch_status();
        loop {
            {
                let status = rx.borrow_and_update();
                if status.ticket > ticket || self.current_ticket() > ticket {
                    return Err(ViewerError::Superseded { ticket });
                }
                if status.ticket == ticket && status.state == SessionState::Settled {
                    return match &status.error {
                        Some(err) => Err(ViewerError::Open(err.clone())),
                        None => Ok(status.page_count),
                    };
                }
            }
            rx.changed().await.map_err(|_| ViewerError::Closed)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeContainer, FakeDecoder, FakeDocument};
    use std::time::Duration;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn viewer(decoder: &Arc<FakeDecoder>, concurrency: usize) -> Viewer {
        let config = ViewerConfig::default().with_render_concurrency(concurrency);
        Viewer::new(decoder.clone(), &config).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_pages_render_once_in_order() {
        let decoder = Arc::new(FakeDecoder::new().with_document(
            "doc",
            FakeDocument::new(3).page_delays(&[30, 10, 20]),
        ));
        let viewer = viewer(&decoder, 2);
        let container = Arc::new(FakeContainer::new());
        let mut events = viewer.subscribe();

        let ticket = viewer.mount(container.clone(), DocumentSource::url("doc"));
        assert_eq!(viewer.ready(ticket).await, Ok(3));

        assert_eq!(container.slots(), vec![1, 2, 3]);
        let mut pages: Vec<u32> = container.painted().into_iter().map(|(page, _)| page).collect();
        // Page 2 finishes first.
        assert_eq!(pages[0], 2);
        pages.sort_unstable();
        assert_eq!(pages, vec![1, 2, 3]);
        assert_eq!(decoder.render_calls("doc"), vec![1, 2, 3]);
        assert!(decoder.peak_in_flight() <= 2);

        assert_eq!(
            events.recv().await.unwrap(),
            ViewerEvent::Ready { ticket, page_count: 3, painted: 3, failed: 0 }
        );
        assert_eq!(viewer.status().state, SessionState::Settled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_bound_holds_for_long_documents() {
        let decoder = Arc::new(FakeDecoder::new().with_document(
            "long",
            FakeDocument::new(12).page_delays(&[5, 40, 15, 25, 10, 30, 5, 5, 20, 35, 10, 15]),
        ));
        let viewer = viewer(&decoder, 2);
        let container = Arc::new(FakeContainer::new());

        let ticket = viewer.mount(container.clone(), DocumentSource::url("long"));
        assert_eq!(viewer.ready(ticket).await, Ok(12));

        assert_eq!(decoder.peak_in_flight(), 2);
        let mut calls = decoder.render_calls("long");
        calls.sort_unstable();
        assert_eq!(calls, (1..=12).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_source_changes_only_last_paints() {
        let decoder = Arc::new(
            FakeDecoder::new()
                .with_document("a", FakeDocument::new(3).open_delay(50))
                .with_document("b", FakeDocument::new(3).open_delay(30))
                .with_document("c", FakeDocument::new(2).open_delay(10)),
        );
        let viewer = viewer(&decoder, 2);
        let container = Arc::new(FakeContainer::new());

        let a = viewer.mount(container.clone(), DocumentSource::url("a"));
        tokio::time::sleep(ms(5)).await;
        let b = viewer.mount(container.clone(), DocumentSource::url("b"));
        tokio::time::sleep(ms(5)).await;
        let c = viewer.mount(container.clone(), DocumentSource::url("c"));

        assert_eq!(viewer.ready(c).await, Ok(2));
        assert_eq!(viewer.ready(a).await, Err(ViewerError::Superseded { ticket: a }));
        assert_eq!(viewer.ready(b).await, Err(ViewerError::Superseded { ticket: b }));

        // Let the superseded opens finish.
        tokio::time::sleep(ms(200)).await;

        assert!(container.all_paints().iter().all(|(_, source)| source == "c"));
        assert_eq!(container.slots(), vec![1, 2]);
        assert_eq!(decoder.destroyed("a"), 1);
        assert_eq!(decoder.destroyed("b"), 1);
        assert_eq!(decoder.destroyed("c"), 0);
        assert!(decoder.render_calls("a").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_supersede_mid_render_cancels_and_discards() {
        let decoder = Arc::new(
            FakeDecoder::new()
                .with_document("slow", FakeDocument::new(4).page_delays(&[100, 100, 100, 100]))
                .with_document("fast", FakeDocument::new(1)),
        );
        let viewer = viewer(&decoder, 2);
        let container = Arc::new(FakeContainer::new());

        let slow = viewer.mount(container.clone(), DocumentSource::url("slow"));
        tokio::time::sleep(ms(50)).await;
        assert_eq!(decoder.in_flight(), 2);

        let fast = viewer.mount(container.clone(), DocumentSource::url("fast"));
        assert_eq!(viewer.ready(fast).await, Ok(1));
        tokio::time::sleep(ms(500)).await;

        assert_eq!(viewer.ready(slow).await, Err(ViewerError::Superseded { ticket: slow }));
        assert_eq!(decoder.cancelled(), 2);
        assert_eq!(decoder.render_calls("slow"), vec![1, 2]);
        assert_eq!(decoder.destroyed("slow"), 1);
        assert!(container.all_paints().iter().all(|(_, source)| source == "fast"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_failure_shows_error() {
        crate::testing::init_tracing();
        let decoder = Arc::new(FakeDecoder::new().with_document("bad", FakeDocument::new(0).failing_open()));
        let viewer = viewer(&decoder, 2);
        let container = Arc::new(FakeContainer::new());
        let mut events = viewer.subscribe();

        let ticket = viewer.mount(container.clone(), DocumentSource::url("bad"));
        let err = viewer.ready(ticket).await.unwrap_err();
        assert!(matches!(err, ViewerError::Open(RenderError::Open(_))));

        assert_eq!(container.errors().len(), 1);
        assert!(container.slots().is_empty());
        assert!(matches!(events.recv().await.unwrap(), ViewerEvent::OpenFailed { .. }));

        let status = viewer.status();
        assert_eq!(status.state, SessionState::Settled);
        assert!(status.error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_failure_leaves_slot_blank() {
        crate::testing::init_tracing();
        let decoder = Arc::new(
            FakeDecoder::new().with_document("doc", FakeDocument::new(3).failing_page(2)),
        );
        let viewer = viewer(&decoder, 2);
        let container = Arc::new(FakeContainer::new());
        let mut events = viewer.subscribe();

        let ticket = viewer.mount(container.clone(), DocumentSource::url("doc"));
        assert_eq!(viewer.ready(ticket).await, Ok(3));

        let mut pages: Vec<u32> = container.painted().into_iter().map(|(page, _)| page).collect();
        pages.sort_unstable();
        assert_eq!(pages, vec![1, 3]);
        assert!(container.errors().is_empty());

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(seen.iter().any(|e| matches!(e, ViewerEvent::PageFailed { page: 2, .. })));
        assert!(seen.contains(&ViewerEvent::Ready { ticket, page_count: 3, painted: 2, failed: 1 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_supersedes_and_destroys() {
        let decoder = Arc::new(
            FakeDecoder::new().with_document("doc", FakeDocument::new(2).page_delays(&[100, 100])),
        );
        let viewer = viewer(&decoder, 2);
        let container = Arc::new(FakeContainer::new());

        let ticket = viewer.mount(container.clone(), DocumentSource::url("doc"));
        tokio::time::sleep(ms(50)).await;
        viewer.unmount();

        assert_eq!(viewer.ready(ticket).await, Err(ViewerError::Superseded { ticket }));
        assert_eq!(viewer.status().state, SessionState::Idle);
        assert_eq!(decoder.destroyed("doc"), 1);

        tokio::time::sleep(ms(200)).await;
        assert!(container.painted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_viewer_tears_down() {
        let decoder = Arc::new(FakeDecoder::new().with_document("doc", FakeDocument::new(1)));
        let container = Arc::new(FakeContainer::new());
        {
            let viewer = viewer(&decoder, 2);
            let clone = viewer.clone();
            let ticket = viewer.mount(container.clone(), DocumentSource::url("doc"));
            assert_eq!(clone.ready(ticket).await, Ok(1));
            drop(viewer);
            assert_eq!(decoder.destroyed("doc"), 0);
        }
        assert_eq!(decoder.destroyed("doc"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_surface_sized_to_container_and_dpr() {
        let decoder = Arc::new(FakeDecoder::new().with_document("doc", FakeDocument::new(1)));
        let viewer = viewer(&decoder, 2);
        let container = Arc::new(FakeContainer::new().with_width(720.0).with_dpr(2.0));

        let ticket = viewer.mount(container.clone(), DocumentSource::url("doc"));
        viewer.ready(ticket).await.unwrap();

        // 600x800 page at 1.2x, doubled for the device pixel ratio.
        let surfaces = decoder.surfaces("doc");
        assert_eq!(surfaces.len(), 1);
        assert_eq!((surfaces[0].pixel_width, surfaces[0].pixel_height), (1440, 1920));
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        let decoder = Arc::new(FakeDecoder::new());
        assert!(matches!(
            Viewer::new(decoder, &ViewerConfig::default()),
            Err(ViewerError::NoRuntime)
        ));
    }
}
