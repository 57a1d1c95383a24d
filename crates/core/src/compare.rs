//! Dual-pane comparison view
//!
//! Shows two variants of one task side by side and keeps them scrolled
//! together once both have painted.

use crate::error::{ViewerError, ViewerResult};
use crate::scroll::ScrollPane;
use crate::service::PreviewService;
use crate::sync::{ScrollSynchronizer, SyncPair};
use crate::viewer::Viewer;
use parking_lot::Mutex;
use pdf_compare_cache::{BlobHandle, PreviewVariant};
use pdf_compare_render::PageContainer;
use pdf_compare_scheduler::TicketCounter;
use std::sync::Arc;

/// One side of the view: where pages are painted and what scrolls.
#[derive(Clone)]
pub struct Pane {
    pub container: Arc<dyn PageContainer>,
    pub scroll: Arc<dyn ScrollPane>,
}

impl Pane {
    /// Create a pane from its page container and scroll pane.
    pub fn new(container: Arc<dyn PageContainer>, scroll: Arc<dyn ScrollPane>) -> Self {
        Self { container, scroll }
    }
}

/// Task and variants currently shown by a comparison view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveComparison {
    pub task_id: String,
    pub left: PreviewVariant,
    pub right: PreviewVariant,
}

/// Two viewers side by side, scrolled together once both have painted.
pub struct ComparisonView {
    service: PreviewService,
    left: Pane,
    right: Pane,
    left_viewer: Viewer,
    right_viewer: Viewer,
    sync: ScrollSynchronizer,
    generations: TicketCounter,
    active: Mutex<Option<ActiveComparison>>,
}

impl ComparisonView {
    pub(crate) fn new(service: PreviewService, left: Pane, right: Pane) -> Self {
        Self {
            left_viewer: service.viewer(),
            right_viewer: service.viewer(),
            sync: service.synchronizer(),
            service,
            left,
            right,
            generations: TicketCounter::new(),
            active: Mutex::new(None),
        }
    }

    /// Show `left` and `right` variants of `task_id`.
    ///
    /// Returns once both panes settled and scroll sync was attached, or
    /// early with `Ok(())` if another `show` or `close` took over meanwhile.
    /// A preview that cannot be fetched or opened is shown as a message in
    /// its pane and returned as the error; scroll sync stays detached. A
    /// failed fetch on either side also unmounts the other pane's viewer.
    pub async fn show(
        &self,
        task_id: &str,
        left: PreviewVariant,
        right: PreviewVariant,
    ) -> ViewerResult<()> {
        let view = self.generations.issue();
        self.sync.detach();

        let next = ActiveComparison { task_id: task_id.to_string(), left, right };
        let previous = self.active.lock().replace(next);
        if let Some(previous) = previous {
            if previous.task_id != task_id {
                self.service.release_preview(Some(previous.task_id.as_str()), None);
            }
        }

        let (left_handle, right_handle) = tokio::join!(
            self.service.request_preview(task_id, left),
            self.service.request_preview(task_id, right)
        );
        if view.is_stale() {
            tracing::debug!(task_id, "comparison superseded while fetching");
            return Ok(());
        }

        let left_ticket = mount_or_report(&self.left, &self.left_viewer, left_handle);
        let right_ticket = mount_or_report(&self.right, &self.right_viewer, right_handle);
        let (left_ticket, right_ticket) = match (left_ticket, right_ticket) {
            (Ok(left_ticket), Ok(right_ticket)) => (left_ticket, right_ticket),
            (Err(err), _) | (_, Err(err)) => {
                self.left_viewer.unmount();
                self.right_viewer.unmount();
                return Err(err);
            }
        };

        let (left_ready, right_ready) = tokio::join!(
            self.left_viewer.ready(left_ticket),
            self.right_viewer.ready(right_ticket)
        );
        if view.is_stale() {
            return Ok(());
        }
        match (left_ready, right_ready) {
            (Ok(_), Ok(_)) => {}
            (Err(err), _) | (_, Err(err)) if err.is_superseded() => return Ok(()),
            (Err(err), _) | (_, Err(err)) => return Err(err),
        }

        self.sync.attach(SyncPair::both(self.left.scroll.clone(), self.right.scroll.clone()));
        tracing::info!(task_id, %left, %right, "comparison ready");
        Ok(())
    }

    /// Detach scroll sync, unmount both viewers and release the active
    /// task's previews.
    pub fn close(&self) {
        self.generations.invalidate();
        self.sync.detach();
        self.left_viewer.unmount();
        self.right_viewer.unmount();
        if let Some(active) = self.active.lock().take() {
            self.service.release_preview(Some(active.task_id.as_str()), None);
        }
    }

    /// The comparison shown or being shown, if any.
    pub fn active(&self) -> Option<ActiveComparison> {
        self.active.lock().clone()
    }

    /// Viewer rendering the left pane.
    pub fn left_viewer(&self) -> &Viewer {
        &self.left_viewer
    }

    /// Viewer rendering the right pane.
    pub fn right_viewer(&self) -> &Viewer {
        &self.right_viewer
    }

    /// Synchronizer linking the two panes.
    pub fn synchronizer(&self) -> &ScrollSynchronizer {
        &self.sync
    }
}

fn mount_or_report(
    pane: &Pane,
    viewer: &Viewer,
    handle: ViewerResult<BlobHandle>,
) -> ViewerResult<u64> {
    match handle.and_then(|handle| PreviewService::source_for(&handle)) {
        Ok(source) => Ok(viewer.mount(pane.container.clone(), source)),
        Err(err) => {
            viewer.unmount();
            pane.container.clear();
            pane.container.show_error(&err.to_string());
            tracing::warn!(error = %err, "preview unavailable");
            Err(err)
        }
    }
}

impl Drop for ComparisonView {
    fn drop(&mut self) {
        if self.active.get_mut().is_some() {
            self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViewerConfig;
    use crate::scroll::ScrollElement;
    use crate::sync::AttachState;
    use crate::testing::{FakeContainer, FakeDecoder, FakeDocument, FakePane, FakeScrollElement, FakeTransport};
    use crate::viewer::SessionState;
    use pdf_compare_scheduler::ManualLoop;

    struct Side {
        container: Arc<FakeContainer>,
        element: Arc<FakeScrollElement>,
    }

    impl Side {
        fn new(name: &str, height: f32) -> Self {
            Self {
                container: Arc::new(FakeContainer::new()),
                element: FakeScrollElement::owner(name, height, 500.0),
            }
        }

        fn pane(&self) -> Pane {
            Pane::new(self.container.clone(), Arc::new(FakePane::mounted(self.element.clone())))
        }
    }

    fn decoder() -> FakeDecoder {
        FakeDecoder::new()
            .with_document("t1:original", FakeDocument::new(3))
            .with_document("t1:mono", FakeDocument::new(2))
            .with_document("t2:original", FakeDocument::new(1))
            .with_document("t2:mono", FakeDocument::new(1))
    }

    fn setup(transport: FakeTransport) -> (Arc<FakeTransport>, PreviewService, Side, Side) {
        let transport = Arc::new(transport);
        let service = PreviewService::new(
            transport.clone(),
            Arc::new(decoder()),
            Arc::new(ManualLoop::new()),
            ViewerConfig::default(),
        )
        .unwrap();
        (transport, service, Side::new("left", 2000.0), Side::new("right", 1000.0))
    }

    #[tokio::test(start_paused = true)]
    async fn test_show_renders_both_and_attaches_sync() {
        let (_, service, left, right) = setup(FakeTransport::new());
        let view = service.comparison(left.pane(), right.pane());

        view.show("t1", PreviewVariant::Original, PreviewVariant::Mono).await.unwrap();

        assert!(left.container.painted().iter().all(|(_, s)| s == "t1:original"));
        assert_eq!(left.container.painted().len(), 3);
        assert_eq!(right.container.painted().len(), 2);
        assert_eq!(view.synchronizer().state(), AttachState::Attached { attempts: 0 });

        left.element.scroll_to(750.0);
        assert_eq!(right.element.scroll_top(), 250.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_switching_task_releases_previous_previews() {
        let (transport, service, left, right) = setup(FakeTransport::new());
        let view = service.comparison(left.pane(), right.pane());

        view.show("t1", PreviewVariant::Original, PreviewVariant::Mono).await.unwrap();
        assert!(service.is_cached("t1", PreviewVariant::Mono));

        view.show("t2", PreviewVariant::Original, PreviewVariant::Mono).await.unwrap();
        assert!(!service.is_cached("t1", PreviewVariant::Mono));
        assert!(!service.is_cached("t1", PreviewVariant::Original));
        assert!(service.is_cached("t2", PreviewVariant::Mono));
        assert_eq!(transport.calls(), 4);
        assert!(left.container.painted().iter().all(|(_, s)| s == "t2:original"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_task_reuses_cached_previews() {
        let (transport, service, left, right) = setup(FakeTransport::new());
        let view = service.comparison(left.pane(), right.pane());

        view.show("t1", PreviewVariant::Original, PreviewVariant::Mono).await.unwrap();
        view.show("t1", PreviewVariant::Mono, PreviewVariant::Original).await.unwrap();

        assert_eq!(transport.calls(), 2);
        assert!(left.container.painted().iter().all(|(_, s)| s == "t1:mono"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_shows_message_and_skips_sync() {
        crate::testing::init_tracing();
        let (_, service, left, right) = setup(FakeTransport::new().with_missing("t9"));
        let view = service.comparison(left.pane(), right.pane());

        let err = view.show("t9", PreviewVariant::Original, PreviewVariant::Mono).await.unwrap_err();
        assert!(matches!(err, ViewerError::Cache(_)));
        assert_eq!(left.container.errors().len(), 1);
        assert_eq!(right.container.errors().len(), 1);
        assert_eq!(view.synchronizer().state(), AttachState::Detached);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_sided_fetch_failure_stops_other_pane() {
        let (_, service, left, right) =
            setup(FakeTransport::new().with_missing_variant("t1", PreviewVariant::Mono));
        let view = service.comparison(left.pane(), right.pane());

        let err = view.show("t1", PreviewVariant::Original, PreviewVariant::Mono).await.unwrap_err();
        assert!(matches!(err, ViewerError::Cache(_)));
        assert_eq!(right.container.errors().len(), 1);
        assert!(left.container.errors().is_empty());

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert!(left.container.painted().is_empty());
        assert_eq!(view.left_viewer().status().state, SessionState::Idle);
        assert_eq!(view.right_viewer().status().state, SessionState::Idle);
        assert_eq!(view.synchronizer().state(), AttachState::Detached);
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_show_wins() {
        let (_, service, left, right) = setup(FakeTransport::new());
        let view = service.comparison(left.pane(), right.pane());

        let (first, second) = tokio::join!(
            view.show("t1", PreviewVariant::Original, PreviewVariant::Mono),
            view.show("t2", PreviewVariant::Original, PreviewVariant::Mono)
        );
        assert_eq!(first, Ok(()));
        assert_eq!(second, Ok(()));

        assert_eq!(view.active().map(|a| a.task_id), Some("t2".to_string()));
        assert!(left.container.all_paints().iter().all(|(_, s)| s == "t2:original"));
        assert!(!service.is_cached("t1", PreviewVariant::Original));
        assert!(view.synchronizer().state().is_attached());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_tears_everything_down() {
        let (_, service, left, right) = setup(FakeTransport::new());
        let view = service.comparison(left.pane(), right.pane());

        view.show("t1", PreviewVariant::Original, PreviewVariant::Mono).await.unwrap();
        view.close();

        assert_eq!(view.synchronizer().state(), AttachState::Detached);
        assert_eq!(left.element.listener_count(), 0);
        assert_eq!(view.left_viewer().status().state, SessionState::Idle);
        assert_eq!(view.right_viewer().status().state, SessionState::Idle);
        assert!(!service.is_cached("t1", PreviewVariant::Original));
        assert!(view.active().is_none());
    }
}
