//! In-memory decoder, container, scroll and transport doubles for tests.

use crate::scroll::{ListenerId, ScrollElement, ScrollListener, ScrollPane};
use async_trait::async_trait;
use parking_lot::Mutex;
use pdf_compare_cache::{PreviewVariant, ResultTransport, TransportError};
use pdf_compare_render::{
    DecodedDocument, DecodedPage, DocumentDecoder, DocumentSource, PageContainer, PageViewport,
    RenderError, RenderTask, RenderedBitmap, SurfaceDescriptor,
};
use pdf_compare_scheduler::CancelHandle;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

const DEFAULT_PAGE_DELAY: Duration = Duration::from_millis(10);

/// Route logs to the test harness, filtered by `RUST_LOG`. Safe to call
/// from every test.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// Shape of one fake document.
#[derive(Debug, Clone)]
pub struct FakeDocument {
    pages: u32,
    open_delay: Duration,
    page_delays: Vec<Duration>,
    failing_pages: Vec<u32>,
    fail_open: bool,
}

impl FakeDocument {
    pub fn new(pages: u32) -> Self {
        Self {
            pages,
            open_delay: Duration::ZERO,
            page_delays: Vec::new(),
            failing_pages: Vec::new(),
            fail_open: false,
        }
    }

    pub fn open_delay(mut self, ms: u64) -> Self {
        self.open_delay = Duration::from_millis(ms);
        self
    }

    /// Render time per page, in page order. Missing entries use 10ms.
    pub fn page_delays(mut self, ms: &[u64]) -> Self {
        self.page_delays = ms.iter().map(|&v| Duration::from_millis(v)).collect();
        self
    }

    pub fn failing_page(mut self, page: u32) -> Self {
        self.failing_pages.push(page);
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    fn delay_for(&self, page: u32) -> Duration {
        self.page_delays
            .get(page.saturating_sub(1) as usize)
            .copied()
            .unwrap_or(DEFAULT_PAGE_DELAY)
    }
}

#[derive(Default)]
struct DecoderLog {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    cancelled: AtomicUsize,
    renders: Mutex<Vec<(String, SurfaceDescriptor)>>,
    destroyed: Mutex<HashMap<String, usize>>,
    opened: Mutex<Vec<String>>,
}

/// Decoder over a fixed set of fake documents.
///
/// Documents are looked up by URL, or by the UTF-8 content of byte sources.
/// Every page is 600x800 at scale 1; a rendered bitmap carries the
/// document's key as its pixel data so paints can be traced to a source.
#[derive(Default)]
pub struct FakeDecoder {
    documents: HashMap<String, FakeDocument>,
    log: Arc<DecoderLog>,
}

impl FakeDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, key: &str, document: FakeDocument) -> Self {
        self.documents.insert(key.to_string(), document);
        self
    }

    /// Pages passed to `render`, in call order.
    pub fn render_calls(&self, key: &str) -> Vec<u32> {
        self.surfaces(key).iter().map(|surface| surface.page).collect()
    }

    pub fn surfaces(&self, key: &str) -> Vec<SurfaceDescriptor> {
        self.log
            .renders
            .lock()
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, surface)| surface.clone())
            .collect()
    }

    pub fn destroyed(&self, key: &str) -> usize {
        self.log.destroyed.lock().get(key).copied().unwrap_or(0)
    }

    pub fn opened(&self) -> Vec<String> {
        self.log.opened.lock().clone()
    }

    pub fn in_flight(&self) -> usize {
        self.log.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.log.peak.load(Ordering::SeqCst)
    }

    /// Renders that observed a cancel request.
    pub fn cancelled(&self) -> usize {
        self.log.cancelled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentDecoder for FakeDecoder {
    async fn open(&self, source: &DocumentSource) -> Result<Arc<dyn DecodedDocument>, RenderError> {
        let key = match source {
            DocumentSource::Bytes { data, .. } => String::from_utf8_lossy(data).into_owned(),
            DocumentSource::Url(url) => url.clone(),
        };
        self.log.opened.lock().push(key.clone());

        let shape = self
            .documents
            .get(&key)
            .cloned()
            .ok_or_else(|| RenderError::Open(format!("unknown document {}", key)))?;
        if !shape.open_delay.is_zero() {
            tokio::time::sleep(shape.open_delay).await;
        }
        if shape.fail_open {
            return Err(RenderError::Open(format!("{} is not a PDF", key)));
        }

        Ok(Arc::new(FakeOpenDocument {
            key,
            shape,
            log: self.log.clone(),
            destroyed: AtomicBool::new(false),
        }))
    }
}

struct FakeOpenDocument {
    key: String,
    shape: FakeDocument,
    log: Arc<DecoderLog>,
    destroyed: AtomicBool,
}

#[async_trait]
impl DecodedDocument for FakeOpenDocument {
    fn page_count(&self) -> u32 {
        self.shape.pages
    }

    async fn page(&self, index: u32) -> Result<Arc<dyn DecodedPage>, RenderError> {
        if index == 0 || index > self.shape.pages {
            return Err(RenderError::PageOutOfRange(index));
        }
        Ok(Arc::new(FakePage {
            key: self.key.clone(),
            index,
            delay: self.shape.delay_for(index),
            fails: self.shape.failing_pages.contains(&index),
            log: self.log.clone(),
        }))
    }

    fn destroy(&self) {
        if !self.destroyed.swap(true, Ordering::SeqCst) {
            *self.log.destroyed.lock().entry(self.key.clone()).or_default() += 1;
        }
    }
}

struct FakePage {
    key: String,
    index: u32,
    delay: Duration,
    fails: bool,
    log: Arc<DecoderLog>,
}

impl DecodedPage for FakePage {
    fn index(&self) -> u32 {
        self.index
    }

    fn viewport(&self, scale: f32) -> PageViewport {
        PageViewport::new(600.0, 800.0, 1.0).rescaled(scale)
    }

    fn render(&self, target: &SurfaceDescriptor) -> RenderTask {
        self.log.renders.lock().push((self.key.clone(), target.clone()));

        let notify = Arc::new(Notify::new());
        let waker = notify.clone();
        let cancel = CancelHandle::new(move || waker.notify_one());

        let log = self.log.clone();
        let delay = self.delay;
        let fails = self.fails;
        let page = self.index;
        let key = self.key.clone();
        let surface = target.clone();

        let completion = async move {
            let now = log.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            log.peak.fetch_max(now, Ordering::SeqCst);

            let outcome = tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    if fails {
                        Err(RenderError::Page { page, message: "corrupt content stream".into() })
                    } else {
                        Ok(RenderedBitmap::new(surface.pixel_width, surface.pixel_height, key.into_bytes()))
                    }
                }
                _ = notify.notified() => {
                    log.cancelled.fetch_add(1, Ordering::SeqCst);
                    Err(RenderError::Cancelled)
                }
            };

            log.in_flight.fetch_sub(1, Ordering::SeqCst);
            outcome
        };

        RenderTask::new(Box::pin(completion), cancel)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContainerOp {
    Clear,
    Slot(u32),
    Paint { page: u32, source: String },
    Error(String),
}

/// Records every call made on it.
pub struct FakeContainer {
    width: f32,
    dpr: f32,
    ops: Mutex<Vec<ContainerOp>>,
}

impl FakeContainer {
    pub fn new() -> Self {
        Self { width: 720.0, dpr: 1.0, ops: Mutex::new(Vec::new()) }
    }

    pub fn with_width(mut self, width: f32) -> Self {
        self.width = width;
        self
    }

    pub fn with_dpr(mut self, dpr: f32) -> Self {
        self.dpr = dpr;
        self
    }

    pub fn ops(&self) -> Vec<ContainerOp> {
        self.ops.lock().clone()
    }

    fn since_clear(&self) -> Vec<ContainerOp> {
        let ops = self.ops.lock();
        let start = ops.iter().rposition(|op| *op == ContainerOp::Clear).map_or(0, |i| i + 1);
        ops[start..].to_vec()
    }

    /// Slots inserted since the last clear.
    pub fn slots(&self) -> Vec<u32> {
        self.since_clear()
            .into_iter()
            .filter_map(|op| match op {
                ContainerOp::Slot(page) => Some(page),
                _ => None,
            })
            .collect()
    }

    /// Paints since the last clear, in paint order.
    pub fn painted(&self) -> Vec<(u32, String)> {
        paints(self.since_clear())
    }

    /// Every paint ever made.
    pub fn all_paints(&self) -> Vec<(u32, String)> {
        paints(self.ops())
    }

    pub fn errors(&self) -> Vec<String> {
        self.since_clear()
            .into_iter()
            .filter_map(|op| match op {
                ContainerOp::Error(message) => Some(message),
                _ => None,
            })
            .collect()
    }
}

fn paints(ops: Vec<ContainerOp>) -> Vec<(u32, String)> {
    ops.into_iter()
        .filter_map(|op| match op {
            ContainerOp::Paint { page, source } => Some((page, source)),
            _ => None,
        })
        .collect()
}

impl PageContainer for FakeContainer {
    fn available_width(&self) -> f32 {
        self.width
    }

    fn device_pixel_ratio(&self) -> f32 {
        self.dpr
    }

    fn clear(&self) {
        self.ops.lock().push(ContainerOp::Clear);
    }

    fn insert_slot(&self, page: u32) {
        self.ops.lock().push(ContainerOp::Slot(page));
    }

    fn paint(&self, surface: &SurfaceDescriptor, bitmap: RenderedBitmap) {
        let source = String::from_utf8_lossy(&bitmap.pixels).into_owned();
        self.ops.lock().push(ContainerOp::Paint { page: surface.page, source });
    }

    fn show_error(&self, message: &str) {
        self.ops.lock().push(ContainerOp::Error(message.to_string()));
    }
}

#[derive(Debug, Clone, Copy)]
struct Geometry {
    top: f32,
    height: f32,
    client: f32,
}

/// Scroll container that fires its listeners synchronously on change.
pub struct FakeScrollElement {
    name: String,
    owner: bool,
    parent: Option<Arc<dyn ScrollElement>>,
    geometry: Mutex<Geometry>,
    listeners: Mutex<Vec<(ListenerId, ScrollListener)>>,
    next_listener: AtomicU64,
    writes: AtomicUsize,
}

impl FakeScrollElement {
    /// A scroll-owning container with the given content and viewport heights.
    pub fn owner(name: &str, scroll_height: f32, client_height: f32) -> Arc<Self> {
        Arc::new(Self::build(name, true, None, scroll_height, client_height))
    }

    /// A non-scrolling element nested in `parent`.
    pub fn child(name: &str, parent: Arc<FakeScrollElement>) -> Arc<Self> {
        let parent: Arc<dyn ScrollElement> = parent;
        Arc::new(Self::build(name, false, Some(parent), 0.0, 0.0))
    }

    fn build(
        name: &str,
        owner: bool,
        parent: Option<Arc<dyn ScrollElement>>,
        height: f32,
        client: f32,
    ) -> Self {
        Self {
            name: name.to_string(),
            owner,
            parent,
            geometry: Mutex::new(Geometry { top: 0.0, height, client }),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Simulate a user scroll.
    pub fn scroll_to(&self, top: f32) {
        self.set_scroll_top(top);
    }

    /// Calls to `set_scroll_top`, user scrolls included.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl ScrollElement for FakeScrollElement {
    fn scroll_top(&self) -> f32 {
        self.geometry.lock().top
    }

    fn set_scroll_top(&self, top: f32) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let changed = {
            let mut geometry = self.geometry.lock();
            let clamped = top.clamp(0.0, (geometry.height - geometry.client).max(0.0));
            let changed = clamped != geometry.top;
            geometry.top = clamped;
            changed
        };

        if changed {
            let listeners: Vec<ScrollListener> =
                self.listeners.lock().iter().map(|(_, listener)| listener.clone()).collect();
            for listener in listeners {
                listener();
            }
        }
    }

    fn scroll_height(&self) -> f32 {
        self.geometry.lock().height
    }

    fn client_height(&self) -> f32 {
        self.geometry.lock().client
    }

    fn is_scroll_owner(&self) -> bool {
        self.owner
    }

    fn parent(&self) -> Option<Arc<dyn ScrollElement>> {
        self.parent.clone()
    }

    fn add_scroll_listener(&self, listener: ScrollListener) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        self.listeners.lock().push((id, listener));
        id
    }

    fn remove_scroll_listener(&self, id: ListenerId) {
        self.listeners.lock().retain(|(listener, _)| *listener != id);
    }
}

/// Pane whose surface can be mounted late.
pub struct FakePane {
    surface: Mutex<Option<Arc<FakeScrollElement>>>,
    wrapper: Option<Arc<FakeScrollElement>>,
    lookups: AtomicUsize,
}

impl FakePane {
    pub fn mounted(surface: Arc<FakeScrollElement>) -> Self {
        Self { surface: Mutex::new(Some(surface)), wrapper: None, lookups: AtomicUsize::new(0) }
    }

    pub fn unmounted() -> Self {
        Self { surface: Mutex::new(None), wrapper: None, lookups: AtomicUsize::new(0) }
    }

    pub fn with_wrapper(mut self, wrapper: Arc<FakeScrollElement>) -> Self {
        self.wrapper = Some(wrapper);
        self
    }

    pub fn mount(&self, surface: Arc<FakeScrollElement>) {
        *self.surface.lock() = Some(surface);
    }

    /// Number of surface lookups so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl ScrollPane for FakePane {
    fn surface(&self) -> Option<Arc<dyn ScrollElement>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.surface.lock().clone().map(|surface| surface as Arc<dyn ScrollElement>)
    }

    fn content_wrapper(&self) -> Option<Arc<dyn ScrollElement>> {
        self.wrapper.clone().map(|wrapper| wrapper as Arc<dyn ScrollElement>)
    }
}

/// Transport answering `"<task>:<variant>"` after 20ms, counting calls.
#[derive(Default)]
pub struct FakeTransport {
    calls: AtomicUsize,
    missing: Mutex<HashSet<String>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer NotFound for every variant of `task_id`.
    pub fn with_missing(self, task_id: &str) -> Self {
        self.missing.lock().insert(task_id.to_string());
        self
    }

    /// Answer NotFound for one variant of `task_id` only.
    pub fn with_missing_variant(self, task_id: &str, variant: PreviewVariant) -> Self {
        self.missing.lock().insert(format!("{}:{}", task_id, variant));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResultTransport for FakeTransport {
    async fn fetch_result_bytes(
        &self,
        task_id: &str,
        variant: PreviewVariant,
    ) -> Result<Vec<u8>, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let missing = {
            let missing = self.missing.lock();
            missing.contains(task_id) || missing.contains(&format!("{}:{}", task_id, variant))
        };
        if missing {
            return Err(TransportError::NotFound(task_id.to_string()));
        }
        Ok(format!("{}:{}", task_id, variant).into_bytes())
    }
}
