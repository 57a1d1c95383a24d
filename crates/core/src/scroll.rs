//! Scrollable containers
//!
//! The synchronizer never inspects layout or styles. Each container
//! declares whether it owns a scrollbar, and a pane exposes its rendering
//! surface (which may not be mounted yet) and its inner content wrapper.

use std::sync::Arc;

/// Scroll event callback registered on a container.
pub type ScrollListener = Arc<dyn Fn() + Send + Sync>;

/// Identifies a registered scroll listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// A container that may scroll vertically.
pub trait ScrollElement: Send + Sync {
    fn scroll_top(&self) -> f32;

    /// Move the viewport. Hosts fire scroll listeners when the position
    /// actually changes, possibly before this call returns.
    fn set_scroll_top(&self, top: f32);

    fn scroll_height(&self) -> f32;

    fn client_height(&self) -> f32;

    /// `true` if this container owns a scrollbar (overflow auto or scroll).
    fn is_scroll_owner(&self) -> bool;

    fn parent(&self) -> Option<Arc<dyn ScrollElement>>;

    fn add_scroll_listener(&self, listener: ScrollListener) -> ListenerId;

    fn remove_scroll_listener(&self, id: ListenerId);
}

/// One side of a comparison view.
pub trait ScrollPane: Send + Sync {
    /// The rendering surface, or `None` while it is not mounted.
    fn surface(&self) -> Option<Arc<dyn ScrollElement>>;

    /// Inner content wrapper used when no scroll-owning ancestor is found.
    fn content_wrapper(&self) -> Option<Arc<dyn ScrollElement>>;
}

/// Snapshot of a container's vertical scroll geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_top: f32,
    pub scroll_height: f32,
    pub client_height: f32,
}

impl ScrollMetrics {
    /// Create metrics from raw values.
    pub fn new(scroll_top: f32, scroll_height: f32, client_height: f32) -> Self {
        Self { scroll_top, scroll_height, client_height }
    }

    /// Read the current metrics of `element`.
    pub fn of(element: &dyn ScrollElement) -> Self {
        Self::new(element.scroll_top(), element.scroll_height(), element.client_height())
    }

    /// Relative scroll position in `[0, 1]`.
    ///
    /// The denominator is floored at 1, so content that does not overflow
    /// reports 0 instead of dividing by zero.
    ///
    /// ```
    /// use pdf_compare_core::ScrollMetrics;
    ///
    /// let source = ScrollMetrics::new(750.0, 2000.0, 500.0);
    /// assert_eq!(source.ratio(), 0.5);
    ///
    /// let target = ScrollMetrics::new(0.0, 1000.0, 500.0);
    /// assert_eq!(target.offset_for_ratio(source.ratio()), 250.0);
    /// ```
    pub fn ratio(&self) -> f32 {
        let range = (self.scroll_height - self.client_height).max(1.0);
        let ratio = self.scroll_top / range;
        if ratio.is_finite() {
            ratio.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Scroll offset that puts this container at `ratio`.
    pub fn offset_for_ratio(&self, ratio: f32) -> f32 {
        ratio * (self.scroll_height - self.client_height).max(0.0)
    }
}

/// Find the container that actually scrolls for `pane`.
///
/// Checks the surface itself and then up to `depth` ancestors for a scroll
/// owner, falling back to the pane's content wrapper. Returns `None` while
/// the surface is not mounted.
pub fn resolve_scroll_owner(pane: &dyn ScrollPane, depth: usize) -> Option<Arc<dyn ScrollElement>> {
    let surface = pane.surface()?;

    let mut candidate = Some(surface);
    for _ in 0..=depth {
        let Some(element) = candidate else { break };
        if element.is_scroll_owner() {
            return Some(element);
        }
        candidate = element.parent();
    }

    pane.content_wrapper()
}
