//! Bounded page render pool.
//!
//! A fixed number of cooperative workers pull page indices from a shared
//! counter and render them one at a time. Rendering is CPU/GPU bound per
//! page, so the pool keeps a small number in flight instead of starting
//! every page at once or walking them strictly one after another.
//!
//! Workers run on the caller's task (they are joined, not spawned) and check
//! the session ticket before pulling a page and again after each render.

use crate::Ticket;
use futures::future::join_all;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};

/// Default number of concurrent page renders per session.
pub const DEFAULT_RENDER_CONCURRENCY: usize = 2;

/// Configuration for the page render pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of workers, i.e. the maximum number of pages in flight.
    /// Default: 2.
    pub concurrency: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { concurrency: DEFAULT_RENDER_CONCURRENCY }
    }
}

impl PoolConfig {
    /// Create a configuration; a concurrency of zero is raised to one.
    pub fn new(concurrency: usize) -> Self {
        Self { concurrency: concurrency.max(1) }
    }
}

/// What a pool run did before it returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolReport {
    /// Pages handed to the render callback.
    pub started: u32,
    /// Pages whose render callback returned.
    pub finished: u32,
    /// The ticket went stale before the run completed.
    pub abandoned: bool,
}

/// Runs per-page render work with bounded concurrency.
///
/// # Example
///
/// ```
/// use pdf_compare_scheduler::{PageRenderPool, PoolConfig, TicketCounter};
///
/// # futures::executor::block_on(async {
/// let counter = TicketCounter::new();
/// let ticket = counter.issue();
/// let pool = PageRenderPool::new(PoolConfig::new(2));
///
/// let report = pool.run(3, &ticket, |page| async move {
///     println!("rendering page {}", page);
/// }).await;
///
/// assert_eq!(report.started, 3);
/// assert!(!report.abandoned);
/// # });
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct PageRenderPool {
    config: PoolConfig,
}

impl PageRenderPool {
    /// Create a pool with the given settings.
    pub fn new(config: PoolConfig) -> Self {
        Self { config: PoolConfig::new(config.concurrency) }
    }

    /// Maximum number of pages rendered at once.
    pub fn concurrency(&self) -> usize {
        self.config.concurrency
    }

    /// Render pages `1..=page_count`, at most `concurrency` at a time.
    ///
    /// Each page index is handed out exactly once. A worker stops pulling
    /// work as soon as it observes `ticket` is stale, either before taking
    /// the next page or after its current page's render returns.
    pub async fn run<F, Fut>(&self, page_count: u32, ticket: &Ticket, render: F) -> PoolReport
    where
        F: Fn(u32) -> Fut,
        Fut: Future<Output = ()>,
    {
        let next_page = AtomicU32::new(1);
        let started = AtomicU32::new(0);
        let finished = AtomicU32::new(0);

        let workers = self.config.concurrency.min(page_count as usize);
        let render = &render;
        let next_page = &next_page;
        let started = &started;
        let finished = &finished;

        join_all((0..workers).map(|worker| async move {
            loop {
                if ticket.is_stale() {
                    tracing::trace!(worker, ticket = ticket.value(), "worker stopping, ticket superseded");
                    break;
                }

                let page = next_page.fetch_add(1, Ordering::AcqRel);
                if page > page_count {
                    break;
                }

                started.fetch_add(1, Ordering::AcqRel);
                render(page).await;
                finished.fetch_add(1, Ordering::AcqRel);

                if ticket.is_stale() {
                    tracing::trace!(worker, page, "ticket superseded after render");
                    break;
                }
            }
        }))
        .await;

        PoolReport {
            started: started.load(Ordering::Acquire),
            finished: finished.load(Ordering::Acquire),
            abandoned: ticket.is_stale(),
        }
    }
}
