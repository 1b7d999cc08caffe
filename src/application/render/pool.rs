//! Bounded leasing of single-use pages.
//!
//! A counting semaphore caps the number of open pages. Waiters queue in FIFO
//! order and give up after the configured acquire timeout. Every lease closes
//! its page exactly once: explicitly through [`PageLease::release`], or from a
//! spawned task when the lease is dropped early (panic or cancelled request).

use std::{sync::Arc, time::Duration};

use metrics::{counter, gauge};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, oneshot};
use tracing::{debug, warn};

use super::page::{DiagramPage, PageSource};
use super::types::{RenderError, ResourceError};

#[derive(Clone)]
pub struct PagePool {
    source: Arc<dyn PageSource>,
    permits: Arc<Semaphore>,
    acquire_timeout: Duration,
}

impl PagePool {
    pub fn new(source: Arc<dyn PageSource>, max_pages: usize, acquire_timeout: Duration) -> Self {
        Self {
            source,
            permits: Arc::new(Semaphore::new(max_pages)),
            acquire_timeout,
        }
    }

    /// Number of pages that can still be opened without waiting.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Stop handing out pages. Pending and future acquisitions fail.
    pub fn close(&self) {
        self.permits.close();
    }

    pub async fn acquire(&self) -> Result<PageLease, RenderError> {
        let permit = match tokio::time::timeout(
            self.acquire_timeout,
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(ResourceError::open_page("page pool is shut down").into());
            }
            Err(_) => {
                counter!("mermaid_ink_page_acquire_timeout_total").increment(1);
                warn!(
                    target = "application::render",
                    op = "pool::acquire",
                    result = "saturated",
                    waited_ms = self.acquire_timeout.as_millis() as u64,
                    "No rendering page became available"
                );
                return Err(RenderError::Saturated {
                    waited: self.acquire_timeout,
                });
            }
        };

        let (page, permit) = self.open_detached(permit).await?;
        gauge!("mermaid_ink_pages_open").increment(1.0);
        debug!(
            target = "application::render",
            stage = "page_acquired",
            available = self.permits.available_permits(),
            "Page leased"
        );

        Ok(PageLease {
            page,
            permit: Some(permit),
            released: false,
        })
    }

    /// Open a page on its own task. If the caller goes away before the page
    /// arrives, the task closes the page before giving the permit back.
    async fn open_detached(
        &self,
        permit: OwnedSemaphorePermit,
    ) -> Result<(Arc<dyn DiagramPage>, OwnedSemaphorePermit), RenderError> {
        let source = Arc::clone(&self.source);
        let (sender, receiver) = oneshot::channel();
        tokio::spawn(async move {
            let opened = source.open_page().await.map(Arc::<dyn DiagramPage>::from);
            if let Err((Ok(page), permit)) = sender.send((opened, permit)) {
                if let Err(err) = page.close().await {
                    warn!(
                        target = "application::render",
                        op = "pool::open",
                        result = "error",
                        error = %err,
                        "Failed to close page opened for an abandoned request"
                    );
                }
                drop(permit);
            }
        });

        let (opened, permit) = receiver
            .await
            .map_err(|_| ResourceError::open_page("page opener stopped"))?;
        Ok((opened?, permit))
    }
}

/// Exclusive use of one page. Holds a pool permit until the page is closed.
pub struct PageLease {
    page: Arc<dyn DiagramPage>,
    permit: Option<OwnedSemaphorePermit>,
    released: bool,
}

impl PageLease {
    pub fn page(&self) -> &dyn DiagramPage {
        self.page.as_ref()
    }

    /// Close the page and return its permit to the pool.
    ///
    /// The close runs on its own task, so cancelling the caller cannot cut it short.
    pub async fn release(mut self) {
        self.released = true;
        let page = Arc::clone(&self.page);
        let permit = self.permit.take();
        let closing = tokio::spawn(async move {
            close_page(page).await;
            drop(permit);
        });
        if let Err(err) = closing.await {
            warn!(
                target = "application::render",
                op = "pool::release",
                result = "error",
                error = %err,
                "Page close task failed"
            );
        }
    }
}

impl Drop for PageLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let page = Arc::clone(&self.page);
        let permit = self.permit.take();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    close_page(page).await;
                    drop(permit);
                });
            }
            Err(_) => {
                gauge!("mermaid_ink_pages_open").decrement(1.0);
                warn!(
                    target = "application::render",
                    op = "pool::drop",
                    result = "leaked",
                    "Page lease dropped outside a runtime; page left to browser shutdown"
                );
            }
        }
    }
}

async fn close_page(page: Arc<dyn DiagramPage>) {
    if let Err(err) = page.close().await {
        warn!(
            target = "application::render",
            op = "pool::release",
            result = "error",
            error = %err,
            "Failed to close page"
        );
    }
    gauge!("mermaid_ink_pages_open").decrement(1.0);
    debug!(
        target = "application::render",
        stage = "page_released",
        "Page closed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::render::testing::{PageScript, ScriptedSource};

    fn pool(source: &Arc<ScriptedSource>, max_pages: usize, timeout_ms: u64) -> PagePool {
        let source: Arc<dyn PageSource> = source.clone();
        PagePool::new(source, max_pages, Duration::from_millis(timeout_ms))
    }

    async fn settle(source: &ScriptedSource, closes: usize) {
        for _ in 0..100 {
            if source.closes() >= closes {
                return;
            }
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn release_closes_page_and_returns_permit() {
        let source = Arc::new(ScriptedSource::new(PageScript::rendered()));
        let pool = pool(&source, 2, 50);

        let lease = pool.acquire().await.expect("lease");
        assert_eq!(pool.available(), 1);
        lease.release().await;

        assert_eq!(source.closes(), 1);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn saturated_pool_times_out() {
        let source = Arc::new(ScriptedSource::new(PageScript::rendered()));
        let pool = pool(&source, 1, 30);

        let held = pool.acquire().await.expect("first lease");
        let err = pool.acquire().await.err().expect("second lease times out");
        assert!(matches!(err, RenderError::Saturated { .. }));
        assert_eq!(source.opened(), 1);

        held.release().await;
        let lease = pool.acquire().await.expect("permit returned");
        lease.release().await;
        assert_eq!(source.closes(), 2);
    }

    #[tokio::test]
    async fn waiter_proceeds_once_a_page_is_released() {
        let source = Arc::new(ScriptedSource::new(PageScript::rendered()));
        let pool = pool(&source, 1, 1_000);

        let held = pool.acquire().await.expect("first lease");
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move {
                let lease = pool.acquire().await?;
                lease.release().await;
                Ok::<_, RenderError>(())
            })
        };
        tokio::task::yield_now().await;
        held.release().await;

        waiter.await.expect("join").expect("waiter leased");
        settle(&source, 2).await;
        assert_eq!(source.opened(), 2);
        assert_eq!(source.closes(), 2);
    }

    #[tokio::test]
    async fn dropped_lease_closes_page_exactly_once() {
        let source = Arc::new(ScriptedSource::new(PageScript::rendered()));
        let pool = pool(&source, 1, 50);

        let lease = pool.acquire().await.expect("lease");
        drop(lease);
        settle(&source, 1).await;
        assert_eq!(source.closes(), 1);

        let lease = pool.acquire().await.expect("permit returned after drop");
        lease.release().await;
        settle(&source, 2).await;
        assert_eq!(source.closes(), 2);
    }

    #[tokio::test]
    async fn cancelled_render_future_still_releases() {
        let source = Arc::new(ScriptedSource::new(PageScript::rendered()));
        let pool = pool(&source, 1, 50);

        let task = {
            let pool = pool.clone();
            tokio::spawn(async move {
                let _lease = pool.acquire().await.expect("lease");
                std::future::pending::<()>().await;
            })
        };
        for _ in 0..10 {
            if source.opened() == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        task.abort();
        let _ = task.await;
        settle(&source, 1).await;
        assert_eq!(source.opened(), 1);
        assert_eq!(source.closes(), 1);
    }

    #[tokio::test]
    async fn aborted_release_still_finishes_closing() {
        let source = Arc::new(ScriptedSource::new(PageScript {
            close_delay: Some(Duration::from_millis(50)),
            ..PageScript::rendered()
        }));
        let pool = pool(&source, 1, 50);

        let lease = pool.acquire().await.expect("lease");
        let releasing = tokio::spawn(lease.release());
        while source.log().close_attempts == 0 {
            tokio::task::yield_now().await;
        }
        releasing.abort();
        let _ = releasing.await;

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(source.log().close_attempts, 1);
        assert_eq!(source.closes(), 1);
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn permit_is_held_until_close_completes() {
        let source = Arc::new(ScriptedSource::new(PageScript {
            close_delay: Some(Duration::from_millis(50)),
            ..PageScript::rendered()
        }));
        let pool = pool(&source, 1, 50);

        let lease = pool.acquire().await.expect("lease");
        let releasing = tokio::spawn(lease.release());
        while source.log().close_attempts == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(pool.available(), 0);

        releasing.await.expect("release task");
        assert_eq!(source.closes(), 1);
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn abandoned_acquire_closes_late_page() {
        let source = Arc::new(ScriptedSource::slow_to_open(
            PageScript::rendered(),
            Duration::from_millis(40),
        ));
        let pool = pool(&source, 1, 50);

        let acquiring = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(pool.available(), 0);
        acquiring.abort();
        let _ = acquiring.await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(source.opened(), 1);
        assert_eq!(source.closes(), 1);
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn open_failure_returns_permit() {
        let source = Arc::new(ScriptedSource::failing());
        let pool = pool(&source, 1, 50);

        let err = pool.acquire().await.err().expect("open fails");
        assert!(matches!(err, RenderError::Resource(ResourceError::OpenPage { .. })));
        assert_eq!(pool.available(), 1);
        assert_eq!(source.closes(), 0);
    }

    #[tokio::test]
    async fn closed_pool_rejects_acquisition() {
        let source = Arc::new(ScriptedSource::new(PageScript::rendered()));
        let pool = pool(&source, 1, 50);
        pool.close();
        assert!(matches!(
            pool.acquire().await.err().expect("closed"),
            RenderError::Resource(_)
        ));
    }
}
