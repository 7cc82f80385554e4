//! Mirroring the local cart to the backend.
//!
//! The cart store never talks to the network. Whoever drives it submits a
//! [`RemoteCartOp`] for each local change to a [`RemoteCartQueue`], which
//! applies them on a single background task in submission order. That
//! ordering is what keeps a remove from overtaking the add before it.
//!
//! Going the other way, [`RemoteCartQueue::reconcile`] replaces the local
//! lines with the server's copy.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use takeout_core::{FoodId, Price, Quantity, UserId};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{BackendError, CartBackend, NewCartRow, ServerCartRow};
use crate::cart::{CartError, CartLineInput, CartStore, SnapshotStore};

/// Upper bound on a single rate-limit wait.
const MAX_RETRY_WAIT_SECS: u64 = 30;

/// Errors from the sync queue.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// The server's cart could not be installed locally.
    #[error("server cart rejected: {0}")]
    Cart(#[from] CartError),

    /// The worker has stopped and accepts no more operations.
    #[error("sync queue is closed")]
    Closed,

    #[error("sync worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// One remote cart write, mirroring a local mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCartOp {
    /// One more unit of an item.
    AddOne {
        user_id: UserId,
        item_id: FoodId,
        unit_price: Price,
    },
    /// Collapse an item's rows into one with the given quantity.
    SetQuantity {
        user_id: UserId,
        item_id: FoodId,
        unit_price: Price,
        quantity: Quantity,
    },
    /// Drop every row for an item.
    Remove { user_id: UserId, item_id: FoodId },
    /// Drop every row the user has.
    Clear { user_id: UserId },
}

impl RemoteCartOp {
    const fn kind(&self) -> &'static str {
        match self {
            Self::AddOne { .. } => "add_one",
            Self::SetQuantity { .. } => "set_quantity",
            Self::Remove { .. } => "remove",
            Self::Clear { .. } => "clear",
        }
    }

    const fn user_id(&self) -> &UserId {
        match self {
            Self::AddOne { user_id, .. }
            | Self::SetQuantity { user_id, .. }
            | Self::Remove { user_id, .. }
            | Self::Clear { user_id } => user_id,
        }
    }
}

/// An operation that was dropped after its last attempt failed.
#[derive(Debug)]
pub struct SyncFailure {
    pub op: RemoteCartOp,
    pub error: BackendError,
}

/// What the worker did over its lifetime.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub applied: usize,
    pub failures: Vec<SyncFailure>,
}

enum Message {
    Apply(RemoteCartOp),
    Flush(oneshot::Sender<Vec<SyncFailure>>),
}

/// Serializes remote cart writes on one background task.
///
/// Must be created inside a tokio runtime.
pub struct RemoteCartQueue<B: CartBackend> {
    backend: Arc<B>,
    sender: mpsc::UnboundedSender<Message>,
    worker: JoinHandle<SyncReport>,
}

impl<B: CartBackend> std::fmt::Debug for RemoteCartQueue<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCartQueue")
            .field("closed", &self.sender.is_closed())
            .finish_non_exhaustive()
    }
}

impl<B: CartBackend> RemoteCartQueue<B> {
    /// Start the worker. Rate-limited writes are tried up to
    /// `max_attempts` times; every other failure is final.
    pub fn spawn(backend: Arc<B>, max_attempts: u32) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(
            Arc::clone(&backend),
            receiver,
            max_attempts.max(1),
        ));
        Self {
            backend,
            sender,
            worker,
        }
    }

    /// Queue an operation behind everything submitted before it.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Closed`] if the worker has stopped.
    pub fn submit(&self, op: RemoteCartOp) -> Result<(), SyncError> {
        debug!(op = op.kind(), "Queued remote cart write");
        self.sender
            .send(Message::Apply(op))
            .map_err(|_| SyncError::Closed)
    }

    /// Wait until everything submitted so far has been applied.
    ///
    /// Returns the operations that failed since the previous flush.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Closed`] if the worker has stopped.
    pub async fn flush(&self) -> Result<Vec<SyncFailure>, SyncError> {
        let (reply, done) = oneshot::channel();
        self.sender
            .send(Message::Flush(reply))
            .map_err(|_| SyncError::Closed)?;
        done.await.map_err(|_| SyncError::Closed)
    }

    /// Apply everything still queued, then stop the worker.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Worker`] if the worker panicked.
    pub async fn shutdown(self) -> Result<SyncReport, SyncError> {
        drop(self.sender);
        let report = self.worker.await?;
        info!(
            applied = report.applied,
            failed = report.failures.len(),
            "Remote cart sync stopped"
        );
        Ok(report)
    }

    /// Replace the local cart's lines with the server's copy.
    ///
    /// Pending writes are flushed first so the server copy includes them.
    /// Rows that share an item are coalesced; the delivery address is kept.
    ///
    /// # Errors
    ///
    /// Returns error if the fetch fails or a server row is unusable; the
    /// local cart is left untouched in both cases.
    pub async fn reconcile<S: SnapshotStore>(
        &self,
        store: &mut CartStore<S>,
        user_id: &UserId,
    ) -> Result<(), SyncError> {
        for failure in self.flush().await? {
            warn!(
                op = failure.op.kind(),
                error = %failure.error,
                "Remote cart write was lost before reconcile"
            );
        }

        let rows = self.backend.fetch_server_cart(user_id).await?;
        let lines = coalesce_rows(&rows);
        store.replace_all(lines)?;
        info!(
            rows = rows.len(),
            lines = store.state().lines().len(),
            "Cart reconciled from server"
        );
        Ok(())
    }
}

/// Merge server rows that share an item into one line each.
///
/// Quantities are summed. The first row's name and unit price win; a later
/// row with a different price is logged.
#[must_use]
pub fn coalesce_rows(rows: &[ServerCartRow]) -> Vec<CartLineInput> {
    let mut lines: Vec<CartLineInput> = Vec::new();
    let mut index: HashMap<&FoodId, usize> = HashMap::new();

    for row in rows {
        if let Some(line) = index.get(&row.item_id).and_then(|&i| lines.get_mut(i)) {
            if line.unit_price != row.unit_price.amount() {
                warn!(
                    item_id = %row.item_id,
                    kept = %line.unit_price,
                    ignored = %row.unit_price,
                    "Server cart rows disagree on price"
                );
            }
            line.quantity = line.quantity.saturating_add(i64::from(row.quantity.get()));
        } else {
            index.insert(&row.item_id, lines.len());
            lines.push(row.to_line_input());
        }
    }

    lines
}

async fn run_worker<B: CartBackend>(
    backend: Arc<B>,
    mut receiver: mpsc::UnboundedReceiver<Message>,
    max_attempts: u32,
) -> SyncReport {
    let mut report = SyncReport::default();
    let mut since_flush = Vec::new();

    while let Some(message) = receiver.recv().await {
        match message {
            Message::Apply(op) => match apply_with_retry(backend.as_ref(), &op, max_attempts).await {
                Ok(()) => report.applied += 1,
                Err(error) => {
                    warn!(
                        op = op.kind(),
                        user_id = %op.user_id(),
                        error = %error,
                        "Remote cart write failed"
                    );
                    since_flush.push(SyncFailure { op, error });
                }
            },
            Message::Flush(reply) => {
                // The flusher may have given up waiting; nothing to do then.
                let _ = reply.send(std::mem::take(&mut since_flush));
            }
        }
    }

    report.failures = since_flush;
    report
}

async fn apply_with_retry<B: CartBackend>(
    backend: &B,
    op: &RemoteCartOp,
    max_attempts: u32,
) -> Result<(), BackendError> {
    let mut attempt = 1;
    loop {
        match apply(backend, op).await {
            Err(BackendError::RateLimited(secs)) if attempt < max_attempts => {
                let wait = secs.min(MAX_RETRY_WAIT_SECS);
                debug!(op = op.kind(), attempt, wait, "Rate limited, retrying");
                tokio::time::sleep(Duration::from_secs(wait)).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

async fn apply<B: CartBackend>(backend: &B, op: &RemoteCartOp) -> Result<(), BackendError> {
    match op {
        RemoteCartOp::AddOne {
            user_id,
            item_id,
            unit_price,
        } => {
            backend
                .insert_cart_row(&NewCartRow {
                    user_id: user_id.clone(),
                    item_id: item_id.clone(),
                    unit_price: *unit_price,
                    quantity: Quantity::ONE,
                })
                .await
        }
        RemoteCartOp::SetQuantity {
            user_id,
            item_id,
            unit_price,
            quantity,
        } => {
            backend.delete_cart_row(user_id, item_id).await?;
            backend
                .insert_cart_row(&NewCartRow {
                    user_id: user_id.clone(),
                    item_id: item_id.clone(),
                    unit_price: *unit_price,
                    quantity: *quantity,
                })
                .await
        }
        RemoteCartOp::Remove { user_id, item_id } => backend.delete_cart_row(user_id, item_id).await,
        RemoteCartOp::Clear { user_id } => backend.delete_all_cart_rows(user_id).await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use rust_decimal::dec;
    use takeout_core::CartRowId;

    use super::*;
    use crate::cart::MemorySnapshotStore;

    /// In-memory backend recording every call.
    #[derive(Default)]
    struct FakeBackend {
        rows: Mutex<Vec<ServerCartRow>>,
        calls: Mutex<Vec<String>>,
        next_id: AtomicU32,
        rate_limits_left: AtomicU32,
    }

    impl FakeBackend {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn row(&self, item: &str, price: rust_decimal::Decimal, quantity: u32) -> ServerCartRow {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            ServerCartRow {
                id: CartRowId::parse(&format!("row-{id}")).unwrap(),
                item_id: FoodId::parse(item).unwrap(),
                name: item.to_uppercase(),
                unit_price: Price::new(price).unwrap(),
                quantity: Quantity::try_from(quantity).unwrap(),
            }
        }
    }

    impl CartBackend for FakeBackend {
        async fn fetch_server_cart(&self, _user_id: &UserId) -> Result<Vec<ServerCartRow>, BackendError> {
            Ok(self.rows.lock().unwrap().clone())
        }

        async fn insert_cart_row(&self, row: &NewCartRow) -> Result<(), BackendError> {
            if self
                .rate_limits_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                self.calls.lock().unwrap().push("429".to_string());
                return Err(BackendError::RateLimited(0));
            }
            self.calls
                .lock()
                .unwrap()
                .push(format!("insert {} x{}", row.item_id, row.quantity));
            let new_row = self.row(row.item_id.as_str(), row.unit_price.amount(), row.quantity.get());
            self.rows.lock().unwrap().push(new_row);
            Ok(())
        }

        async fn delete_cart_row(&self, _user_id: &UserId, item_id: &FoodId) -> Result<(), BackendError> {
            self.calls.lock().unwrap().push(format!("delete {item_id}"));
            self.rows.lock().unwrap().retain(|row| &row.item_id != item_id);
            Ok(())
        }

        async fn delete_all_cart_rows(&self, _user_id: &UserId) -> Result<(), BackendError> {
            self.calls.lock().unwrap().push("delete all".to_string());
            self.rows.lock().unwrap().clear();
            Ok(())
        }
    }

    fn user() -> UserId {
        UserId::parse("user-1").unwrap()
    }

    fn food(id: &str) -> FoodId {
        FoodId::parse(id).unwrap()
    }

    fn add(item: &str) -> RemoteCartOp {
        RemoteCartOp::AddOne {
            user_id: user(),
            item_id: food(item),
            unit_price: Price::new(dec!(10)).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_operations_apply_in_submission_order() {
        let backend = Arc::new(FakeBackend::default());
        let queue = RemoteCartQueue::spawn(Arc::clone(&backend), 3);

        queue.submit(add("p1")).unwrap();
        queue
            .submit(RemoteCartOp::Remove {
                user_id: user(),
                item_id: food("p1"),
            })
            .unwrap();
        queue.submit(add("p2")).unwrap();
        queue
            .submit(RemoteCartOp::SetQuantity {
                user_id: user(),
                item_id: food("p2"),
                unit_price: Price::new(dec!(10)).unwrap(),
                quantity: Quantity::try_from(4_i64).unwrap(),
            })
            .unwrap();

        let report = queue.shutdown().await.unwrap();
        assert_eq!(report.applied, 4);
        assert!(report.failures.is_empty());
        assert_eq!(
            backend.calls(),
            ["insert p1 x1", "delete p1", "insert p2 x1", "delete p2", "insert p2 x4"]
        );
        let rows = backend.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].quantity.get(), 4);
    }

    #[tokio::test]
    async fn test_rate_limited_writes_are_retried() {
        let backend = Arc::new(FakeBackend::default());
        backend.rate_limits_left.store(2, Ordering::SeqCst);
        let queue = RemoteCartQueue::spawn(Arc::clone(&backend), 3);

        queue.submit(add("p1")).unwrap();
        assert!(queue.flush().await.unwrap().is_empty());
        assert_eq!(backend.calls(), ["429", "429", "insert p1 x1"]);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let backend = Arc::new(FakeBackend::default());
        backend.rate_limits_left.store(5, Ordering::SeqCst);
        let queue = RemoteCartQueue::spawn(Arc::clone(&backend), 2);

        queue.submit(add("p1")).unwrap();
        let failures = queue.flush().await.unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].op, add("p1"));
        assert!(matches!(failures[0].error, BackendError::RateLimited(_)));

        // Failures are reported once.
        assert!(queue.flush().await.unwrap().is_empty());
        let report = queue.shutdown().await.unwrap();
        assert_eq!(report.applied, 0);
    }

    #[test]
    fn test_coalesce_sums_duplicates_and_keeps_first_price() {
        let backend = FakeBackend::default();
        let rows = vec![
            backend.row("p1", dec!(10), 1),
            backend.row("p2", dec!(3), 2),
            backend.row("p1", dec!(12), 2),
        ];

        let lines = coalesce_rows(&rows);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].item_id, "p1");
        assert_eq!(lines[0].quantity, 3);
        assert_eq!(lines[0].unit_price, dec!(10));
        assert_eq!(lines[1].item_id, "p2");
        assert_eq!(lines[1].quantity, 2);
    }

    #[test]
    fn test_coalesce_does_not_cap_summed_quantity() {
        let backend = FakeBackend::default();
        let rows = vec![
            backend.row("p1", dec!(1), Quantity::MAX),
            backend.row("p1", dec!(1), Quantity::MAX),
        ];
        // Left for validation to reject rather than silently clamped.
        assert_eq!(coalesce_rows(&rows)[0].quantity, 2 * i64::from(Quantity::MAX));
    }

    #[tokio::test]
    async fn test_reconcile_rejects_server_cart_too_large_to_total() {
        let backend = Arc::new(FakeBackend::default());
        {
            let mut rows = backend.rows.lock().unwrap();
            rows.push(backend.row("p1", rust_decimal::Decimal::MAX, 1));
            rows.push(backend.row("p1", rust_decimal::Decimal::MAX, 1));
        }
        let queue = RemoteCartQueue::spawn(Arc::clone(&backend), 3);

        let mut cart = CartStore::open(MemorySnapshotStore::new());
        cart.add_item("p2", "Soda", dec!(2)).unwrap();
        let before = cart.state().clone();

        assert!(queue.reconcile(&mut cart, &user()).await.is_err());
        assert_eq!(cart.state(), &before);
    }

    #[tokio::test]
    async fn test_reconcile_replaces_local_lines() {
        let backend = Arc::new(FakeBackend::default());
        {
            let mut rows = backend.rows.lock().unwrap();
            rows.push(backend.row("p1", dec!(10), 1));
            rows.push(backend.row("p1", dec!(10), 1));
            rows.push(backend.row("p2", dec!(2.5), 2));
        }
        let queue = RemoteCartQueue::spawn(Arc::clone(&backend), 3);

        let mut cart = CartStore::open(MemorySnapshotStore::new());
        cart.add_item("local-only", "Stale", dec!(99)).unwrap();
        cart.set_delivery_address(Some("1 Main St"));

        queue.reconcile(&mut cart, &user()).await.unwrap();

        let ids: Vec<&str> = cart
            .state()
            .lines()
            .iter()
            .map(|line| line.item_id().as_str())
            .collect();
        assert_eq!(ids, ["p1", "p2"]);
        assert_eq!(cart.state().lines()[0].quantity().get(), 2);
        assert_eq!(cart.get_total().amount(), dec!(25));
        assert_eq!(cart.state().delivery_address(), Some("1 Main St"));
    }

    #[tokio::test]
    async fn test_reconcile_sees_pending_writes() {
        let backend = Arc::new(FakeBackend::default());
        let queue = RemoteCartQueue::spawn(Arc::clone(&backend), 3);
        queue.submit(add("p1")).unwrap();
        queue.submit(add("p1")).unwrap();

        let mut cart = CartStore::open(MemorySnapshotStore::new());
        queue.reconcile(&mut cart, &user()).await.unwrap();
        assert_eq!(cart.item_count(), 2);
    }
}
