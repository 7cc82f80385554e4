//! Integration tests for Takeout.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p takeout-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `cart_persistence` - The cart surviving restarts through its snapshot
//!   file
//! - `remote_sync` - Mirroring, reconciliation, and checkout against
//!   [`InMemoryBackend`]
//!
//! No network is needed; the backend is faked in memory with the same row
//! semantics as the hosted tables.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use takeout_core::{CartRowId, FoodId, OrderId, Price, Quantity, UserId};
use takeout_storefront::backend::{
    BackendError, CartBackend, NewCartRow, NewOrder, NewOrderItem, Order, OrderBackend,
    ServerCartRow,
};

#[derive(Debug, Clone)]
struct StoredRow {
    user_id: UserId,
    row: ServerCartRow,
}

/// Backend tables held in memory.
///
/// Cart rows behave like the hosted `cart` table: inserts always add a new
/// row, so one item can end up with several rows.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    names: Mutex<HashMap<FoodId, String>>,
    rows: Mutex<Vec<StoredRow>>,
    orders: Mutex<Vec<NewOrder>>,
    order_items: Mutex<Vec<NewOrderItem>>,
    next_id: AtomicU64,
    rate_limited_writes: AtomicU32,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a food name, as the `food(name)` embed would return it.
    pub fn stock(&self, item_id: &FoodId, name: &str) {
        lock(&self.names).insert(item_id.clone(), name.to_owned());
    }

    /// Store a row directly, bypassing the client.
    ///
    /// # Errors
    ///
    /// Never in practice; generated row IDs are always valid.
    pub fn seed_row(
        &self,
        user_id: &UserId,
        item_id: &FoodId,
        unit_price: Price,
        quantity: Quantity,
    ) -> Result<(), BackendError> {
        let row = self.make_row(item_id, unit_price, quantity)?;
        lock(&self.rows).push(StoredRow {
            user_id: user_id.clone(),
            row,
        });
        Ok(())
    }

    /// Reject the next `count` cart writes as rate limited.
    pub fn rate_limit_next_writes(&self, count: u32) {
        self.rate_limited_writes.store(count, Ordering::SeqCst);
    }

    /// The user's rows as `(item, quantity)`, in insertion order.
    #[must_use]
    pub fn rows_for(&self, user_id: &UserId) -> Vec<(String, u32)> {
        lock(&self.rows)
            .iter()
            .filter(|stored| &stored.user_id == user_id)
            .map(|stored| (stored.row.item_id.to_string(), stored.row.quantity.get()))
            .collect()
    }

    #[must_use]
    pub fn orders(&self) -> Vec<NewOrder> {
        lock(&self.orders).clone()
    }

    #[must_use]
    pub fn order_items(&self) -> Vec<NewOrderItem> {
        lock(&self.order_items).clone()
    }

    fn make_row(
        &self,
        item_id: &FoodId,
        unit_price: Price,
        quantity: Quantity,
    ) -> Result<ServerCartRow, BackendError> {
        let id = CartRowId::parse(&format!("row-{}", self.next_id()))
            .map_err(|e| BackendError::Validation(e.to_string()))?;
        let name = lock(&self.names)
            .get(item_id)
            .cloned()
            .unwrap_or_else(|| item_id.to_string());
        Ok(ServerCartRow {
            id,
            item_id: item_id.clone(),
            name,
            unit_price,
            quantity,
        })
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn check_rate_limit(&self) -> Result<(), BackendError> {
        let limited = self
            .rate_limited_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if limited {
            Err(BackendError::RateLimited(0))
        } else {
            Ok(())
        }
    }
}

impl CartBackend for InMemoryBackend {
    async fn fetch_server_cart(&self, user_id: &UserId) -> Result<Vec<ServerCartRow>, BackendError> {
        Ok(lock(&self.rows)
            .iter()
            .filter(|stored| &stored.user_id == user_id)
            .map(|stored| stored.row.clone())
            .collect())
    }

    async fn insert_cart_row(&self, row: &NewCartRow) -> Result<(), BackendError> {
        self.check_rate_limit()?;
        self.seed_row(&row.user_id, &row.item_id, row.unit_price, row.quantity)
    }

    async fn delete_cart_row(&self, user_id: &UserId, item_id: &FoodId) -> Result<(), BackendError> {
        self.check_rate_limit()?;
        lock(&self.rows)
            .retain(|stored| !(&stored.user_id == user_id && &stored.row.item_id == item_id));
        Ok(())
    }

    async fn delete_all_cart_rows(&self, user_id: &UserId) -> Result<(), BackendError> {
        self.check_rate_limit()?;
        lock(&self.rows).retain(|stored| &stored.user_id != user_id);
        Ok(())
    }
}

impl OrderBackend for InMemoryBackend {
    async fn create_order(&self, order: &NewOrder) -> Result<Order, BackendError> {
        let id = OrderId::parse(&format!("order-{}", self.next_id()))
            .map_err(|e| BackendError::Validation(e.to_string()))?;
        lock(&self.orders).push(order.clone());
        Ok(Order {
            id,
            user_id: order.user_id.clone(),
            restaurant_id: order.restaurant_id.clone(),
            restaurant_name: None,
            status: order.status,
            total_amount: order.total_amount,
            delivery_address: Some(order.delivery_address.clone()),
            created_at: Utc::now(),
            items: Vec::new(),
        })
    }

    async fn insert_order_items(&self, items: &[NewOrderItem]) -> Result<(), BackendError> {
        lock(&self.order_items).extend_from_slice(items);
        Ok(())
    }
}
