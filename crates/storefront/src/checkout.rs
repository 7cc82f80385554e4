//! Turning the cart into an order.

use takeout_core::{OrderStatus, UserId};
use thiserror::Error;
use tracing::{info, warn};

use crate::backend::{BackendError, CartBackend, NewOrder, NewOrderItem, Order, OrderBackend};
use crate::cart::{CartStore, SnapshotStore};
use crate::sync::{RemoteCartOp, RemoteCartQueue, SyncError};

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("the cart is empty")]
    EmptyCart,

    #[error("set a delivery address before placing the order")]
    MissingAddress,

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Place an order for everything in the cart.
///
/// Inserts the order and its items, clears the user's remote cart through
/// the queue, then clears the local cart. If the items fail to insert, the
/// order row already exists and the carts are left as they were so the
/// user can retry.
///
/// # Errors
///
/// Returns [`CheckoutError::EmptyCart`] or
/// [`CheckoutError::MissingAddress`] before anything is sent, and a
/// backend error if the order could not be stored.
pub async fn place_order<B, S>(
    backend: &B,
    queue: &RemoteCartQueue<B>,
    cart: &mut CartStore<S>,
    user_id: &UserId,
) -> Result<Order, CheckoutError>
where
    B: CartBackend + OrderBackend,
    S: SnapshotStore,
{
    let state = cart.state();
    if state.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }
    let delivery_address = state
        .delivery_address()
        .ok_or(CheckoutError::MissingAddress)?
        .to_owned();

    // Remote writes still in flight must land before the cart is cleared.
    queue.flush().await?;

    let order = backend
        .create_order(&NewOrder {
            user_id: user_id.clone(),
            restaurant_id: None,
            status: OrderStatus::Pending,
            total_amount: state.total(),
            delivery_address,
        })
        .await?;

    let items: Vec<NewOrderItem> = state
        .lines()
        .iter()
        .map(|line| NewOrderItem {
            order_id: order.id.clone(),
            item_id: line.item_id().clone(),
            quantity: line.quantity(),
            unit_price: line.unit_price(),
        })
        .collect();
    backend.insert_order_items(&items).await?;

    queue.submit(RemoteCartOp::Clear {
        user_id: user_id.clone(),
    })?;
    for failure in queue.flush().await? {
        warn!(
            error = %failure.error,
            "Remote cart could not be cleared after checkout"
        );
    }
    cart.clear_cart();

    info!(order_id = %order.id, total = %order.total_amount, "Order placed");
    Ok(order)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::Utc;
    use rust_decimal::dec;
    use takeout_core::{FoodId, OrderId};

    use super::*;
    use crate::backend::{NewCartRow, ServerCartRow};
    use crate::cart::MemorySnapshotStore;

    #[derive(Default)]
    struct FakeBackend {
        orders: Mutex<Vec<NewOrder>>,
        items: Mutex<Vec<NewOrderItem>>,
        cart_cleared: Mutex<bool>,
        fail_items: bool,
    }

    impl CartBackend for FakeBackend {
        async fn fetch_server_cart(&self, _: &UserId) -> Result<Vec<ServerCartRow>, BackendError> {
            Ok(Vec::new())
        }

        async fn insert_cart_row(&self, _: &NewCartRow) -> Result<(), BackendError> {
            Ok(())
        }

        async fn delete_cart_row(&self, _: &UserId, _: &FoodId) -> Result<(), BackendError> {
            Ok(())
        }

        async fn delete_all_cart_rows(&self, _: &UserId) -> Result<(), BackendError> {
            *self.cart_cleared.lock().unwrap() = true;
            Ok(())
        }
    }

    impl OrderBackend for FakeBackend {
        async fn create_order(&self, order: &NewOrder) -> Result<Order, BackendError> {
            self.orders.lock().unwrap().push(order.clone());
            Ok(Order {
                id: OrderId::parse("order-1").unwrap(),
                user_id: order.user_id.clone(),
                restaurant_id: None,
                restaurant_name: None,
                status: order.status,
                total_amount: order.total_amount,
                delivery_address: Some(order.delivery_address.clone()),
                created_at: Utc::now(),
                items: Vec::new(),
            })
        }

        async fn insert_order_items(&self, items: &[NewOrderItem]) -> Result<(), BackendError> {
            if self.fail_items {
                return Err(BackendError::Api {
                    status: 500,
                    message: "boom".to_string(),
                });
            }
            self.items.lock().unwrap().extend_from_slice(items);
            Ok(())
        }
    }

    fn user() -> UserId {
        UserId::parse("user-1").unwrap()
    }

    fn filled_cart() -> CartStore<MemorySnapshotStore> {
        let mut cart = CartStore::open(MemorySnapshotStore::new());
        cart.add_item("p1", "Pizza", dec!(10)).unwrap();
        cart.add_item("p1", "Pizza", dec!(10)).unwrap();
        cart.add_item("p2", "Soda", dec!(1.5)).unwrap();
        cart
    }

    #[tokio::test]
    async fn test_place_order() {
        let backend = Arc::new(FakeBackend::default());
        let queue = RemoteCartQueue::spawn(Arc::clone(&backend), 1);
        let mut cart = filled_cart();
        cart.set_delivery_address(Some("1 Main St"));

        let order = place_order(backend.as_ref(), &queue, &mut cart, &user())
            .await
            .unwrap();

        assert_eq!(order.total_amount.amount(), dec!(21.5));
        assert_eq!(order.status, OrderStatus::Pending);
        let items = backend.items.lock().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].quantity.get(), 2);
        assert_eq!(items[0].order_id.as_str(), "order-1");
        assert!(*backend.cart_cleared.lock().unwrap());
        assert!(cart.state().is_empty());
        assert_eq!(cart.state().delivery_address(), None);
    }

    #[tokio::test]
    async fn test_requires_items_and_address() {
        let backend = Arc::new(FakeBackend::default());
        let queue = RemoteCartQueue::spawn(Arc::clone(&backend), 1);

        let mut empty = CartStore::open(MemorySnapshotStore::new());
        empty.set_delivery_address(Some("1 Main St"));
        assert!(matches!(
            place_order(backend.as_ref(), &queue, &mut empty, &user()).await,
            Err(CheckoutError::EmptyCart)
        ));

        let mut no_address = filled_cart();
        assert!(matches!(
            place_order(backend.as_ref(), &queue, &mut no_address, &user()).await,
            Err(CheckoutError::MissingAddress)
        ));
        assert!(backend.orders.lock().unwrap().is_empty());
        assert_eq!(no_address.item_count(), 3);
    }

    #[tokio::test]
    async fn test_failed_items_keep_the_cart() {
        let backend = Arc::new(FakeBackend {
            fail_items: true,
            ..FakeBackend::default()
        });
        let queue = RemoteCartQueue::spawn(Arc::clone(&backend), 1);
        let mut cart = filled_cart();
        cart.set_delivery_address(Some("1 Main St"));

        let result = place_order(backend.as_ref(), &queue, &mut cart, &user()).await;
        assert!(matches!(result, Err(CheckoutError::Backend(_))));
        assert_eq!(cart.item_count(), 3);
        assert!(!*backend.cart_cleared.lock().unwrap());
    }
}
