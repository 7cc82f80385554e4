//! Order history and order creation.

use std::future::Future;

use chrono::{DateTime, Utc};
use reqwest::Method;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use takeout_core::{FoodId, OrderId, OrderStatus, Price, Quantity, RestaurantId, UserId};
use tracing::{info, instrument};

use super::{BackendClient, BackendError, eq, single};

const ORDER_SELECT: &str =
    "*,restaurants(name),order_items(quantity,unit_price,food_id,food(name))";

/// A placed order with its line items.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "OrderWire")]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub restaurant_id: Option<RestaurantId>,
    pub restaurant_name: Option<String>,
    pub status: OrderStatus,
    pub total_amount: Price,
    pub delivery_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

/// One line of an order, priced as it was at checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderItem {
    pub item_id: Option<FoodId>,
    pub name: Option<String>,
    pub quantity: Quantity,
    pub unit_price: Price,
}

impl OrderItem {
    /// `unit_price * quantity`, or `None` if it is too large to represent.
    #[must_use]
    pub fn subtotal(&self) -> Option<Price> {
        self.unit_price.checked_times(self.quantity)
    }

    /// Name for display, falling back to the item ID.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or_else(|| self.item_id.as_ref().map(FoodId::as_str))
            .unwrap_or("Unknown item")
    }
}

#[derive(Deserialize)]
struct OrderWire {
    id: OrderId,
    user_id: UserId,
    #[serde(default)]
    restaurant_id: Option<RestaurantId>,
    #[serde(default)]
    restaurants: Option<Named>,
    #[serde(default)]
    status: OrderStatus,
    total_amount: Decimal,
    #[serde(default)]
    delivery_address: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    order_items: Vec<OrderItemWire>,
}

#[derive(Deserialize)]
struct OrderItemWire {
    quantity: i64,
    unit_price: Decimal,
    #[serde(default)]
    food_id: Option<FoodId>,
    #[serde(default)]
    food: Option<Named>,
}

#[derive(Deserialize)]
struct Named {
    name: String,
}

impl TryFrom<OrderWire> for Order {
    type Error = String;

    fn try_from(wire: OrderWire) -> Result<Self, Self::Error> {
        let items = wire
            .order_items
            .into_iter()
            .map(|item| {
                Ok(OrderItem {
                    item_id: item.food_id,
                    name: item.food.map(|food| food.name),
                    quantity: Quantity::try_from(item.quantity).map_err(|e| e.to_string())?,
                    unit_price: Price::new(item.unit_price).map_err(|e| e.to_string())?,
                })
            })
            .collect::<Result<Vec<_>, String>>()?;

        Ok(Self {
            id: wire.id,
            user_id: wire.user_id,
            restaurant_id: wire.restaurant_id,
            restaurant_name: wire.restaurants.map(|r| r.name),
            status: wire.status,
            total_amount: Price::new(wire.total_amount).map_err(|e| e.to_string())?,
            delivery_address: wire.delivery_address,
            created_at: wire.created_at,
            items,
        })
    }
}

/// An order row to insert. Items are inserted separately once the order
/// has an ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewOrder {
    pub user_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restaurant_id: Option<RestaurantId>,
    pub status: OrderStatus,
    pub total_amount: Price,
    pub delivery_address: String,
}

/// An `order_items` row to insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewOrderItem {
    pub order_id: OrderId,
    #[serde(rename = "food_id")]
    pub item_id: FoodId,
    pub quantity: Quantity,
    pub unit_price: Price,
}

impl BackendClient {
    /// The user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn list_orders(&self, user_id: &UserId) -> Result<Vec<Order>, BackendError> {
        let filter = eq(user_id.as_str());
        let request = self.table(
            Method::GET,
            "orders",
            &[
                ("select", ORDER_SELECT),
                ("user_id", filter.as_str()),
                ("order", "created_at.desc"),
            ],
        )?;
        Self::send_json(request).await
    }
}

/// Order writes used by checkout.
///
/// Implemented by [`BackendClient`]; tests substitute an in-memory fake.
pub trait OrderBackend: Send + Sync + 'static {
    /// Insert an order row and return it as stored.
    fn create_order(
        &self,
        order: &NewOrder,
    ) -> impl Future<Output = Result<Order, BackendError>> + Send;

    /// Insert the items of an order in one request.
    fn insert_order_items(
        &self,
        items: &[NewOrderItem],
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}

impl OrderBackend for BackendClient {
    #[instrument(skip(self, order), fields(user_id = %order.user_id, total = %order.total_amount))]
    async fn create_order(&self, order: &NewOrder) -> Result<Order, BackendError> {
        let request = self
            .table(Method::POST, "orders", &[])?
            .header("Prefer", "return=representation")
            .json(order);
        let rows: Vec<Order> = Self::send_json(request).await?;
        let created = single(rows, || "created order".to_string())?;
        info!(order_id = %created.id, "Order created");
        Ok(created)
    }

    #[instrument(skip(self, items), fields(count = items.len()))]
    async fn insert_order_items(&self, items: &[NewOrderItem]) -> Result<(), BackendError> {
        if items.is_empty() {
            return Ok(());
        }
        let request = self
            .table(Method::POST, "order_items", &[])?
            .header("Prefer", "return=minimal")
            .json(items);
        Self::send_empty(request).await
    }
}
