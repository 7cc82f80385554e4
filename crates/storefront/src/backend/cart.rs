//! Remote cart rows: the server-side mirror of the local cart.

use std::future::Future;

use reqwest::Method;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use takeout_core::{CartRowId, FoodId, Price, Quantity, UserId};
use tracing::instrument;

use super::{BackendClient, BackendError, eq};
use crate::cart::CartLineInput;

const CART_TABLE: &str = "cart";
const CART_SELECT: &str = "id,food_id,quantity,unit_price,food(name)";

/// The remote cart operations the sync queue depends on.
///
/// Implemented by [`BackendClient`]; tests substitute an in-memory fake.
pub trait CartBackend: Send + Sync + 'static {
    /// All cart rows stored for a user, in insertion order.
    fn fetch_server_cart(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<Vec<ServerCartRow>, BackendError>> + Send;

    /// Insert one row.
    fn insert_cart_row(
        &self,
        row: &NewCartRow,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Delete every row the user has for one item.
    fn delete_cart_row(
        &self,
        user_id: &UserId,
        item_id: &FoodId,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Delete every row the user has.
    fn delete_all_cart_rows(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}

/// A cart row as stored by the backend.
///
/// The backend does not enforce one row per item, so several rows may share
/// an `item_id`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "CartRowWire")]
pub struct ServerCartRow {
    pub id: CartRowId,
    pub item_id: FoodId,
    pub name: String,
    pub unit_price: Price,
    pub quantity: Quantity,
}

impl ServerCartRow {
    /// Unvalidated line data for [`CartStore::replace_all`](crate::cart::CartStore::replace_all).
    #[must_use]
    pub fn to_line_input(&self) -> CartLineInput {
        CartLineInput {
            item_id: self.item_id.to_string(),
            name: self.name.clone(),
            unit_price: self.unit_price.amount(),
            quantity: i64::from(self.quantity.get()),
        }
    }
}

#[derive(Deserialize)]
struct CartRowWire {
    id: CartRowId,
    food_id: FoodId,
    quantity: i64,
    unit_price: Decimal,
    food: Option<FoodName>,
}

#[derive(Deserialize)]
struct FoodName {
    name: String,
}

impl TryFrom<CartRowWire> for ServerCartRow {
    type Error = String;

    fn try_from(wire: CartRowWire) -> Result<Self, Self::Error> {
        let unit_price = Price::new(wire.unit_price).map_err(|e| e.to_string())?;
        let quantity = Quantity::try_from(wire.quantity).map_err(|e| e.to_string())?;
        // Rows whose food was deleted lose the embedded name.
        let name = wire
            .food
            .map(|food| food.name)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| wire.food_id.to_string());

        Ok(Self {
            id: wire.id,
            item_id: wire.food_id,
            name,
            unit_price,
            quantity,
        })
    }
}

/// A row to insert into the remote cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewCartRow {
    pub user_id: UserId,
    #[serde(rename = "food_id")]
    pub item_id: FoodId,
    pub unit_price: Price,
    pub quantity: Quantity,
}

impl CartBackend for BackendClient {
    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn fetch_server_cart(&self, user_id: &UserId) -> Result<Vec<ServerCartRow>, BackendError> {
        let filter = eq(user_id.as_str());
        let request = self.table(
            Method::GET,
            CART_TABLE,
            &[
                ("select", CART_SELECT),
                ("user_id", filter.as_str()),
                ("order", "id.asc"),
            ],
        )?;
        Self::send_json(request).await
    }

    #[instrument(skip(self, row), fields(user_id = %row.user_id, item_id = %row.item_id))]
    async fn insert_cart_row(&self, row: &NewCartRow) -> Result<(), BackendError> {
        let request = self
            .table(Method::POST, CART_TABLE, &[])?
            .header("Prefer", "return=minimal")
            .json(row);
        Self::send_empty(request).await
    }

    #[instrument(skip(self), fields(user_id = %user_id, item_id = %item_id))]
    async fn delete_cart_row(&self, user_id: &UserId, item_id: &FoodId) -> Result<(), BackendError> {
        let user_filter = eq(user_id.as_str());
        let item_filter = eq(item_id.as_str());
        let request = self.table(
            Method::DELETE,
            CART_TABLE,
            &[
                ("user_id", user_filter.as_str()),
                ("food_id", item_filter.as_str()),
            ],
        )?;
        Self::send_empty(request).await
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn delete_all_cart_rows(&self, user_id: &UserId) -> Result<(), BackendError> {
        let filter = eq(user_id.as_str());
        let request = self.table(Method::DELETE, CART_TABLE, &[("user_id", filter.as_str())])?;
        Self::send_empty(request).await
    }
}
