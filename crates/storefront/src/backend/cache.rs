//! Cache types for catalog responses.

use std::sync::Arc;

use takeout_core::{FoodId, RestaurantId};

use super::catalog::{Food, MenuItem, Restaurant};

/// Cache key for catalog reads.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum CacheKey {
    AvailableFood,
    Food(FoodId),
    Restaurants,
    Restaurant(RestaurantId),
    Menu(RestaurantId),
}

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    FoodList(Arc<Vec<Food>>),
    Food(Arc<Food>),
    Restaurants(Arc<Vec<Restaurant>>),
    Restaurant(Arc<Restaurant>),
    Menu(Arc<Vec<MenuItem>>),
}
