//! Catalog reads: food, restaurants, and menu items.
//!
//! Every read here is cached (see [`BackendClient::new`]); the catalog is
//! shared by all users, so the anon key is enough to read it.

use std::sync::Arc;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use takeout_core::{FoodId, MenuItemId, Price, RestaurantId};
use tracing::{debug, instrument};

use super::cache::{CacheKey, CacheValue};
use super::{BackendClient, BackendError, eq, single};

/// A purchasable food item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Food {
    pub id: FoodId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Price,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "available")]
    pub is_available: bool,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// A restaurant listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Restaurant {
    pub id: RestaurantId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default, alias = "cuisine")]
    pub cuisine_type: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// One entry on a restaurant's menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: MenuItemId,
    pub restaurant_id: RestaurantId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Price,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "available")]
    pub is_available: bool,
}

const fn available() -> bool {
    true
}

/// Client-side narrowing of a food listing.
///
/// All criteria are optional; an empty filter keeps everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FoodFilter {
    /// Case-insensitive substring of the name or description.
    pub search: Option<String>,
    /// Exact category match.
    pub category: Option<String>,
    pub min_price: Option<Price>,
    pub max_price: Option<Price>,
}

impl FoodFilter {
    #[must_use]
    pub fn matches(&self, food: &Food) -> bool {
        let search_ok = self.search.as_deref().is_none_or(|query| {
            let query = query.to_lowercase();
            food.name.to_lowercase().contains(&query)
                || food
                    .description
                    .as_deref()
                    .is_some_and(|d| d.to_lowercase().contains(&query))
        });
        let category_ok = self
            .category
            .as_deref()
            .is_none_or(|category| food.category.as_deref() == Some(category));
        let min_ok = self.min_price.is_none_or(|min| food.price >= min);
        let max_ok = self.max_price.is_none_or(|max| food.price <= max);

        search_ok && category_ok && min_ok && max_ok
    }

    /// Keep the matching items, preserving order.
    #[must_use]
    pub fn apply<'a>(&self, foods: &'a [Food]) -> Vec<&'a Food> {
        foods.iter().filter(|food| self.matches(food)).collect()
    }
}

/// Distinct categories in first-seen order.
#[must_use]
pub fn categories<'a, I>(categories: I) -> Vec<&'a str>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut seen: Vec<&str> = Vec::new();
    for category in categories.into_iter().flatten() {
        if !seen.contains(&category) {
            seen.push(category);
        }
    }
    seen
}

impl BackendClient {
    /// All food currently available for order.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self))]
    pub async fn list_available_food(&self) -> Result<Arc<Vec<Food>>, BackendError> {
        if let Some(CacheValue::FoodList(foods)) =
            self.inner.cache.get(&CacheKey::AvailableFood).await
        {
            debug!("Cache hit for food list");
            return Ok(foods);
        }

        let request = self.table(
            Method::GET,
            "food",
            &[("select", "*"), ("is_available", "eq.true"), ("order", "name.asc")],
        )?;
        let foods: Arc<Vec<Food>> = Arc::new(Self::send_json(request).await?);

        self.inner
            .cache
            .insert(CacheKey::AvailableFood, CacheValue::FoodList(Arc::clone(&foods)))
            .await;
        Ok(foods)
    }

    /// One food item by ID, available or not.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotFound`] if no such item exists.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn get_food(&self, id: &FoodId) -> Result<Arc<Food>, BackendError> {
        let key = CacheKey::Food(id.clone());
        if let Some(CacheValue::Food(food)) = self.inner.cache.get(&key).await {
            debug!("Cache hit for food");
            return Ok(food);
        }

        let filter = eq(id.as_str());
        let request = self.table(
            Method::GET,
            "food",
            &[("select", "*"), ("id", filter.as_str()), ("limit", "1")],
        )?;
        let rows: Vec<Food> = Self::send_json(request).await?;
        let food = Arc::new(single(rows, || format!("food {id}"))?);

        self.inner
            .cache
            .insert(key, CacheValue::Food(Arc::clone(&food)))
            .await;
        Ok(food)
    }

    /// Active restaurants, best rated first.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self))]
    pub async fn list_restaurants(&self) -> Result<Arc<Vec<Restaurant>>, BackendError> {
        if let Some(CacheValue::Restaurants(restaurants)) =
            self.inner.cache.get(&CacheKey::Restaurants).await
        {
            debug!("Cache hit for restaurants");
            return Ok(restaurants);
        }

        let request = self.table(
            Method::GET,
            "restaurants",
            &[
                ("select", "*"),
                ("is_active", "eq.true"),
                ("order", "rating.desc.nullslast"),
            ],
        )?;
        let restaurants: Arc<Vec<Restaurant>> = Arc::new(Self::send_json(request).await?);

        self.inner
            .cache
            .insert(
                CacheKey::Restaurants,
                CacheValue::Restaurants(Arc::clone(&restaurants)),
            )
            .await;
        Ok(restaurants)
    }

    /// One restaurant by ID.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotFound`] if no such restaurant exists.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn get_restaurant(&self, id: &RestaurantId) -> Result<Arc<Restaurant>, BackendError> {
        let key = CacheKey::Restaurant(id.clone());
        if let Some(CacheValue::Restaurant(restaurant)) = self.inner.cache.get(&key).await {
            debug!("Cache hit for restaurant");
            return Ok(restaurant);
        }

        let filter = eq(id.as_str());
        let request = self.table(
            Method::GET,
            "restaurants",
            &[("select", "*"), ("id", filter.as_str()), ("limit", "1")],
        )?;
        let rows: Vec<Restaurant> = Self::send_json(request).await?;
        let restaurant = Arc::new(single(rows, || format!("restaurant {id}"))?);

        self.inner
            .cache
            .insert(key, CacheValue::Restaurant(Arc::clone(&restaurant)))
            .await;
        Ok(restaurant)
    }

    /// Available menu items for a restaurant, grouped by category.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self), fields(restaurant_id = %restaurant_id))]
    pub async fn list_menu_items(
        &self,
        restaurant_id: &RestaurantId,
    ) -> Result<Arc<Vec<MenuItem>>, BackendError> {
        let key = CacheKey::Menu(restaurant_id.clone());
        if let Some(CacheValue::Menu(items)) = self.inner.cache.get(&key).await {
            debug!("Cache hit for menu");
            return Ok(items);
        }

        let filter = eq(restaurant_id.as_str());
        let request = self.table(
            Method::GET,
            "menu_items",
            &[
                ("select", "*"),
                ("restaurant_id", filter.as_str()),
                ("is_available", "eq.true"),
                ("order", "category.asc,name.asc"),
            ],
        )?;
        let items: Arc<Vec<MenuItem>> = Arc::new(Self::send_json(request).await?);

        self.inner
            .cache
            .insert(key, CacheValue::Menu(Arc::clone(&items)))
            .await;
        Ok(items)
    }

    /// Drop every cached catalog read.
    pub fn invalidate_catalog(&self) {
        self.inner.cache.invalidate_all();
    }
}
