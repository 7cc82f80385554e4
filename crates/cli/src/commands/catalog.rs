//! Catalog browsing commands.
//!
//! These work signed out.

use clap::Subcommand;
use rust_decimal::Decimal;
use takeout_core::{Price, RestaurantId};
use takeout_storefront::backend::FoodFilter;
use takeout_storefront::error::AppError;

use super::Context;
use crate::output;

#[derive(Subcommand)]
pub enum RestaurantAction {
    /// List open restaurants, best rated first
    List,
    /// Show a restaurant and its menu
    Show {
        /// Restaurant ID
        restaurant_id: String,
    },
}

#[derive(Subcommand)]
pub enum FoodAction {
    /// List food available to order
    List {
        /// Match against name and description
        #[arg(short, long)]
        search: Option<String>,
        /// Exact category
        #[arg(short, long)]
        category: Option<String>,
        /// Lowest price to show
        #[arg(long)]
        min_price: Option<Decimal>,
        /// Highest price to show
        #[arg(long)]
        max_price: Option<Decimal>,
    },
    /// List food categories
    Categories,
}

pub async fn run_restaurants(action: RestaurantAction, context: &Context) -> Result<(), AppError> {
    let client = context.client()?;
    match action {
        RestaurantAction::List => {
            let restaurants = client.list_restaurants().await?;
            println!("{}", output::restaurants(&restaurants));
        }
        RestaurantAction::Show { restaurant_id } => {
            let id = RestaurantId::parse(&restaurant_id)
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            let (restaurant, menu) =
                tokio::try_join!(client.get_restaurant(&id), client.list_menu_items(&id))?;
            println!("{}", output::menu(&restaurant, &menu));
        }
    }
    Ok(())
}

pub async fn run_food(action: FoodAction, context: &Context) -> Result<(), AppError> {
    let client = context.client()?;
    let foods = client.list_available_food().await?;
    match action {
        FoodAction::List {
            search,
            category,
            min_price,
            max_price,
        } => {
            let filter = FoodFilter {
                search,
                category,
                min_price: min_price.map(price).transpose()?,
                max_price: max_price.map(price).transpose()?,
            };
            println!("{}", output::food_list(&filter.apply(&foods)));
        }
        FoodAction::Categories => {
            let categories = takeout_storefront::backend::catalog::categories(
                foods.iter().map(|food| food.category.as_deref()),
            );
            for category in categories {
                println!("{category}");
            }
        }
    }
    Ok(())
}

fn price(amount: Decimal) -> Result<Price, AppError> {
    Price::new(amount).map_err(|e| AppError::BadRequest(e.to_string()))
}
