//! Plain-text rendering for command output.
//!
//! Everything here is a pure function of its input so it can be tested
//! without a terminal.

use takeout_storefront::backend::catalog::categories;
use takeout_storefront::backend::{Food, MenuItem, Order, Profile, Restaurant};
use takeout_storefront::cart::CartState;

pub fn cart(state: &CartState) -> String {
    if state.is_empty() {
        let mut out = vec!["Your cart is empty.".to_string()];
        if let Some(address) = state.delivery_address() {
            out.push(format!("Deliver to: {address}"));
        }
        return out.join("\n");
    }

    let mut out: Vec<String> = state
        .lines()
        .iter()
        .map(|line| {
            format!(
                "{:>4} x {:<28} {:>10} {:>10}  [{}]",
                line.quantity().to_string(),
                line.name(),
                line.unit_price().to_string(),
                line.subtotal().to_string(),
                line.item_id()
            )
        })
        .collect();
    out.push(format!(
        "{} item(s), total {}",
        state.item_count(),
        state.total()
    ));
    out.push(format!(
        "Deliver to: {}",
        state.delivery_address().unwrap_or("(not set)")
    ));
    out.join("\n")
}

pub fn food_list(foods: &[&Food]) -> String {
    if foods.is_empty() {
        return "No food matches.".to_string();
    }
    foods
        .iter()
        .map(|food| {
            format!(
                "{:<28} {:>10}  {:<14} [{}]",
                food.name,
                food.price.to_string(),
                food.category.as_deref().unwrap_or("-"),
                food.id
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn restaurants(restaurants: &[Restaurant]) -> String {
    if restaurants.is_empty() {
        return "No restaurants are open.".to_string();
    }
    restaurants
        .iter()
        .map(|restaurant| {
            let rating = restaurant
                .rating
                .map_or_else(|| "-".to_string(), |rating| format!("{rating:.1}"));
            format!(
                "{:<28} {:>4}  {:<14} [{}]",
                restaurant.name,
                rating,
                restaurant.cuisine_type.as_deref().unwrap_or("-"),
                restaurant.id
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// A restaurant header followed by its menu, grouped by category.
///
/// Uncategorized items come last.
pub fn menu(restaurant: &Restaurant, items: &[MenuItem]) -> String {
    let mut out = vec![restaurant.name.clone()];
    if let Some(address) = &restaurant.address {
        out.push(address.clone());
    }
    if let Some(description) = &restaurant.description {
        out.push(description.clone());
    }

    if items.is_empty() {
        out.push(String::new());
        out.push("No menu items available.".to_string());
        return out.join("\n");
    }

    let mut groups: Vec<(&str, Vec<&MenuItem>)> =
        categories(items.iter().map(|item| item.category.as_deref()))
            .into_iter()
            .map(|category| {
                let members = items
                    .iter()
                    .filter(|item| item.category.as_deref() == Some(category))
                    .collect();
                (category, members)
            })
            .collect();
    let uncategorized: Vec<&MenuItem> = items.iter().filter(|item| item.category.is_none()).collect();
    if !uncategorized.is_empty() {
        groups.push(("Other", uncategorized));
    }

    for (category, members) in groups {
        out.push(String::new());
        out.push(format!("{category}:"));
        for item in members {
            out.push(format!("  {:<26} {:>10}  [{}]", item.name, item.price.to_string(), item.id));
        }
    }
    out.join("\n")
}

pub fn orders(orders: &[Order]) -> String {
    if orders.is_empty() {
        return "No orders yet.".to_string();
    }
    orders
        .iter()
        .map(order)
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn order(order: &Order) -> String {
    let mut out = vec![format!(
        "Order {} - {} - {} - {}",
        order.id,
        order.created_at.format("%Y-%m-%d %H:%M"),
        order.status,
        order.total_amount
    )];
    if let Some(name) = &order.restaurant_name {
        out.push(format!("  From: {name}"));
    }
    if let Some(address) = &order.delivery_address {
        out.push(format!("  To: {address}"));
    }
    for item in &order.items {
        out.push(format!(
            "  {:>4} x {:<26} {:>10}",
            item.quantity.to_string(),
            item.display_name(),
            item.subtotal()
                .map_or_else(|| "-".to_string(), |subtotal| subtotal.to_string())
        ));
    }
    out.join("\n")
}

pub fn profile(profile: &Profile) -> String {
    let field = |value: Option<&str>| value.unwrap_or("(not set)").to_string();
    [
        format!("Name:    {}", field(profile.full_name.as_deref())),
        format!(
            "Email:   {}",
            field(profile.email.as_ref().map(takeout_core::Email::as_str))
        ),
        format!("Phone:   {}", field(profile.phone.as_deref())),
        format!("Address: {}", field(profile.address.as_deref())),
    ]
    .join("\n")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::dec;
    use takeout_core::{FoodId, MenuItemId, OrderId, OrderStatus, Price, Quantity, RestaurantId, UserId};
    use takeout_storefront::backend::OrderItem;
    use takeout_storefront::cart::{CartStore, MemorySnapshotStore};

    use super::*;

    fn restaurant() -> Restaurant {
        Restaurant {
            id: RestaurantId::parse("r1").unwrap(),
            name: "Luigi's".to_string(),
            description: None,
            address: Some("2 Elm St".to_string()),
            cuisine_type: Some("Italian".to_string()),
            rating: Some(4.55),
            image_url: None,
        }
    }

    fn menu_item(id: &str, name: &str, category: Option<&str>) -> MenuItem {
        MenuItem {
            id: MenuItemId::parse(id).unwrap(),
            restaurant_id: RestaurantId::parse("r1").unwrap(),
            name: name.to_string(),
            description: None,
            price: Price::new(dec!(9.5)).unwrap(),
            category: category.map(str::to_string),
            is_available: true,
        }
    }

    #[test]
    fn test_cart_shows_lines_and_total() {
        let mut cart = CartStore::open(MemorySnapshotStore::new());
        cart.add_item("p1", "Pizza", dec!(10)).unwrap();
        cart.add_item("p1", "Pizza", dec!(10)).unwrap();
        cart.set_delivery_address(Some("1 Main St"));

        let text = super::cart(cart.state());
        assert!(text.contains("Pizza"));
        assert!(text.contains("$20.00"));
        assert!(text.contains("2 item(s), total $20.00"));
        assert!(text.contains("Deliver to: 1 Main St"));
    }

    #[test]
    fn test_empty_cart() {
        let cart = CartStore::open(MemorySnapshotStore::new());
        assert_eq!(super::cart(cart.state()), "Your cart is empty.");
    }

    #[test]
    fn test_menu_groups_by_category_with_other_last() {
        let items = vec![
            menu_item("m1", "Margherita", Some("Pizza")),
            menu_item("m2", "Bread", None),
            menu_item("m3", "Tiramisu", Some("Dessert")),
            menu_item("m4", "Diavola", Some("Pizza")),
        ];
        let text = menu(&restaurant(), &items);

        let pizza = text.find("Pizza:").unwrap();
        let dessert = text.find("Dessert:").unwrap();
        let other = text.find("Other:").unwrap();
        assert!(pizza < dessert && dessert < other);
        assert!(text.find("Diavola").unwrap() < dessert);
    }

    #[test]
    fn test_restaurant_rating_is_rounded() {
        let text = restaurants(&[restaurant()]);
        assert!(text.contains("4.5") || text.contains("4.6"));
        assert!(text.contains("Italian"));
    }

    #[test]
    fn test_order_lists_items() {
        let order = Order {
            id: OrderId::parse("o1").unwrap(),
            user_id: UserId::parse("u1").unwrap(),
            restaurant_id: None,
            restaurant_name: Some("Luigi's".to_string()),
            status: OrderStatus::Delivered,
            total_amount: Price::new(dec!(21)).unwrap(),
            delivery_address: Some("1 Main St".to_string()),
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 18, 30, 0).unwrap(),
            items: vec![OrderItem {
                item_id: Some(FoodId::parse("p1").unwrap()),
                name: None,
                quantity: Quantity::try_from(2_i64).unwrap(),
                unit_price: Price::new(dec!(10.5)).unwrap(),
            }],
        };

        let text = super::order(&order);
        assert!(text.starts_with("Order o1 - 2026-03-01 18:30"));
        assert!(text.contains("From: Luigi's"));
        assert!(text.contains("p1"));
        assert!(text.contains("$21.00"));
    }

    #[test]
    fn test_no_orders() {
        assert_eq!(orders(&[]), "No orders yet.");
    }
}
