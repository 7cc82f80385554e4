//! Order commands. Both require sign-in.

use std::sync::Arc;

use clap::Subcommand;
use takeout_storefront::checkout;
use takeout_storefront::error::{AppError, add_breadcrumb};
use takeout_storefront::sync::RemoteCartQueue;

use super::Context;
use crate::output;

#[derive(Subcommand)]
pub enum OrderAction {
    /// Show your orders, newest first
    List,
    /// Order everything in the cart
    Place,
}

pub async fn run(action: OrderAction, context: &Context) -> Result<(), AppError> {
    let signed_in = context.require_sign_in().await?;
    let user_id = signed_in.session.user_id.clone();

    match action {
        OrderAction::List => {
            let orders = signed_in.client.list_orders(&user_id).await?;
            println!("{}", output::orders(&orders));
        }
        OrderAction::Place => {
            let mut cart = context.cart();
            let backend = Arc::new(signed_in.client);
            let queue =
                RemoteCartQueue::spawn(Arc::clone(&backend), context.config().sync_max_attempts);

            let placed = checkout::place_order(backend.as_ref(), &queue, &mut cart, &user_id).await;
            queue.shutdown().await?;
            let order = placed?;

            add_breadcrumb("checkout", "Order placed", Some(&[("order_id", order.id.as_str())]));
            println!("Order placed.");
            println!("{}", output::order(&order));
        }
    }
    Ok(())
}
