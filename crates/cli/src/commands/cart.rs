//! Cart commands.
//!
//! # Usage
//!
//! ```bash
//! takeout cart add <food-id>
//! takeout cart add napkins --name Napkins --price 0 --local
//! takeout cart update <food-id> 3
//! takeout cart remove <food-id>
//! takeout cart address "1 Main St"
//! takeout cart address --from-profile
//! takeout cart sync
//! ```
//!
//! The cart lives on disk and works signed out. When signed in, every
//! change is also written to the backend, in order, before the command
//! exits.

use std::sync::Arc;

use clap::Subcommand;
use rust_decimal::Decimal;
use takeout_core::{FoodId, UserId};
use takeout_storefront::cart::{CartStore, SnapshotStore};
use takeout_storefront::error::{AppError, add_breadcrumb};
use takeout_storefront::sync::{RemoteCartOp, RemoteCartQueue};

use super::Context;
use crate::output;

#[derive(Subcommand)]
pub enum CartAction {
    /// Add one unit of an item
    Add {
        /// Food ID
        item_id: String,
        /// Display name; skips the catalog lookup
        #[arg(long, requires = "price")]
        name: Option<String>,
        /// Unit price; skips the catalog lookup
        #[arg(long, requires = "name")]
        price: Option<Decimal>,
        /// Keep the change on this machine only
        #[arg(long)]
        local: bool,
    },
    /// Remove an item entirely
    Remove {
        /// Food ID
        item_id: String,
    },
    /// Set an item's quantity
    Update {
        /// Food ID
        item_id: String,
        /// New quantity (at least 1)
        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },
    /// Empty the cart and forget the delivery address
    Clear,
    /// Show the cart
    Show,
    /// Print the cart total
    Total,
    /// Set the delivery address
    Address {
        /// Delivery address
        #[arg(conflicts_with_all = ["clear", "from_profile"])]
        address: Option<String>,
        /// Forget the delivery address
        #[arg(long)]
        clear: bool,
        /// Use the address saved in your profile
        #[arg(long)]
        from_profile: bool,
    },
    /// Replace the local cart with the copy stored on the backend
    Sync,
}

/// A local change and the remote write that mirrors it.
#[derive(Debug, PartialEq, Eq)]
enum Change {
    Add { item_id: String, local: bool },
    Remove(String),
    Update(String),
    Clear,
}

pub async fn run(action: CartAction, context: &Context) -> Result<(), AppError> {
    let mut cart = context.cart();

    let change = match action {
        CartAction::Show => {
            println!("{}", output::cart(cart.state()));
            return Ok(());
        }
        CartAction::Total => {
            println!("{}", cart.get_total());
            return Ok(());
        }
        CartAction::Sync => return sync(context, &mut cart).await,
        CartAction::Address {
            address,
            clear,
            from_profile,
        } => return set_address(context, &mut cart, address, clear, from_profile).await,
        CartAction::Add {
            item_id,
            name,
            price,
            local,
        } => {
            let (name, price) = match (name, price) {
                (Some(name), Some(price)) => (name, price),
                _ => catalog_entry(context, &item_id).await?,
            };
            cart.add_item(&item_id, &name, price)?;
            Change::Add { item_id, local }
        }
        CartAction::Remove { item_id } => {
            cart.remove_item(&item_id)?;
            Change::Remove(item_id)
        }
        CartAction::Update { item_id, quantity } => {
            cart.update_quantity(&item_id, quantity)?;
            Change::Update(item_id)
        }
        CartAction::Clear => {
            cart.clear_cart();
            Change::Clear
        }
    };

    add_breadcrumb("cart", "Cart changed", None);
    println!("{}", output::cart(cart.state()));

    if matches!(change, Change::Add { local: true, .. }) {
        return Ok(());
    }
    let Some(signed_in) = context.sign_in_if_available().await? else {
        return Ok(());
    };
    let user_id = signed_in.session.user_id.clone();
    let Some(op) = remote_op(&change, &cart, &user_id)? else {
        return Ok(());
    };

    let queue = RemoteCartQueue::spawn(
        Arc::new(signed_in.client),
        context.config().sync_max_attempts,
    );
    queue.submit(op)?;
    let report = queue.shutdown().await?;
    for failure in &report.failures {
        eprintln!("warning: backend cart not updated: {}", failure.error);
    }
    Ok(())
}

/// Name and price of a catalog item, refusing items that cannot be ordered.
async fn catalog_entry(context: &Context, item_id: &str) -> Result<(String, Decimal), AppError> {
    let food = context.client()?.get_food(&parse_item(item_id)?).await?;
    if !food.is_available {
        return Err(AppError::BadRequest(format!(
            "{} is not available right now",
            food.name
        )));
    }
    Ok((food.name.clone(), food.price.amount()))
}

/// The remote write for a change already applied to `cart`.
fn remote_op<S: SnapshotStore>(
    change: &Change,
    cart: &CartStore<S>,
    user_id: &UserId,
) -> Result<Option<RemoteCartOp>, AppError> {
    let user_id = user_id.clone();
    let op = match change {
        Change::Add { item_id, .. } => {
            let item_id = parse_item(item_id)?;
            cart.state()
                .line(&item_id)
                .map(|line| RemoteCartOp::AddOne {
                    user_id,
                    unit_price: line.unit_price(),
                    item_id,
                })
        }
        Change::Update(item_id) => {
            let item_id = parse_item(item_id)?;
            cart.state()
                .line(&item_id)
                .map(|line| RemoteCartOp::SetQuantity {
                    user_id,
                    unit_price: line.unit_price(),
                    quantity: line.quantity(),
                    item_id,
                })
        }
        Change::Remove(item_id) => Some(RemoteCartOp::Remove {
            user_id,
            item_id: parse_item(item_id)?,
        }),
        Change::Clear => Some(RemoteCartOp::Clear { user_id }),
    };
    Ok(op)
}

fn parse_item(item_id: &str) -> Result<FoodId, AppError> {
    FoodId::parse(item_id).map_err(|e| AppError::BadRequest(e.to_string()))
}

async fn sync<S: SnapshotStore>(context: &Context, cart: &mut CartStore<S>) -> Result<(), AppError> {
    let signed_in = context.require_sign_in().await?;
    let user_id = signed_in.session.user_id.clone();
    let queue = RemoteCartQueue::spawn(
        Arc::new(signed_in.client),
        context.config().sync_max_attempts,
    );
    let reconciled = queue.reconcile(cart, &user_id).await;
    queue.shutdown().await?;
    reconciled?;

    println!("{}", output::cart(cart.state()));
    Ok(())
}

async fn set_address<S: SnapshotStore>(
    context: &Context,
    cart: &mut CartStore<S>,
    address: Option<String>,
    clear: bool,
    from_profile: bool,
) -> Result<(), AppError> {
    let address = if clear {
        None
    } else if from_profile {
        let signed_in = context.require_sign_in().await?;
        let profile = signed_in
            .client
            .get_profile(&signed_in.session.user_id)
            .await?;
        Some(profile.address.ok_or_else(|| {
            AppError::BadRequest("your profile has no address".to_string())
        })?)
    } else {
        Some(address.ok_or_else(|| {
            AppError::BadRequest("give an address, --from-profile, or --clear".to_string())
        })?)
    };

    cart.set_delivery_address(address.as_deref());
    match cart.state().delivery_address() {
        Some(address) => println!("Deliver to: {address}"),
        None => println!("Delivery address cleared."),
    }
    Ok(())
}
