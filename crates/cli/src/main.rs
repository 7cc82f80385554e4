//! Takeout CLI - browse restaurants, manage the cart, and place orders.
//!
//! # Usage
//!
//! ```bash
//! # Browse
//! takeout restaurants list
//! takeout restaurants show <restaurant-id>
//! takeout food list --category Pizza --max-price 15
//!
//! # Cart (works signed out; mirrored to the backend when signed in)
//! takeout cart add <food-id>
//! takeout cart add napkins --name Napkins --price 0 --local
//! takeout cart update <food-id> 3
//! takeout cart show
//!
//! # Account
//! takeout auth signup -e ada@example.com -n "Ada Lovelace"
//! takeout auth login -e ada@example.com
//!
//! # Checkout
//! takeout cart address "1 Main St"
//! takeout orders place
//! ```
//!
//! # Commands
//!
//! - `cart` - Local cart and remote mirroring
//! - `auth` - Sign up, sign in, sign out, passwords
//! - `restaurants`, `food` - Catalog browsing
//! - `orders` - Order history and checkout
//! - `profile` - The signed-in user's profile

#![cfg_attr(not(test), forbid(unsafe_code))]
// The terminal is this binary's user interface.
#![allow(clippy::print_stdout, clippy::print_stderr)]

use clap::{Parser, Subcommand};
use takeout_storefront::config::StorefrontConfig;
use takeout_storefront::error::AppError;
use takeout_storefront::telemetry;

mod commands;
mod output;

use commands::Context;

#[derive(Parser)]
#[command(name = "takeout")]
#[command(author, version, about = "Order food from the terminal")]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the shopping cart
    Cart {
        #[command(subcommand)]
        action: commands::cart::CartAction,
    },
    /// Manage your account and sign-in
    Auth {
        #[command(subcommand)]
        action: commands::auth::AuthAction,
    },
    /// Browse restaurants and their menus
    Restaurants {
        #[command(subcommand)]
        action: commands::catalog::RestaurantAction,
    },
    /// Browse food
    Food {
        #[command(subcommand)]
        action: commands::catalog::FoodAction,
    },
    /// View and place orders (requires sign-in)
    Orders {
        #[command(subcommand)]
        action: commands::orders::OrderAction,
    },
    /// View and edit your profile (requires sign-in)
    Profile {
        #[command(subcommand)]
        action: commands::profile::ProfileAction,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match StorefrontConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            let err = AppError::from(e);
            eprintln!("error: {err}");
            std::process::exit(err.exit_code());
        }
    };

    let _telemetry = telemetry::init(&config, cli.verbose);

    let context = Context::new(config);
    if let Err(e) = run(cli.command, &context).await {
        e.report();
        eprintln!("error: {}", e.user_message());
        std::process::exit(e.exit_code());
    }
}

async fn run(command: Commands, context: &Context) -> Result<(), AppError> {
    match command {
        Commands::Cart { action } => commands::cart::run(action, context).await,
        Commands::Auth { action } => commands::auth::run(action, context).await,
        Commands::Restaurants { action } => commands::catalog::run_restaurants(action, context).await,
        Commands::Food { action } => commands::catalog::run_food(action, context).await,
        Commands::Orders { action } => commands::orders::run(action, context).await,
        Commands::Profile { action } => commands::profile::run(action, context).await,
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_cart_update_with_negative_quantity() {
        let cli = Cli::try_parse_from(["takeout", "cart", "update", "p1", "-1"]);
        assert!(cli.is_ok());
    }
}
