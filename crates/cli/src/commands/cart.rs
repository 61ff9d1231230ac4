//! Cart commands.
//!
//! # Usage
//!
//! ```bash
//! mkt cart show
//! mkt cart add prod_123 -q 2 --name "Kente Scarf" --price 120 --vendor "Adinkra Crafts"
//! mkt cart update prod_123 3
//! mkt cart remove prod_123
//! mkt cart clear
//! ```
//!
//! Whichever cart is active for the stored session is used: the local guest
//! cart when signed out, the account cart otherwise.

use clap::Subcommand;
use marketplace_core::ProductId;
use marketplace_storefront::{ProductSnapshot, Storefront};
use rust_decimal::Decimal;

use super::{CliError, print_cart};

#[derive(Subcommand)]
pub enum CartAction {
    /// Show the active cart
    Show,
    /// Add a product
    Add {
        /// Product ID
        product_id: String,

        /// How many to add
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,

        /// Product name (kept with the guest cart for display)
        #[arg(long, requires = "price")]
        name: Option<String>,

        /// Unit price in cedis
        #[arg(long, requires = "name")]
        price: Option<Decimal>,

        /// Product image URL
        #[arg(long)]
        image: Option<String>,

        /// Vendor name
        #[arg(long)]
        vendor: Option<String>,
    },
    /// Set the quantity of a line
    Update {
        /// Product ID
        product_id: String,

        /// New quantity (at least 1; use `remove` to drop the line)
        #[arg(allow_hyphen_values = true)]
        quantity: i64,
    },
    /// Remove a line
    Remove {
        /// Product ID
        product_id: String,
    },
    /// Empty the cart
    Clear,
}

pub async fn run(storefront: &Storefront, action: CartAction) -> Result<(), CliError> {
    let cart = storefront.cart();

    let contents = match action {
        CartAction::Show => cart.refresh_cart().await?,
        CartAction::Add {
            product_id,
            quantity,
            name,
            price,
            image,
            vendor,
        } => {
            let product_id = ProductId::new(product_id);
            let snapshot = name.zip(price).map(|(name, price)| ProductSnapshot {
                id: product_id.clone(),
                name,
                price,
                image_url: image.unwrap_or_default(),
                vendor_name: vendor,
            });
            cart.add_to_cart(&product_id, quantity, snapshot).await?
        }
        CartAction::Update {
            product_id,
            quantity,
        } => {
            cart.update_quantity(&ProductId::new(product_id), quantity)
                .await?
        }
        CartAction::Remove { product_id } => {
            cart.remove_from_cart(&ProductId::new(product_id)).await?
        }
        CartAction::Clear => cart.clear_cart().await?,
    };

    tracing::debug!(
        authenticated = cart.is_authenticated(),
        lines = contents.item_count(),
        "Cart command complete"
    );
    print_cart(&contents);
    Ok(())
}
