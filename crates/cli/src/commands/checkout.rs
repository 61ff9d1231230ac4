//! Checkout commands.
//!
//! # Usage
//!
//! ```bash
//! mkt checkout summary
//! mkt checkout start --first-name Ama --last-name Mensah --phone 0201234567 --address "Osu, Accra"
//! mkt checkout verify ref_123
//! mkt checkout verify "https://shop.example.com/payment-success?trxref=ref_123"
//! ```

use clap::Subcommand;
use marketplace_storefront::Storefront;
use marketplace_storefront::checkout::{CustomerDetails, payment_reference};
use marketplace_storefront::presentation::TotalsView;
use url::Url;

use super::{CliError, print_cart};

#[derive(Subcommand)]
pub enum CheckoutAction {
    /// Show the order totals for the active cart
    Summary,
    /// Initialize a payment and print the gateway URL
    Start {
        /// Receipt email (defaults to the signed-in user's)
        #[arg(short, long)]
        email: Option<String>,

        #[arg(long)]
        first_name: String,

        #[arg(long)]
        last_name: String,

        #[arg(long)]
        phone: String,

        /// Shipping address
        #[arg(long)]
        address: String,
    },
    /// Verify a payment by reference or gateway callback URL
    Verify {
        /// Transaction reference, or the full callback URL
        reference: String,
    },
}

#[allow(clippy::print_stdout)]
pub async fn run(storefront: &Storefront, action: CheckoutAction) -> Result<(), CliError> {
    let cart = storefront.cart();
    let checkout = storefront.checkout();

    match action {
        CheckoutAction::Summary => {
            let contents = cart.refresh_cart().await?;
            print_cart(&contents);
        }
        CheckoutAction::Start {
            email,
            first_name,
            last_name,
            phone,
            address,
        } => {
            let customer = CustomerDetails {
                email,
                first_name,
                last_name,
                phone,
                address,
            };
            let payment = checkout.start(cart, &customer).await?;
            let totals = TotalsView::from(payment.summary);

            println!("Order {}: {} total", payment.order_id, totals.total);
            println!("Complete payment at: {}", payment.authorization_url);
            if let Some(reference) = &payment.reference {
                println!("Reference: {reference}");
            }
        }
        CheckoutAction::Verify { reference } => {
            let reference = resolve_reference(&reference)?;
            let status = checkout.complete(cart, &reference).await?;
            println!("Payment {reference}: {status:?}");
        }
    }
    Ok(())
}

/// Accept either a bare reference or the URL the gateway redirected to.
fn resolve_reference(input: &str) -> Result<String, CliError> {
    match Url::parse(input) {
        Ok(url) => payment_reference(&url)
            .ok_or_else(|| CliError::Usage(format!("no payment reference in {input}"))),
        Err(_) if !input.trim().is_empty() => Ok(input.trim().to_string()),
        Err(_) => Err(CliError::Usage("payment reference required".to_string())),
    }
}
