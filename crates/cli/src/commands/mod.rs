//! Subcommand implementations.
//!
//! Commands write their results to stdout; diagnostics go through tracing to
//! stderr.

#![allow(clippy::print_stdout)]

pub mod auth;
pub mod cart;
pub mod checkout;

use marketplace_storefront::api::ApiError;
use marketplace_storefront::checkout::CheckoutError;
use marketplace_storefront::notify::{Notice, NoticeLevel};
use marketplace_storefront::presentation::{CartBadge, CartDrawerView, CartToastView};
use marketplace_storefront::state::StateError;
use marketplace_storefront::{CartContents, CartError};
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors surfaced by any command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    /// Bad command-line input that clap could not catch.
    #[error("{0}")]
    Usage(String),
}

/// Print the cart the way the drawer shows it.
pub fn print_cart(contents: &CartContents) {
    let drawer = CartDrawerView::from_contents(contents);
    let badge = CartBadge::from_contents(contents);

    println!("{} [{}]", drawer.heading, badge.label.as_deref().unwrap_or("empty"));
    for line in &drawer.lines {
        let vendor = line
            .vendor_name
            .as_deref()
            .map(|v| format!(" (by {v})"))
            .unwrap_or_default();
        println!(
            "  {:>3} x {}{}  {} @ {}  [{}]",
            line.quantity, line.name, vendor, line.line_price, line.unit_price, line.product_id
        );
    }
    if drawer.is_empty {
        return;
    }
    println!("  Subtotal: {}", drawer.totals.subtotal);
    println!("  Shipping: {}", drawer.totals.shipping);
    println!("  Total:    {}", drawer.totals.total);
    if let Some(hint) = &drawer.totals.free_shipping_hint {
        println!("  {hint}");
    }
}

/// Drain and print whatever the storefront announced while a command ran.
pub fn print_notices(mut notices: broadcast::Receiver<Notice>) {
    while let Ok(notice) = notices.try_recv() {
        match notice {
            Notice::CartAdded(toast) => {
                let view = CartToastView::from(&toast);
                let vendor = view.vendor_line.map(|v| format!(" {v}")).unwrap_or_default();
                println!("{}: {}{} ({})", view.title, view.product_name, vendor, view.quantity_line);
            }
            Notice::Message { level, text } => match level {
                NoticeLevel::Error => println!("! {text}"),
                NoticeLevel::Success | NoticeLevel::Info => println!("{text}"),
            },
        }
    }
}
