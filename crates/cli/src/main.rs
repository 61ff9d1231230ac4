//! Marketplace CLI - drive the storefront cart, session and checkout.
//!
//! # Usage
//!
//! ```bash
//! # Add to the guest cart (persisted under MARKETPLACE_STATE_DIR)
//! mkt cart add prod_123 -q 2 --name "Kente Scarf" --price 120
//!
//! # Sign in; the guest cart is merged into the account cart
//! mkt auth login -e ama@example.com
//!
//! # Pay for the cart
//! mkt checkout start --first-name Ama --last-name Mensah --phone 0201234567 --address "Osu, Accra"
//! mkt checkout verify "https://shop.example.com/payment-success?reference=ref_123"
//! ```
//!
//! # Commands
//!
//! - `cart` - Show and edit the active cart
//! - `auth` - Sign in, register, sign out, inspect the session
//! - `checkout` - Start and verify payments

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use marketplace_storefront::{Storefront, StorefrontConfig};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "mkt")]
#[command(author, version, about = "Marketplace storefront CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show and edit the active cart
    Cart {
        #[command(subcommand)]
        action: commands::cart::CartAction,
    },
    /// Manage the signed-in session
    Auth {
        #[command(subcommand)]
        action: commands::auth::AuthAction,
    },
    /// Pay for the cart
    Checkout {
        #[command(subcommand)]
        action: commands::checkout::CheckoutAction,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match StorefrontConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing_subscriber::fmt::init();
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "marketplace_storefront=info,marketplace_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let result = run(cli, config).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: StorefrontConfig) -> Result<(), commands::CliError> {
    let storefront = Storefront::new(config)?;
    let notices = storefront.notifications().subscribe();

    let result = match cli.command {
        Commands::Cart { action } => commands::cart::run(&storefront, action).await,
        Commands::Auth { action } => commands::auth::run(&storefront, action).await,
        Commands::Checkout { action } => commands::checkout::run(&storefront, action).await,
    };

    commands::print_notices(notices);
    result
}
