//! Session commands.
//!
//! # Usage
//!
//! ```bash
//! mkt auth login -e ama@example.com           # password from MARKETPLACE_PASSWORD
//! mkt auth register -e kofi@example.com --first-name Kofi -p secret
//! mkt auth whoami
//! mkt auth check /vendor/products
//! mkt auth logout
//! ```
//!
//! # Environment Variables
//!
//! - `MARKETPLACE_PASSWORD` - Password used when `-p` is not given

use clap::Subcommand;
use marketplace_storefront::auth::route_access;
use marketplace_storefront::{AuthStatus, AuthUser, MergeOutcome, Storefront};
use secrecy::SecretString;

use super::{CliError, print_cart};

#[derive(Subcommand)]
pub enum AuthAction {
    /// Sign in and merge the guest cart into the account cart
    Login {
        /// Account email
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(short, long, env = "MARKETPLACE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Create an account and sign in
    Register {
        /// Account email
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(short, long, env = "MARKETPLACE_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        #[arg(long)]
        first_name: Option<String>,

        #[arg(long)]
        last_name: Option<String>,
    },
    /// Sign out; the account cart stays on the server
    Logout,
    /// Show who is signed in
    Whoami,
    /// Check whether a client route may be visited
    Check {
        /// Route path, e.g. `/vendor/products`
        path: String,
    },
}

#[allow(clippy::print_stdout)]
pub async fn run(storefront: &Storefront, action: AuthAction) -> Result<(), CliError> {
    let session = storefront.session();

    match action {
        AuthAction::Login { email, password } => {
            let password = require_password(password)?;
            let user = storefront.api().login(&email, &password).await?;
            signed_in(storefront, &user).await?;
        }
        AuthAction::Register {
            email,
            password,
            first_name,
            last_name,
        } => {
            let password = require_password(password)?;
            let user = storefront
                .api()
                .register(&email, &password, first_name.as_deref(), last_name.as_deref())
                .await?;
            signed_in(storefront, &user).await?;
        }
        AuthAction::Logout => {
            session.logout();
            storefront.cart().observe_auth(&AuthStatus::Anonymous).await;
            println!("Signed out");
        }
        AuthAction::Whoami => match session.current_user() {
            Some(user) => println!("{} ({})", describe(&user), user.role),
            None => println!("Not signed in"),
        },
        AuthAction::Check { path } => {
            let access = route_access(&path, &session.status());
            match access.redirect_target() {
                None => println!("{path}: allowed"),
                Some(target) => println!("{path}: redirect to {target}"),
            }
        }
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
async fn signed_in(storefront: &Storefront, user: &AuthUser) -> Result<(), CliError> {
    println!("Signed in as {}", describe(user));

    let cart = storefront.cart();
    match cart.observe_auth(&storefront.session().status()).await {
        MergeOutcome::Merged(lines) => println!("Merged {lines} guest cart line(s) into your cart"),
        MergeOutcome::Failed => tracing::warn!("Guest cart was not merged"),
        MergeOutcome::NotAttempted => {}
    }

    print_cart(&cart.contents());
    Ok(())
}

fn describe(user: &AuthUser) -> String {
    user.email
        .clone()
        .unwrap_or_else(|| user.id.to_string())
}

fn require_password(password: Option<String>) -> Result<SecretString, CliError> {
    password
        .filter(|p| !p.is_empty())
        .map(SecretString::from)
        .ok_or_else(|| CliError::Usage("password required (-p or MARKETPLACE_PASSWORD)".to_string()))
}
