//! Checkout and payment boundary.
//!
//! Cart totals are kept in the major currency unit everywhere else; this is
//! the one place they are converted to the gateway's minor unit.

use marketplace_core::{CurrencyCode, Email, EmailError, OrderId, PaymentStatus, Price};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::instrument;
use url::Url;

use crate::api::{
    ApiClient, ApiError, CartService, PaymentInitRequest, PaymentLineItem, PaymentMetadata,
};
use crate::cart::{CartContents, UnifiedCart};
use crate::error::add_breadcrumb;
use crate::notify::Notifications;

/// Subtotals strictly above this ship free.
pub const FREE_SHIPPING_THRESHOLD: Decimal = Decimal::from_parts(500, 0, 0, false, 0);

/// Shipping charged below the threshold.
pub const FLAT_SHIPPING_RATE: Decimal = Decimal::from_parts(50, 0, 0, false, 0);

const INIT_FAILED_MESSAGE: &str = "Failed to initialize payment. Please try again.";
const VERIFY_FAILED_MESSAGE: &str = "Payment verification failed. Please try again.";
const PAYMENT_SUCCESS_MESSAGE: &str = "Payment successful! Your order has been placed.";

/// Errors from the checkout flow.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Sign in to check out")]
    NotAuthenticated,

    #[error("Cart is empty")]
    EmptyCart,

    #[error("No email address for payment receipt")]
    MissingEmail,

    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    #[error("Order total out of range")]
    AmountOutOfRange,

    #[error("No authorization URL received")]
    MissingAuthorizationUrl,

    #[error("Payment API error: {0}")]
    Api(#[from] ApiError),
}

/// Order totals in the major currency unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckoutSummary {
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
}

impl CheckoutSummary {
    /// Apply the shipping rule to a subtotal.
    #[must_use]
    pub fn for_subtotal(subtotal: Decimal) -> Self {
        let shipping = if subtotal > FREE_SHIPPING_THRESHOLD {
            Decimal::ZERO
        } else {
            FLAT_SHIPPING_RATE
        };
        Self {
            subtotal,
            shipping,
            total: subtotal.saturating_add(shipping),
        }
    }

    #[must_use]
    pub fn for_contents(contents: &CartContents) -> Self {
        Self::for_subtotal(contents.subtotal())
    }

    #[must_use]
    pub fn is_free_shipping(&self) -> bool {
        self.shipping.is_zero()
    }
}

/// What the checkout form collects.
#[derive(Debug, Clone, Default)]
pub struct CustomerDetails {
    /// Falls back to the signed-in user's email.
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub address: String,
}

/// A started payment the user must complete at `authorization_url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSession {
    pub order_id: OrderId,
    pub authorization_url: String,
    pub reference: Option<String>,
    pub summary: CheckoutSummary,
}

/// Build the initialize-payment body for `contents`.
///
/// # Errors
///
/// `EmptyCart`, `MissingEmail`/`InvalidEmail`, or `AmountOutOfRange` if the
/// total does not fit the gateway's integer amount.
pub fn build_payment_request(
    contents: &CartContents,
    customer: &CustomerDetails,
    fallback_email: Option<&str>,
    callback_url: &Url,
) -> Result<PaymentInitRequest, CheckoutError> {
    if contents.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }

    let email = customer
        .email
        .as_deref()
        .filter(|e| !e.trim().is_empty())
        .or(fallback_email)
        .ok_or(CheckoutError::MissingEmail)?;
    let email = Email::parse(email)?;

    let summary = CheckoutSummary::for_contents(contents);
    let amount = Price::new(summary.total, CurrencyCode::default())
        .to_minor_units()
        .ok_or(CheckoutError::AmountOutOfRange)?;

    Ok(PaymentInitRequest {
        order_id: OrderId::new(format!("order_{}", uuid::Uuid::new_v4().simple())),
        email: email.as_str().to_string(),
        amount,
        callback_url: callback_url.to_string(),
        metadata: PaymentMetadata {
            customer_name: format!("{} {}", customer.first_name, customer.last_name)
                .trim()
                .to_string(),
            customer_phone: customer.phone.clone(),
            shipping_address: customer.address.clone(),
            items: contents
                .lines()
                .iter()
                .map(|line| PaymentLineItem {
                    product_id: line.product_id.clone(),
                    quantity: line.quantity,
                    price: line.unit_price(),
                })
                .collect(),
        },
    })
}

/// The transaction reference from a gateway callback URL.
///
/// Reads `reference`, falling back to `trxref`.
#[must_use]
pub fn payment_reference(callback: &Url) -> Option<String> {
    let lookup = |name: &str| {
        callback
            .query_pairs()
            .find(|(key, value)| key == name && !value.is_empty())
            .map(|(_, value)| value.into_owned())
    };
    lookup("reference").or_else(|| lookup("trxref"))
}

/// Starts and completes payments for the active cart.
#[derive(Debug, Clone)]
pub struct CheckoutService {
    client: ApiClient,
    notifications: Notifications,
    callback_url: Url,
}

impl CheckoutService {
    #[must_use]
    pub const fn new(client: ApiClient, notifications: Notifications, callback_url: Url) -> Self {
        Self {
            client,
            notifications,
            callback_url,
        }
    }

    /// Initialize a payment for the cart's current contents.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` without a session, request building errors, API
    /// failures, or `MissingAuthorizationUrl`.
    #[instrument(skip(self, cart, customer))]
    pub async fn start<S: CartService>(
        &self,
        cart: &UnifiedCart<S>,
        customer: &CustomerDetails,
    ) -> Result<PaymentSession, CheckoutError> {
        let Some(user) = self.client.session().current_user() else {
            return Err(CheckoutError::NotAuthenticated);
        };

        // Catch the cart up with the session before pricing it
        let contents = match cart.refresh_cart().await {
            Ok(contents) => contents,
            Err(e) => {
                tracing::warn!(error = %e, "Using last known cart for checkout");
                cart.contents()
            }
        };
        let request = build_payment_request(
            &contents,
            customer,
            user.email.as_deref(),
            &self.callback_url,
        )?;
        tracing::info!(order_id = %request.order_id, amount = request.amount, "Initializing payment");

        let response = match self.client.initialize_payment(&request).await {
            Ok(response) => response,
            Err(e) => {
                self.notifications.error(INIT_FAILED_MESSAGE);
                return Err(e.into());
            }
        };

        let Some(authorization_url) = response.authorization_url.filter(|u| !u.is_empty()) else {
            self.notifications.error(INIT_FAILED_MESSAGE);
            return Err(CheckoutError::MissingAuthorizationUrl);
        };

        add_breadcrumb(
            "checkout",
            "Payment initialized",
            Some(&[("order_id", request.order_id.as_str())]),
        );

        Ok(PaymentSession {
            order_id: request.order_id,
            authorization_url,
            reference: response.reference,
            summary: CheckoutSummary::for_contents(&contents),
        })
    }

    /// Verify a payment; on success the cart is cleared.
    ///
    /// # Errors
    ///
    /// API failures. A non-successful status is returned as `Ok`.
    #[instrument(skip(self, cart))]
    pub async fn complete<S: CartService>(
        &self,
        cart: &UnifiedCart<S>,
        reference: &str,
    ) -> Result<PaymentStatus, CheckoutError> {
        let status = match self.client.verify_payment(reference).await {
            Ok(response) => response.status,
            Err(e) => {
                self.notifications.error(VERIFY_FAILED_MESSAGE);
                return Err(e.into());
            }
        };

        if status.is_success() {
            if let Err(e) = cart.clear_cart().await {
                tracing::warn!(error = %e, "Payment succeeded but cart could not be cleared");
            }
            self.notifications.success(PAYMENT_SUCCESS_MESSAGE);
        } else {
            tracing::warn!(status = ?status, "Payment not successful");
            self.notifications.error(VERIFY_FAILED_MESSAGE);
        }
        Ok(status)
    }
}
