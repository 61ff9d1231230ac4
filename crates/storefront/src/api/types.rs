//! Request and response bodies of the marketplace REST API.
//!
//! Field names follow the API's camelCase JSON.

use marketplace_core::{OrderId, PaymentStatus, ProductId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::cart::{CartContents, CartLine, ProductSnapshot, SyncItem};

// =============================================================================
// Cart
// =============================================================================

/// `GET /enhanced-cart` body.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerCartEnvelope {
    #[serde(default)]
    pub cart: Option<ServerCart>,
}

/// The authenticated cart as the API returns it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerCart {
    #[serde(default)]
    pub items: Vec<ServerCartItem>,
}

/// One server cart line; `product` is always resolved by the API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCartItem {
    #[serde(default)]
    pub product_id: Option<ProductId>,
    pub quantity: u32,
    pub product: ProductSnapshot,
}

impl From<ServerCartItem> for CartLine {
    fn from(item: ServerCartItem) -> Self {
        Self {
            product_id: item.product_id.unwrap_or_else(|| item.product.id.clone()),
            quantity: item.quantity,
            product: Some(item.product),
        }
    }
}

impl From<ServerCart> for CartContents {
    fn from(cart: ServerCart) -> Self {
        Self::new(cart.items.into_iter().map(CartLine::from).collect())
    }
}

/// `POST /enhanced-cart/items` body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest<'a> {
    pub product_id: &'a ProductId,
    pub quantity: u32,
}

/// `PUT /enhanced-cart/items/{productId}` body.
#[derive(Debug, Serialize)]
pub struct UpdateItemRequest {
    pub quantity: u32,
}

/// `POST /enhanced-cart/sync` body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest<'a> {
    pub local_items: &'a [SyncItem],
}

// =============================================================================
// Auth
// =============================================================================

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<&'a str>,
}

/// Login/register response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: AuthUser,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
}

// =============================================================================
// Payments
// =============================================================================

/// `POST /payments/initialize` body. `amount` is in minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInitRequest {
    pub order_id: OrderId,
    pub email: String,
    pub amount: i64,
    pub callback_url: String,
    pub metadata: PaymentMetadata,
}

/// Itemized block attached to a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMetadata {
    pub customer_name: String,
    pub customer_phone: String,
    pub shipping_address: String,
    pub items: Vec<PaymentLineItem>,
}

/// A cart line as reported to the payment gateway. `price` is the unit price
/// in the major unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentLineItem {
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
}

/// `POST /payments/initialize` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInitResponse {
    #[serde(default)]
    pub authorization_url: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct PaymentVerifyRequest<'a> {
    pub reference: &'a str,
}

/// `POST /payments/verify` response.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentVerifyResponse {
    #[serde(default)]
    pub status: PaymentStatus,
}
