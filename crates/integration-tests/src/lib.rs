//! End-to-end tests for the marketplace storefront client.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p marketplace-integration-tests
//! ```
//!
//! Each test starts a [`FakeMarketplace`] on an ephemeral local port and points
//! a [`Storefront`] at it. No external services are needed.
//!
//! # Fake API
//!
//! The fake implements just enough of the marketplace REST API: login,
//! registration and refresh with JWT-shaped access tokens, the per-user
//! `enhanced-cart` endpoints including `sync`, and payment initialize/verify.
//! Tests can expire access tokens, revoke refresh tokens, make merges fail,
//! and inspect what the client sent.
//!
//! # Test Categories
//!
//! - `cart_merge` - guest cart merge on sign-in, restart and sign-out
//! - `auth_refresh` - 401 handling, token refresh and session expiry
//! - `checkout` - payment initialization and verification

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use marketplace_storefront::storage::{KeyValueStorage, MemoryStorage};
use marketplace_storefront::{Storefront, StorefrontConfig};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use url::Url;

/// A product the fake knows how to price.
#[derive(Debug, Clone)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub vendor: Option<String>,
}

/// One `POST /enhanced-cart/sync` the fake received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRecord {
    pub user_id: String,
    pub items: Vec<(String, u32)>,
}

/// One `POST /payments/initialize` the fake received.
#[derive(Debug, Clone)]
pub struct PaymentRecord {
    pub user_id: String,
    pub reference: String,
    pub body: Value,
}

#[derive(Debug, Clone)]
struct Account {
    id: String,
    email: String,
    password: String,
    role: String,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    accounts: HashMap<String, Account>,
    products: HashMap<String, Product>,
    carts: HashMap<String, Vec<(String, u32)>>,
    access_tokens: HashMap<String, String>,
    refresh_tokens: HashMap<String, String>,
    refresh_calls: usize,
    merges: Vec<MergeRecord>,
    fail_merges: bool,
    payments: Vec<PaymentRecord>,
    payment_statuses: HashMap<String, String>,
}

impl Inner {
    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn issue_tokens(&mut self, account: &Account) -> (String, String) {
        let n = self.next();
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(
            json!({
                "id": account.id,
                "email": account.email,
                "role": account.role,
                "n": n,
            })
            .to_string(),
        );
        let access = format!("{header}.{payload}.fake");
        let refresh = format!("refresh_{}_{n}", account.id);

        self.access_tokens.insert(access.clone(), account.id.clone());
        self.refresh_tokens.insert(refresh.clone(), account.id.clone());
        (access, refresh)
    }

    fn auth_body(&mut self, account: &Account) -> Value {
        let (access, refresh) = self.issue_tokens(account);
        json!({
            "accessToken": access,
            "refreshToken": refresh,
            "user": { "id": account.id, "email": account.email, "role": account.role },
        })
    }

    fn cart_body(&self, user_id: &str) -> Value {
        let Some(lines) = self.carts.get(user_id) else {
            return json!({ "cart": null });
        };
        let items: Vec<Value> = lines
            .iter()
            .filter_map(|(product_id, quantity)| {
                let product = self.products.get(product_id)?;
                Some(json!({
                    "productId": product_id,
                    "quantity": quantity,
                    "product": {
                        "id": product.id,
                        "name": product.name,
                        "price": product.price,
                        "imageUrl": format!("https://cdn.example.com/{}.jpg", product.id),
                        "vendorName": product.vendor,
                    },
                }))
            })
            .collect();
        json!({ "cart": { "items": items } })
    }

    fn add_line(&mut self, user_id: &str, product_id: &str, quantity: u32) {
        let lines = self.carts.entry(user_id.to_string()).or_default();
        match lines.iter_mut().find(|(id, _)| id == product_id) {
            Some((_, existing)) => *existing += quantity,
            None => lines.push((product_id.to_string(), quantity)),
        }
    }
}

type Shared = Arc<Mutex<Inner>>;

/// A marketplace API double served over real HTTP.
pub struct FakeMarketplace {
    addr: SocketAddr,
    state: Shared,
    server: JoinHandle<()>,
}

impl Drop for FakeMarketplace {
    fn drop(&mut self) {
        self.server.abort();
    }
}

impl FakeMarketplace {
    /// Bind an ephemeral port and start serving.
    ///
    /// # Panics
    ///
    /// If the listener cannot be bound.
    pub async fn start() -> Self {
        let state: Shared = Arc::default();
        let app = router(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap_or_else(|e| panic!("Failed to bind fake marketplace: {e}"));
        let addr = listener
            .local_addr()
            .unwrap_or_else(|e| panic!("Failed to read fake marketplace address: {e}"));

        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                panic!("Fake marketplace stopped: {e}");
            }
        });

        Self {
            addr,
            state,
            server,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// API root, e.g. `http://127.0.0.1:41234/api/`.
    ///
    /// # Panics
    ///
    /// Never in practice; the address always forms a valid URL.
    #[must_use]
    pub fn base_url(&self) -> Url {
        Url::parse(&format!("http://{}/api/", self.addr))
            .unwrap_or_else(|e| panic!("Invalid fake marketplace URL: {e}"))
    }

    /// Client configuration pointing at this fake.
    ///
    /// # Panics
    ///
    /// Never in practice; see [`Self::base_url`].
    #[must_use]
    pub fn config(&self) -> StorefrontConfig {
        let api_url = self.base_url();
        StorefrontConfig {
            payment_callback_url: api_url
                .join("/payment-success")
                .unwrap_or_else(|e| panic!("Invalid callback URL: {e}")),
            api_url,
            state_dir: std::env::temp_dir().join("marketplace-integration-tests"),
            http_timeout: Duration::from_secs(5),
            cart_feedback: Duration::from_millis(3000),
            sentry_dsn: None,
        }
    }

    /// A storefront over `storage`, as if a client process had just started.
    ///
    /// # Panics
    ///
    /// If the storefront cannot be built.
    #[must_use]
    pub fn storefront(&self, storage: &Arc<MemoryStorage>) -> Storefront {
        let storage: Arc<dyn KeyValueStorage> = Arc::clone(storage) as Arc<dyn KeyValueStorage>;
        Storefront::with_storage(self.config(), storage)
            .unwrap_or_else(|e| panic!("Failed to build storefront: {e}"))
    }

    /// Register an account and return its user ID.
    pub fn add_user(&self, email: &str, password: &str, role: &str) -> String {
        let mut inner = self.lock();
        let id = format!("user_{}", inner.next());
        inner.accounts.insert(
            email.to_string(),
            Account {
                id: id.clone(),
                email: email.to_string(),
                password: password.to_string(),
                role: role.to_string(),
            },
        );
        id
    }

    pub fn add_product(&self, id: &str, name: &str, price: f64) {
        self.lock().products.insert(
            id.to_string(),
            Product {
                id: id.to_string(),
                name: name.to_string(),
                price,
                vendor: Some("Adinkra Crafts".to_string()),
            },
        );
    }

    /// Put a line straight into a user's server cart.
    pub fn seed_cart(&self, user_id: &str, product_id: &str, quantity: u32) {
        self.lock().add_line(user_id, product_id, quantity);
    }

    /// A user's server cart lines in insertion order.
    #[must_use]
    pub fn cart_of(&self, user_id: &str) -> Vec<(String, u32)> {
        self.lock().carts.get(user_id).cloned().unwrap_or_default()
    }

    /// Invalidate every access token, as if they had all expired.
    pub fn expire_access_tokens(&self) {
        self.lock().access_tokens.clear();
    }

    /// Invalidate every refresh token.
    pub fn revoke_refresh_tokens(&self) {
        self.lock().refresh_tokens.clear();
    }

    #[must_use]
    pub fn refresh_calls(&self) -> usize {
        self.lock().refresh_calls
    }

    #[must_use]
    pub fn merges(&self) -> Vec<MergeRecord> {
        self.lock().merges.clone()
    }

    /// Make `POST /enhanced-cart/sync` answer 500.
    pub fn fail_merges(&self, fail: bool) {
        self.lock().fail_merges = fail;
    }

    #[must_use]
    pub fn payments(&self) -> Vec<PaymentRecord> {
        self.lock().payments.clone()
    }

    /// What `POST /payments/verify` reports for `reference` (default `success`).
    pub fn set_payment_status(&self, reference: &str, status: &str) {
        self.lock()
            .payment_statuses
            .insert(reference.to_string(), status.to_string());
    }
}

// =============================================================================
// Routes
// =============================================================================

fn router(state: Shared) -> Router {
    let api = Router::new()
        .route("/auth/login", post(login))
        .route("/auth/register", post(register))
        .route("/auth/refresh", post(refresh))
        .route("/enhanced-cart", get(get_cart))
        .route("/enhanced-cart/items", post(add_item))
        .route(
            "/enhanced-cart/items/{product_id}",
            put(update_item).delete(remove_item),
        )
        .route("/enhanced-cart/sync", post(sync_cart))
        .route("/payments/initialize", post(initialize_payment))
        .route("/payments/verify", post(verify_payment))
        .with_state(state);

    Router::new().nest("/api", api)
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

fn lock(state: &Shared) -> MutexGuard<'_, Inner> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The user behind the request's bearer token.
fn authenticate(inner: &Inner, headers: &HeaderMap) -> Result<String, Response> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .and_then(|token| inner.access_tokens.get(token).cloned())
        .ok_or_else(|| error(StatusCode::UNAUTHORIZED, "Unauthorized"))
}

#[derive(Deserialize)]
struct Credentials {
    email: String,
    password: String,
}

async fn login(State(state): State<Shared>, Json(body): Json<Credentials>) -> Response {
    let mut inner = lock(&state);
    let Some(account) = inner
        .accounts
        .get(&body.email)
        .filter(|account| account.password == body.password)
        .cloned()
    else {
        return error(StatusCode::UNAUTHORIZED, "Invalid credentials");
    };
    Json(inner.auth_body(&account)).into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Registration {
    email: String,
    password: String,
    #[serde(default)]
    first_name: Option<String>,
}

async fn register(State(state): State<Shared>, Json(body): Json<Registration>) -> Response {
    let mut inner = lock(&state);
    if inner.accounts.contains_key(&body.email) {
        return error(StatusCode::CONFLICT, "Email already registered");
    }
    if body.first_name.as_deref() == Some("") {
        return error(StatusCode::BAD_REQUEST, "First name cannot be empty");
    }

    let account = Account {
        id: format!("user_{}", inner.next()),
        email: body.email.clone(),
        password: body.password,
        role: "CUSTOMER".to_string(),
    };
    inner.accounts.insert(body.email, account.clone());
    (StatusCode::CREATED, Json(inner.auth_body(&account))).into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshBody {
    refresh_token: String,
}

async fn refresh(State(state): State<Shared>, Json(body): Json<RefreshBody>) -> Response {
    let mut inner = lock(&state);
    inner.refresh_calls += 1;

    let Some(user_id) = inner.refresh_tokens.remove(&body.refresh_token) else {
        return error(StatusCode::UNAUTHORIZED, "Invalid refresh token");
    };
    let Some(account) = inner.accounts.values().find(|a| a.id == user_id).cloned() else {
        return error(StatusCode::UNAUTHORIZED, "Unknown user");
    };

    let (access, refresh) = inner.issue_tokens(&account);
    Json(json!({ "accessToken": access, "refreshToken": refresh })).into_response()
}

async fn get_cart(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let inner = lock(&state);
    match authenticate(&inner, &headers) {
        Ok(user_id) => Json(inner.cart_body(&user_id)).into_response(),
        Err(response) => response,
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddItemBody {
    product_id: String,
    quantity: u32,
}

async fn add_item(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<AddItemBody>,
) -> Response {
    let mut inner = lock(&state);
    let user_id = match authenticate(&inner, &headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    if !inner.products.contains_key(&body.product_id) {
        return error(StatusCode::NOT_FOUND, "Product not found");
    }
    inner.add_line(&user_id, &body.product_id, body.quantity);
    (StatusCode::CREATED, Json(json!({ "success": true }))).into_response()
}

#[derive(Deserialize)]
struct UpdateItemBody {
    quantity: u32,
}

async fn update_item(
    State(state): State<Shared>,
    Path(product_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<UpdateItemBody>,
) -> Response {
    let mut inner = lock(&state);
    let user_id = match authenticate(&inner, &headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    let line = inner
        .carts
        .get_mut(&user_id)
        .and_then(|lines| lines.iter_mut().find(|(id, _)| *id == product_id));
    match line {
        Some((_, quantity)) => {
            *quantity = body.quantity;
            Json(json!({ "success": true })).into_response()
        }
        None => error(StatusCode::NOT_FOUND, "Item not in cart"),
    }
}

async fn remove_item(
    State(state): State<Shared>,
    Path(product_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let mut inner = lock(&state);
    let user_id = match authenticate(&inner, &headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    if let Some(lines) = inner.carts.get_mut(&user_id) {
        lines.retain(|(id, _)| *id != product_id);
    }
    Json(json!({ "success": true })).into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncBody {
    local_items: Vec<AddItemBody>,
}

async fn sync_cart(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<SyncBody>,
) -> Response {
    let mut inner = lock(&state);
    let user_id = match authenticate(&inner, &headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    if inner.fail_merges {
        return error(StatusCode::INTERNAL_SERVER_ERROR, "Cart sync unavailable");
    }

    let items: Vec<(String, u32)> = body
        .local_items
        .into_iter()
        .map(|item| (item.product_id, item.quantity))
        .collect();
    for (product_id, quantity) in &items {
        // Unknown products are dropped silently
        if inner.products.contains_key(product_id) {
            inner.add_line(&user_id, product_id, *quantity);
        }
    }
    inner.merges.push(MergeRecord {
        user_id: user_id.clone(),
        items,
    });
    Json(inner.cart_body(&user_id)).into_response()
}

async fn initialize_payment(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut inner = lock(&state);
    let user_id = match authenticate(&inner, &headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    if body["amount"].as_i64().unwrap_or(0) <= 0 {
        return error(StatusCode::BAD_REQUEST, "Invalid amount");
    }

    let reference = format!("ref_{}", inner.next());
    inner.payments.push(PaymentRecord {
        user_id,
        reference: reference.clone(),
        body,
    });
    Json(json!({
        "authorizationUrl": format!("https://checkout.example.com/{reference}"),
        "reference": reference,
    }))
    .into_response()
}

#[derive(Deserialize)]
struct VerifyBody {
    reference: String,
}

async fn verify_payment(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<VerifyBody>,
) -> Response {
    let inner = lock(&state);
    if let Err(response) = authenticate(&inner, &headers) {
        return response;
    }
    if !inner.payments.iter().any(|p| p.reference == body.reference) {
        return error(StatusCode::NOT_FOUND, "Unknown payment reference");
    }

    let status = inner
        .payment_statuses
        .get(&body.reference)
        .cloned()
        .unwrap_or_else(|| "success".to_string());
    Json(json!({ "status": status })).into_response()
}
