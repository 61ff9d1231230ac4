//! Payment initialization and verification against the account cart.

use std::sync::Arc;

use marketplace_core::{PaymentStatus, ProductId};
use marketplace_integration_tests::FakeMarketplace;
use marketplace_storefront::Storefront;
use marketplace_storefront::checkout::{CheckoutError, CustomerDetails, payment_reference};
use marketplace_storefront::notify::Notice;
use marketplace_storefront::storage::MemoryStorage;
use rust_decimal::Decimal;
use secrecy::SecretString;
use url::Url;

const PASSWORD: &str = "akwaaba-2024";

fn customer() -> CustomerDetails {
    CustomerDetails {
        email: None,
        first_name: "Ama".to_string(),
        last_name: "Mensah".to_string(),
        phone: "+233201234567".to_string(),
        address: "12 Oxford St, Osu, Accra".to_string(),
    }
}

async fn fixture() -> (FakeMarketplace, String, Storefront) {
    let fake = FakeMarketplace::start().await;
    fake.add_product("kente", "Kente Scarf", 120.0);
    fake.add_product("basket", "Bolga Basket", 300.0);
    let user_id = fake.add_user("ama@example.com", PASSWORD, "CUSTOMER");

    let storage = Arc::new(MemoryStorage::new());
    let storefront = fake.storefront(&storage);
    storefront
        .api()
        .login("ama@example.com", &SecretString::from(PASSWORD))
        .await
        .expect("login should succeed");
    storefront
        .cart()
        .observe_auth(&storefront.session().status())
        .await;

    (fake, user_id, storefront)
}

fn drain_texts(notices: &mut tokio::sync::broadcast::Receiver<Notice>) -> Vec<String> {
    let mut texts = Vec::new();
    while let Ok(notice) = notices.try_recv() {
        if let Some(text) = notice.text() {
            texts.push(text.to_string());
        }
    }
    texts
}

#[tokio::test]
async fn test_start_sends_minor_units_and_itemized_metadata() {
    let (fake, user_id, storefront) = fixture().await;
    fake.seed_cart(&user_id, "kente", 2);

    let payment = storefront
        .checkout()
        .start(storefront.cart(), &customer())
        .await
        .expect("payment should start");

    // 240 subtotal + 50 shipping
    assert_eq!(payment.summary.total, Decimal::from(290));
    assert!(payment.authorization_url.starts_with("https://checkout.example.com/"));

    let recorded = fake.payments();
    assert_eq!(recorded.len(), 1);
    let body = &recorded[0].body;
    assert_eq!(Some(recorded[0].reference.as_str()), payment.reference.as_deref());
    assert_eq!(body["amount"], 29_000);
    assert_eq!(body["email"], "ama@example.com");
    assert_eq!(body["orderId"], payment.order_id.as_str());
    assert_eq!(body["callbackUrl"], fake.config().payment_callback_url.as_str());
    assert_eq!(body["metadata"]["customerName"], "Ama Mensah");
    assert_eq!(body["metadata"]["items"][0]["productId"], "kente");
    assert_eq!(body["metadata"]["items"][0]["quantity"], 2);
}

#[tokio::test]
async fn test_large_order_ships_free() {
    let (fake, user_id, storefront) = fixture().await;
    fake.seed_cart(&user_id, "basket", 2);

    let payment = storefront
        .checkout()
        .start(storefront.cart(), &customer())
        .await
        .expect("payment should start");

    assert!(payment.summary.is_free_shipping());
    assert_eq!(fake.payments()[0].body["amount"], 60_000);
}

#[tokio::test]
async fn test_successful_verification_clears_cart() {
    let (fake, user_id, storefront) = fixture().await;
    fake.seed_cart(&user_id, "kente", 1);
    let mut notices = storefront.notifications().subscribe();

    let payment = storefront
        .checkout()
        .start(storefront.cart(), &customer())
        .await
        .expect("payment should start");
    let reference = payment.reference.expect("gateway reference");

    // The gateway redirects back with the reference in the query
    let callback = Url::parse(&format!(
        "{}?trxref={reference}&reference={reference}",
        fake.config().payment_callback_url
    ))
    .expect("callback URL");
    let from_callback = payment_reference(&callback).expect("reference in callback");

    let status = storefront
        .checkout()
        .complete(storefront.cart(), &from_callback)
        .await
        .expect("verification should succeed");

    assert_eq!(status, PaymentStatus::Success);
    assert!(fake.cart_of(&user_id).is_empty());
    assert!(storefront.cart().contents().is_empty());
    assert!(
        drain_texts(&mut notices)
            .contains(&"Payment successful! Your order has been placed.".to_string())
    );
}

#[tokio::test]
async fn test_failed_verification_keeps_cart() {
    let (fake, user_id, storefront) = fixture().await;
    fake.seed_cart(&user_id, "kente", 1);
    let mut notices = storefront.notifications().subscribe();

    let payment = storefront
        .checkout()
        .start(storefront.cart(), &customer())
        .await
        .expect("payment should start");
    let reference = payment.reference.expect("gateway reference");
    fake.set_payment_status(&reference, "failed");

    let status = storefront
        .checkout()
        .complete(storefront.cart(), &reference)
        .await
        .expect("verification call should succeed");

    assert_eq!(status, PaymentStatus::Failed);
    assert_eq!(fake.cart_of(&user_id), vec![("kente".to_string(), 1)]);
    assert!(
        drain_texts(&mut notices)
            .contains(&"Payment verification failed. Please try again.".to_string())
    );
}

#[tokio::test]
async fn test_unknown_reference_is_an_error() {
    let (_fake, _user_id, storefront) = fixture().await;

    let err = storefront
        .checkout()
        .complete(storefront.cart(), "ref_missing")
        .await
        .expect_err("unknown reference");
    assert!(matches!(err, CheckoutError::Api(_)));
}

#[tokio::test]
async fn test_empty_cart_cannot_check_out() {
    let (fake, _user_id, storefront) = fixture().await;

    let err = storefront
        .checkout()
        .start(storefront.cart(), &customer())
        .await
        .expect_err("empty cart");
    assert!(matches!(err, CheckoutError::EmptyCart));
    assert!(fake.payments().is_empty());
}

#[tokio::test]
async fn test_guest_cannot_check_out() {
    let fake = FakeMarketplace::start().await;
    fake.add_product("kente", "Kente Scarf", 120.0);
    let storage = Arc::new(MemoryStorage::new());
    let storefront = fake.storefront(&storage);
    storefront
        .cart()
        .add_to_cart(&ProductId::new("kente"), 1, None)
        .await
        .expect("guest add");

    let err = storefront
        .checkout()
        .start(storefront.cart(), &customer())
        .await
        .expect_err("guest checkout");
    assert!(matches!(err, CheckoutError::NotAuthenticated));
}
