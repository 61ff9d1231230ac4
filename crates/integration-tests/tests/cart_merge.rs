//! Guest cart merge on sign-in, across restarts and on sign-out.

use std::sync::Arc;

use marketplace_core::{ProductId, UserId};
use marketplace_integration_tests::{FakeMarketplace, MergeRecord};
use marketplace_storefront::notify::Notice;
use marketplace_storefront::storage::MemoryStorage;
use marketplace_storefront::{AuthStatus, MergeOutcome, ProductSnapshot, Storefront};
use rust_decimal::Decimal;
use secrecy::SecretString;

const PASSWORD: &str = "correct horse";

fn snapshot(id: &str, price: i64) -> ProductSnapshot {
    ProductSnapshot {
        id: ProductId::new(id),
        name: format!("Product {id}"),
        price: Decimal::from(price),
        image_url: String::new(),
        vendor_name: None,
    }
}

async fn fixture() -> (FakeMarketplace, String) {
    let fake = FakeMarketplace::start().await;
    fake.add_product("kente", "Kente Scarf", 120.0);
    fake.add_product("beads", "Krobo Beads", 45.5);
    fake.add_product("basket", "Bolga Basket", 300.0);
    let user_id = fake.add_user("ama@example.com", PASSWORD, "CUSTOMER");
    (fake, user_id)
}

async fn sign_in(storefront: &Storefront, email: &str) -> MergeOutcome {
    storefront
        .api()
        .login(email, &SecretString::from(PASSWORD))
        .await
        .expect("login should succeed");
    storefront
        .cart()
        .observe_auth(&storefront.session().status())
        .await
}

async fn fill_guest_cart(storefront: &Storefront) {
    let cart = storefront.cart();
    cart.add_to_cart(&ProductId::new("kente"), 2, Some(snapshot("kente", 120)))
        .await
        .expect("guest add");
    cart.add_to_cart(&ProductId::new("beads"), 1, Some(snapshot("beads", 45)))
        .await
        .expect("guest add");
}

#[tokio::test]
async fn test_guest_cart_merges_into_account_cart_on_login() {
    let (fake, user_id) = fixture().await;
    fake.seed_cart(&user_id, "kente", 1);

    let storage = Arc::new(MemoryStorage::new());
    let storefront = fake.storefront(&storage);
    fill_guest_cart(&storefront).await;
    assert!(!storefront.cart().is_authenticated());
    assert_eq!(storefront.cart().get_total_items(), 3);

    let outcome = sign_in(&storefront, "ama@example.com").await;

    assert_eq!(outcome, MergeOutcome::Merged(2));
    assert_eq!(
        fake.merges(),
        vec![MergeRecord {
            user_id: user_id.clone(),
            items: vec![("kente".to_string(), 2), ("beads".to_string(), 1)],
        }]
    );
    assert_eq!(
        fake.cart_of(&user_id),
        vec![("kente".to_string(), 3), ("beads".to_string(), 1)]
    );

    let cart = storefront.cart();
    assert!(cart.is_authenticated());
    assert_eq!(cart.get_item_quantity(&ProductId::new("kente")), 3);
    assert_eq!(cart.get_total_items(), 4);
    // Server prices win over the guest snapshots
    assert_eq!(cart.get_subtotal(), Decimal::new(4055, 1));
    assert!(
        cart.guest()
            .has_been_synced_for_user(&UserId::new(user_id.as_str()))
    );
}

#[tokio::test]
async fn test_merge_is_not_repeated_after_restart() {
    let (fake, user_id) = fixture().await;
    let storage = Arc::new(MemoryStorage::new());

    let first = fake.storefront(&storage);
    fill_guest_cart(&first).await;
    assert_eq!(sign_in(&first, "ama@example.com").await, MergeOutcome::Merged(2));
    drop(first);

    // Same storage: tokens and the pinned guest cart survive the restart
    let second = fake.storefront(&storage);
    assert!(second.session().is_authenticated());

    let contents = second.cart().refresh_cart().await.expect("refresh");
    assert!(second.cart().is_authenticated());
    assert_eq!(contents.item_quantity(&ProductId::new("kente")), 2);
    assert_eq!(fake.merges().len(), 1);
    assert_eq!(
        fake.cart_of(&user_id),
        vec![("kente".to_string(), 2), ("beads".to_string(), 1)]
    );
}

#[tokio::test]
async fn test_empty_guest_cart_skips_merge() {
    let (fake, user_id) = fixture().await;
    fake.seed_cart(&user_id, "basket", 1);

    let storage = Arc::new(MemoryStorage::new());
    let storefront = fake.storefront(&storage);

    assert_eq!(
        sign_in(&storefront, "ama@example.com").await,
        MergeOutcome::NotAttempted
    );
    assert!(fake.merges().is_empty());
    assert_eq!(storefront.cart().get_item_count(), 1);
    assert!(storefront.cart().is_in_cart(&ProductId::new("basket")));
}

#[tokio::test]
async fn test_failed_merge_keeps_guest_cart_and_notifies() {
    let (fake, user_id) = fixture().await;
    fake.fail_merges(true);

    let storage = Arc::new(MemoryStorage::new());
    let storefront = fake.storefront(&storage);
    let mut notices = storefront.notifications().subscribe();
    fill_guest_cart(&storefront).await;

    assert_eq!(
        sign_in(&storefront, "ama@example.com").await,
        MergeOutcome::Failed
    );

    // Signed in regardless, with the untouched account cart
    assert!(storefront.cart().is_authenticated());
    assert!(storefront.cart().contents().is_empty());
    assert!(fake.cart_of(&user_id).is_empty());

    let guest = storefront.cart().guest();
    assert!(!guest.has_been_synced_for_user(&UserId::new(user_id.as_str())));
    assert_eq!(guest.get_cart_for_sync().len(), 2);

    let mut saw_failure = false;
    while let Ok(notice) = notices.try_recv() {
        if let Notice::Message { text, .. } = notice {
            saw_failure |= text == "Failed to sync cart";
        }
    }
    assert!(saw_failure);
}

#[tokio::test]
async fn test_logout_switches_back_to_guest_cart() {
    let (fake, _user_id) = fixture().await;
    let storage = Arc::new(MemoryStorage::new());
    let storefront = fake.storefront(&storage);
    storefront
        .cart()
        .add_to_cart(&ProductId::new("beads"), 1, Some(snapshot("beads", 45)))
        .await
        .expect("guest add");
    sign_in(&storefront, "ama@example.com").await;

    storefront
        .cart()
        .add_to_cart(&ProductId::new("basket"), 1, None)
        .await
        .expect("account add");
    assert_eq!(storefront.cart().get_item_count(), 2);

    storefront.session().logout();
    storefront.cart().observe_auth(&AuthStatus::Anonymous).await;

    let cart = storefront.cart();
    assert!(!cart.is_authenticated());
    // The account-only line stays on the server
    assert!(!cart.is_in_cart(&ProductId::new("basket")));
    assert!(cart.is_in_cart(&ProductId::new("beads")));
    assert!(storage_has_no_tokens(&storage));
}

#[tokio::test]
async fn test_account_cart_operations_round_trip_through_api() {
    let (fake, user_id) = fixture().await;
    let storage = Arc::new(MemoryStorage::new());
    let storefront = fake.storefront(&storage);
    sign_in(&storefront, "ama@example.com").await;
    let cart = storefront.cart();

    cart.add_to_cart(&ProductId::new("kente"), 1, None)
        .await
        .expect("add");
    cart.add_to_cart(&ProductId::new("kente"), 2, None)
        .await
        .expect("add again");
    assert_eq!(fake.cart_of(&user_id), vec![("kente".to_string(), 3)]);

    let contents = cart
        .update_quantity(&ProductId::new("kente"), 5)
        .await
        .expect("update");
    assert_eq!(contents.item_quantity(&ProductId::new("kente")), 5);
    assert!(
        cart.update_quantity(&ProductId::new("kente"), 0)
            .await
            .is_err()
    );
    assert_eq!(fake.cart_of(&user_id), vec![("kente".to_string(), 5)]);

    let contents = cart
        .remove_from_cart(&ProductId::new("kente"))
        .await
        .expect("remove");
    assert!(contents.is_empty());
    assert!(fake.cart_of(&user_id).is_empty());
}

fn storage_has_no_tokens(storage: &MemoryStorage) -> bool {
    use marketplace_storefront::storage::{ACCESS_TOKEN_KEY, KeyValueStorage, REFRESH_TOKEN_KEY};

    storage.get(ACCESS_TOKEN_KEY).ok().flatten().is_none()
        && storage.get(REFRESH_TOKEN_KEY).ok().flatten().is_none()
}
