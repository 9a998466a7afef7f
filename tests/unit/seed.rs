// Seed file loading against a live application

use gamespace::auth::password::PasswordHasher;
use gamespace::core::errors::GameError;
use gamespace::core::models::{PageRequest, Permission};
use gamespace::loader::seed_loader::SeedLoader;
use std::io::Write;
use tempfile::NamedTempFile;

use super::common::*;

const SEED: &str = r#"
roles:
  - name: Operators
    permissions: [AdministratorPrivilegesManagement, CustomerService, CustomerService]
  - name: Moderators
    permissions: [MessagePermissionManagement]
admins:
  - account: root
    email: root@example.com
    nickname: Root
    password: correct-horse-battery
    roles: [Operators, Moderators]
coupon_types:
  - name: Welcome
    discount_type: Percent
    discount_value: 10
    min_spend: 0
    valid_from: 2024-01-01T00:00:00Z
    valid_to: 2024-12-31T23:59:59Z
    points_cost: 100
evoucher_types:
  - name: Cinema
    value_amount: 250
    points_cost: 800
    total_available: 20
    valid_from: 2024-01-01T00:00:00Z
    valid_to: 2024-12-31T23:59:59Z
products:
  - name: Plush
    product_type: toy
    price: 300
    stock: 5
  - name: Sticker
    product_type: craft
    price: 20
forums:
  - name: General
    description: Anything goes
"#;

fn seed_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn hasher() -> PasswordHasher {
    PasswordHasher::new(8, 1).unwrap()
}

#[tokio::test]
async fn test_seed_file_populates_application() {
    let app = TestApp::new();
    let file = seed_file(SEED);
    let loader = SeedLoader::from_file(file.path()).unwrap();

    let report = loader
        .apply(app.store.as_ref(), app.clock.as_ref(), &hasher())
        .await
        .unwrap();
    assert_eq!(report.roles, 2);
    assert_eq!(report.admins, 1);
    assert_eq!(report.role_assignments, 2);
    assert_eq!(report.products, 2);

    // the seeded admin can sign in and use the back office
    let tokens = app
        .state
        .accounts
        .login("root", PASSWORD, None)
        .await
        .unwrap();
    assert!(tokens.user.email_confirmed);
    let admin = tokens.user.id;
    assert!(app.state.admin.dashboard(admin).await.is_ok());
    let permissions = app.state.rbac.permissions_of(admin).await.unwrap();
    assert!(permissions.contains(&Permission::MessagePermissionManagement));
    assert_eq!(permissions.len(), 3);

    assert_eq!(app.state.wallet.coupon_catalogue().await.unwrap().len(), 1);
    assert_eq!(app.state.wallet.evoucher_catalogue().await.unwrap().len(), 1);
    let products = app
        .state
        .shop
        .list_products(None, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(products.total, 2);
    assert_eq!(app.state.forum.list_forums().await.unwrap()[0].name, "General");

    // second run finds everything in place
    let again = loader
        .apply(app.store.as_ref(), app.clock.as_ref(), &hasher())
        .await
        .unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn test_seed_does_not_overwrite_existing_rows() {
    let app = TestApp::new();
    app.product("Plush", 999, None).await;

    let loader = SeedLoader::from_yaml(SEED).unwrap();
    let report = loader
        .apply(app.store.as_ref(), app.clock.as_ref(), &hasher())
        .await
        .unwrap();
    assert_eq!(report.products, 1);

    let found = app
        .state
        .shop
        .search("plush", PageRequest::default())
        .await
        .unwrap();
    assert_eq!(found.items[0].price, 999);
}

#[test]
fn test_seed_file_errors() {
    let missing = SeedLoader::from_file("/nonexistent/seed.yaml");
    assert!(matches!(missing, Err(GameError::Configuration(_))));

    let file = seed_file("roles: [unclosed");
    assert!(matches!(
        SeedLoader::from_file(file.path()),
        Err(GameError::Configuration(_))
    ));

    let undefined_role = r#"
admins:
  - account: root
    email: root@example.com
    password: correct-horse-battery
    roles: [Ghosts]
"#;
    assert!(SeedLoader::from_yaml(undefined_role).is_err());

    let short_password = r#"
admins:
  - account: root
    email: root@example.com
    password: short
"#;
    assert!(SeedLoader::from_yaml(short_password).is_err());

    let bad_product = r#"
products:
  - name: Plush
    product_type: toy
    price: -1
"#;
    assert!(SeedLoader::from_yaml(bad_product).is_err());
}
