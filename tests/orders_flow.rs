use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use sea_orm::{ConnectionTrait, EntityTrait, PaginatorTrait, Statement};
use uuid::Uuid;

use axum_checkout_api::{
    db::{create_orm_conn, create_pool, run_migrations},
    dto::orders::{PlaceOrderItem, PlaceOrderRequest},
    entity::Orders,
    error::AppError,
    inventory::{InMemoryInventoryClient, ProductSnapshot},
    middleware::auth::CurrentUser,
    models::OrderStatus,
    providers::ProviderRegistry,
    state::AppState,
};

// Integration flow: placing orders against an in-memory inventory, covering
// snapshot totals, stock movement, each abort path, and cancellation rules.
#[tokio::test]
async fn place_and_cancel_order_flow() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let (state, inventory) = setup_state(&database_url).await?;

    let user = CurrentUser {
        user_id: Uuid::new_v4(),
        role: "user".into(),
    };
    let stranger = CurrentUser {
        user_id: Uuid::new_v4(),
        role: "user".into(),
    };

    let widget = seed_product(&inventory, "Widget", "100.00", 5, true);
    let sticker = seed_product(&inventory, "Sticker", "0.50", 100, true);
    let retired = seed_product(&inventory, "Retired Gadget", "40.00", 10, false);

    // Single item happy path: snapshot price, derived subtotal, stock reduced.
    let response = axum_checkout_api::services::order_service::place_order(
        &state,
        &user,
        request(&[(widget, 1)]),
    )
    .await?;
    let placed = response.data.unwrap();
    assert_eq!(placed.order.status, OrderStatus::Pending);
    assert!(placed.order.order_number.starts_with("ORD-"));
    assert_eq!(placed.items.len(), 1);
    assert_eq!(placed.items[0].subtotal, dec("100.00"));
    assert_eq!(placed.order.total_amount, dec("100.00"));
    assert_eq!(inventory.stock_of(widget), Some(4));

    // Multi-item order sums subtotals in caller order.
    let response = axum_checkout_api::services::order_service::place_order(
        &state,
        &user,
        request(&[(widget, 2), (sticker, 4)]),
    )
    .await?;
    let multi = response.data.unwrap();
    assert_eq!(multi.items.len(), 2);
    assert_eq!(multi.order.total_amount, dec("202.00"));
    assert_eq!(inventory.stock_of(widget), Some(2));
    assert_eq!(inventory.stock_of(sticker), Some(96));

    let orders_so_far = Orders::find().count(&state.orm).await?;
    assert_eq!(orders_so_far, 2);

    // Validation failures never touch inventory or the database.
    let err = axum_checkout_api::services::order_service::place_order(
        &state,
        &user,
        request(&[]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = axum_checkout_api::services::order_service::place_order(
        &state,
        &user,
        request(&[(widget, 0)]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    // Requesting more than the remaining stock aborts before persistence.
    let err = axum_checkout_api::services::order_service::place_order(
        &state,
        &user,
        request(&[(widget, 10)]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InsufficientStock(_)));
    assert_eq!(inventory.stock_of(widget), Some(2));

    // Inactive products are rejected, unknown products are not found.
    let err = axum_checkout_api::services::order_service::place_order(
        &state,
        &user,
        request(&[(retired, 1)]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::ProductUnavailable(_)));

    let err = axum_checkout_api::services::order_service::place_order(
        &state,
        &user,
        request(&[(Uuid::new_v4(), 1)]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    // A failure on a later item leaves earlier remote reductions applied:
    // sticker stock was already reduced when the widget check fails.
    let err = axum_checkout_api::services::order_service::place_order(
        &state,
        &user,
        request(&[(sticker, 5), (widget, 10)]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InsufficientStock(_)));
    assert_eq!(inventory.stock_of(sticker), Some(91));
    assert_eq!(Orders::find().count(&state.orm).await?, orders_so_far);

    // With compensation enabled, the same abort restores the earlier item.
    let compensating = AppState {
        compensate_stock_on_abort: true,
        ..state.clone()
    };
    let err = axum_checkout_api::services::order_service::place_order(
        &compensating,
        &user,
        request(&[(sticker, 5), (widget, 10)]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InsufficientStock(_)));
    assert_eq!(inventory.stock_of(sticker), Some(91));
    assert!(inventory.restore_call_count() >= 1);

    // Cancellation: owner only, and only while PENDING or CONFIRMED.
    let order_id = placed.order.id;
    let err = axum_checkout_api::services::order_service::cancel_order(&state, &stranger, order_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized));

    let cancelled =
        axum_checkout_api::services::order_service::cancel_order(&state, &user, order_id).await?;
    assert_eq!(cancelled.data.unwrap().order.status, OrderStatus::Cancelled);
    // Cancellation forfeits the reserved stock; nothing is restored.
    assert_eq!(inventory.stock_of(widget), Some(2));

    let err = axum_checkout_api::services::order_service::cancel_order(&state, &user, order_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    let err =
        axum_checkout_api::services::order_service::cancel_order(&state, &user, Uuid::new_v4())
            .await
            .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    // Listing and fetching stay scoped to the owner.
    let listing = axum_checkout_api::services::order_service::list_orders(
        &state,
        &user,
        list_query(),
    )
    .await?;
    assert_eq!(listing.data.unwrap().items.len(), 2);

    let err = axum_checkout_api::services::order_service::get_order(&state, &stranger, order_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    Ok(())
}

fn request(items: &[(Uuid, i32)]) -> PlaceOrderRequest {
    PlaceOrderRequest {
        items: items
            .iter()
            .map(|(product_id, quantity)| PlaceOrderItem {
                product_id: *product_id,
                quantity: *quantity,
            })
            .collect(),
    }
}

fn list_query() -> axum_checkout_api::routes::params::OrderListQuery {
    axum_checkout_api::routes::params::OrderListQuery {
        pagination: axum_checkout_api::routes::params::Pagination {
            page: Some(1),
            per_page: Some(20),
        },
        status: None,
        sort_order: None,
    }
}

fn dec(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).unwrap()
}

fn seed_product(
    inventory: &InMemoryInventoryClient,
    name: &str,
    price: &str,
    stock: i32,
    is_active: bool,
) -> Uuid {
    let id = Uuid::new_v4();
    inventory.insert(ProductSnapshot {
        id,
        sku: Some(format!("SKU-{}", &id.to_string()[..8])),
        name: name.into(),
        price: dec(price),
        stock_quantity: stock,
        is_active,
    });
    id
}

async fn setup_state(database_url: &str) -> anyhow::Result<(AppState, InMemoryInventoryClient)> {
    let pool = create_pool(database_url).await?;
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;

    // Clean tables between runs
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE order_items, orders, payments, audit_logs RESTART IDENTITY CASCADE",
    ))
    .await?;

    let inventory = InMemoryInventoryClient::new();
    let state = AppState {
        pool,
        orm,
        inventory: Arc::new(inventory.clone()),
        providers: Arc::new(ProviderRegistry::new()),
        compensate_stock_on_abort: false,
    };
    Ok((state, inventory))
}
