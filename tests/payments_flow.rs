use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::Utc;
use sea_orm::{ConnectionTrait, EntityTrait, PaginatorTrait, Set, Statement};
use sea_orm::ActiveModelTrait;
use uuid::Uuid;

use axum_checkout_api::{
    db::{create_orm_conn, create_pool, run_migrations},
    dto::payments::{InitiatePaymentRequest, RefundPaymentRequest},
    entity::{Payments, payments::ActiveModel as PaymentActive},
    error::AppError,
    inventory::InMemoryInventoryClient,
    middleware::auth::CurrentUser,
    models::{PaymentMethod, PaymentProvider, PaymentStatus},
    providers::{BillingAddress, CardDetails, GatewayMode, InMemoryGateway, ProviderRegistry},
    services::payment_service,
    state::AppState,
};

// Integration flow: the payment lifecycle against an in-memory gateway,
// covering initiation outcomes, refund rules, callbacks, and the retry sweep.
#[tokio::test]
async fn payment_lifecycle_flow() -> anyhow::Result<()> {
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

    let (state, gateway) = setup_state(&database_url).await?;
    let user = CurrentUser {
        user_id: Uuid::new_v4(),
        role: "user".into(),
    };
    let order_id = Uuid::new_v4();

    // Unregistered provider: typed error and no payment row.
    let err = payment_service::initiate_payment(
        &state,
        &user,
        charge(order_id, PaymentProvider::Stripe, PaymentMethod::CreditCard, "100.00"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::ProviderNotSupported(_)));
    assert_eq!(Payments::find().count(&state.orm).await?, 0);

    // Method outside the adapter's capability set: same, no row.
    let err = payment_service::initiate_payment(
        &state,
        &user,
        charge(order_id, PaymentProvider::Iyzico, PaymentMethod::CashOnDelivery, "100.00"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::MethodNotSupported { .. }));
    assert_eq!(Payments::find().count(&state.orm).await?, 0);

    // Card payments need card details.
    let mut no_card = charge(order_id, PaymentProvider::Iyzico, PaymentMethod::CreditCard, "100.00");
    no_card.card_details = None;
    let err = payment_service::initiate_payment(&state, &user, no_card)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = payment_service::initiate_payment(
        &state,
        &user,
        charge(order_id, PaymentProvider::Iyzico, PaymentMethod::CreditCard, "0.00"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    // Approved charge settles in COMPLETED with the provider transaction id.
    let completed = payment_service::initiate_payment(
        &state,
        &user,
        charge(order_id, PaymentProvider::Iyzico, PaymentMethod::CreditCard, "100.00"),
    )
    .await?
    .data
    .unwrap();
    assert_eq!(completed.status, PaymentStatus::Completed);
    assert!(completed.is_successful());
    assert!(completed.payment_reference.starts_with("PAY-"));
    assert!(completed.provider_transaction_id.is_some());
    assert!(completed.completed_at.is_some());

    // A declined charge is returned as data in FAILED, not raised.
    gateway.set_mode(GatewayMode::Decline);
    let declined = payment_service::initiate_payment(
        &state,
        &user,
        charge(order_id, PaymentProvider::Iyzico, PaymentMethod::CreditCard, "50.00"),
    )
    .await?
    .data
    .unwrap();
    assert_eq!(declined.status, PaymentStatus::Failed);
    assert_eq!(declined.failure_reason.as_deref(), Some("card declined"));
    assert!(declined.failed_at.is_some());

    // So is a gateway blow-up mid-call.
    gateway.set_mode(GatewayMode::Error);
    let errored = payment_service::initiate_payment(
        &state,
        &user,
        charge(order_id, PaymentProvider::Iyzico, PaymentMethod::CreditCard, "50.00"),
    )
    .await?
    .data
    .unwrap();
    assert_eq!(errored.status, PaymentStatus::Failed);
    assert!(
        errored
            .failure_reason
            .as_deref()
            .unwrap()
            .contains("Payment processing error")
    );
    gateway.set_mode(GatewayMode::Approve);

    // Lookups by reference, id, order and user.
    let by_reference =
        payment_service::get_payment_by_reference(&state, &completed.payment_reference)
            .await?
            .data
            .unwrap();
    assert_eq!(by_reference.id, completed.id);

    let by_id = payment_service::get_payment(&state, completed.id).await?.data.unwrap();
    assert_eq!(by_id.payment_reference, completed.payment_reference);

    let err = payment_service::get_payment_by_reference(&state, "PAY-0-MISSING")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    let order_payments = payment_service::list_order_payments(&state, order_id)
        .await?
        .data
        .unwrap();
    assert_eq!(order_payments.items.len(), 3);

    let user_payments = payment_service::list_user_payments(&state, user.user_id, page_query())
        .await?
        .data
        .unwrap();
    assert_eq!(user_payments.items.len(), 3);

    let failed_page =
        payment_service::list_payments_by_status(&state, PaymentStatus::Failed, page_query())
            .await?
            .data
            .unwrap();
    assert_eq!(failed_page.items.len(), 2);

    // Refund guards: over-amount refunds never reach the provider.
    let refunds_before = gateway.refund_call_count();
    let err = payment_service::refund_payment(
        &state,
        refund(&completed.payment_reference, "150.00", "overcharge"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
    assert_eq!(gateway.refund_call_count(), refunds_before);

    // Refunding a failed payment is an invalid state, not a provider call.
    let err = payment_service::refund_payment(
        &state,
        refund(&declined.payment_reference, "10.00", "noop"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    let err = payment_service::refund_payment(&state, refund("PAY-0-MISSING", "10.00", "noop"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    // Partial refunds chain and never go back to COMPLETED.
    let partial = payment_service::refund_payment(
        &state,
        refund(&completed.payment_reference, "40.00", "customer request"),
    )
    .await?
    .data
    .unwrap();
    assert_eq!(partial.status, PaymentStatus::PartialRefund);
    assert_eq!(partial.failure_reason.as_deref(), Some("customer request"));

    let partial_again = payment_service::refund_payment(
        &state,
        refund(&completed.payment_reference, "30.00", "second leg"),
    )
    .await?
    .data
    .unwrap();
    assert_eq!(partial_again.status, PaymentStatus::PartialRefund);

    // Full refund of a fresh completed payment.
    let settled = payment_service::initiate_payment(
        &state,
        &user,
        charge(order_id, PaymentProvider::Iyzico, PaymentMethod::CreditCard, "75.00"),
    )
    .await?
    .data
    .unwrap();
    assert_eq!(settled.status, PaymentStatus::Completed);

    let refunded = payment_service::refund_payment(
        &state,
        refund(&settled.payment_reference, "75.00", "full return"),
    )
    .await?
    .data
    .unwrap();
    assert_eq!(refunded.status, PaymentStatus::Refunded);

    // Provider-side refund failure surfaces as a hard error and the payment
    // keeps its settled state.
    let kept = payment_service::initiate_payment(
        &state,
        &user,
        charge(order_id, PaymentProvider::Iyzico, PaymentMethod::CreditCard, "60.00"),
    )
    .await?
    .data
    .unwrap();
    gateway.set_mode(GatewayMode::Decline);
    let err = payment_service::refund_payment(
        &state,
        refund(&kept.payment_reference, "60.00", "declined refund"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::ProviderError(_)));
    gateway.set_mode(GatewayMode::Approve);
    let kept_reloaded = payment_service::get_payment_by_reference(&state, &kept.payment_reference)
        .await?
        .data
        .unwrap();
    assert_eq!(kept_reloaded.status, PaymentStatus::Completed);

    // Callbacks resolve payments stuck in PROCESSING and are idempotent after
    // settlement.
    let stuck_tx = "CB-TX-1";
    insert_processing_payment(&state, &user, order_id, stuck_tx).await?;

    let resolved = payment_service::handle_callback(
        &state,
        stuck_tx,
        "{\"status\":\"SUCCESS\"}".to_string(),
    )
    .await?
    .data
    .unwrap();
    assert_eq!(resolved.status, PaymentStatus::Completed);
    let first_completed_at = resolved.completed_at;

    let replayed = payment_service::handle_callback(
        &state,
        stuck_tx,
        "{\"status\":\"SUCCESS\"}".to_string(),
    )
    .await?
    .data
    .unwrap();
    assert_eq!(replayed.status, PaymentStatus::Completed);
    assert_eq!(replayed.completed_at, first_completed_at);

    let stuck_failing_tx = "CB-TX-2";
    insert_processing_payment(&state, &user, order_id, stuck_failing_tx).await?;
    let failed_by_callback = payment_service::handle_callback(
        &state,
        stuck_failing_tx,
        "{\"status\":\"FAILED\"}".to_string(),
    )
    .await?
    .data
    .unwrap();
    assert_eq!(failed_by_callback.status, PaymentStatus::Failed);

    // Unrecognized markers leave the payment untouched.
    let stuck_unknown_tx = "CB-TX-3";
    insert_processing_payment(&state, &user, order_id, stuck_unknown_tx).await?;
    let untouched = payment_service::handle_callback(
        &state,
        stuck_unknown_tx,
        "{\"status\":\"pending-review\"}".to_string(),
    )
    .await?
    .data
    .unwrap();
    assert_eq!(untouched.status, PaymentStatus::Processing);

    let err = payment_service::handle_callback(&state, "CB-TX-MISSING", "SUCCESS".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    // Retry sweep: every failed or cancelled payment gets one fresh attempt.
    let retryable = payment_service::list_retryable_payments(&state, user.user_id)
        .await?
        .data
        .unwrap();
    assert!(!retryable.items.is_empty());
    assert!(retryable.items.iter().all(|p| p.can_retry()));
    let eligible_count = retryable.items.len();

    let attempts = payment_service::retry_payments(&state, user.user_id)
        .await?
        .data
        .unwrap();
    assert_eq!(attempts.items.len(), eligible_count);
    assert!(
        attempts
            .items
            .iter()
            .all(|p| p.status == PaymentStatus::Completed)
    );
    // Originals stay in their terminal states; the sweep only adds attempts.
    let declined_reloaded =
        payment_service::get_payment_by_reference(&state, &declined.payment_reference)
            .await?
            .data
            .unwrap();
    assert_eq!(declined_reloaded.status, PaymentStatus::Failed);

    Ok(())
}

fn charge(
    order_id: Uuid,
    provider: PaymentProvider,
    method: PaymentMethod,
    amount: &str,
) -> InitiatePaymentRequest {
    InitiatePaymentRequest {
        order_id,
        amount: dec(amount),
        currency: "TRY".into(),
        provider,
        method,
        customer_email: "buyer@example.com".into(),
        customer_name: Some("Ayse Yilmaz".into()),
        card_details: Some(CardDetails {
            card_holder_name: "Ayse Yilmaz".into(),
            card_number: "5528790000000008".into(),
            expire_month: "12".into(),
            expire_year: "2030".into(),
            cvc: "123".into(),
        }),
        billing_address: BillingAddress {
            contact_name: "Ayse Yilmaz".into(),
            city: "Istanbul".into(),
            country: "Turkey".into(),
            address: "Nidakule Gkstrk Mah.".into(),
            zip_code: "34732".into(),
        },
        callback_url: None,
        ip_address: Some("85.34.78.112".into()),
    }
}

fn refund(reference: &str, amount: &str, reason: &str) -> RefundPaymentRequest {
    RefundPaymentRequest {
        payment_reference: reference.into(),
        amount: dec(amount),
        reason: reason.into(),
    }
}

fn page_query() -> axum_checkout_api::routes::params::PaymentListQuery {
    axum_checkout_api::routes::params::PaymentListQuery {
        pagination: axum_checkout_api::routes::params::Pagination {
            page: Some(1),
            per_page: Some(50),
        },
    }
}

fn dec(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).unwrap()
}

async fn insert_processing_payment(
    state: &AppState,
    user: &CurrentUser,
    order_id: Uuid,
    transaction_id: &str,
) -> anyhow::Result<()> {
    let now = Utc::now();
    PaymentActive {
        id: Set(Uuid::new_v4()),
        payment_reference: Set(format!("PAY-{}-{}", now.timestamp_millis(), transaction_id)),
        order_id: Set(order_id),
        user_id: Set(user.user_id),
        amount: Set(dec("25.00")),
        currency: Set("TRY".into()),
        status: Set(PaymentStatus::Processing.as_str().into()),
        provider: Set(PaymentProvider::Iyzico.as_str().into()),
        method: Set(PaymentMethod::CreditCard.as_str().into()),
        provider_transaction_id: Set(Some(transaction_id.into())),
        provider_response: Set(None),
        failure_reason: Set(None),
        customer_email: Set(Some("buyer@example.com".into())),
        customer_name: Set(None),
        ip_address: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
        completed_at: Set(None),
        failed_at: Set(None),
    }
    .insert(&state.orm)
    .await?;
    Ok(())
}

async fn setup_state(database_url: &str) -> anyhow::Result<(AppState, InMemoryGateway)> {
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

    let gateway = InMemoryGateway::new(
        PaymentProvider::Iyzico,
        vec![PaymentMethod::CreditCard, PaymentMethod::DebitCard],
    );
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(gateway.clone()));

    let state = AppState {
        pool,
        orm,
        inventory: Arc::new(InMemoryInventoryClient::new()),
        providers: Arc::new(registry),
        compensate_stock_on_abort: false,
    };
    Ok((state, gateway))
}
