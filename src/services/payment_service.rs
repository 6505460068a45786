use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    db::OrmConn,
    dto::payments::{InitiatePaymentRequest, PaymentList, RefundPaymentRequest},
    entity::payments::{
        ActiveModel as PaymentActive, Column as PaymentCol, Entity as Payments,
        Model as PaymentModel,
    },
    error::{AppError, AppResult},
    middleware::auth::CurrentUser,
    models::{Payment, PaymentMethod, PaymentProvider, PaymentStatus},
    providers::{GatewayRequest, PaymentGateway},
    response::{ApiResponse, Meta},
    routes::params::PaymentListQuery,
    state::AppState,
};

/// Creates a payment and drives it through the provider synchronously.
///
/// Provider declines and transport failures during this call are recorded on
/// the payment and returned as data; the caller has to inspect the status.
pub async fn initiate_payment(
    state: &AppState,
    user: &CurrentUser,
    payload: InitiatePaymentRequest,
) -> AppResult<ApiResponse<Payment>> {
    tracing::info!(order_id = %payload.order_id, provider = %payload.provider, "initiating payment");

    if payload.amount <= BigDecimal::from(0) {
        return Err(AppError::BadRequest(
            "Amount must be greater than zero".into(),
        ));
    }
    if payload.currency.len() != 3 {
        return Err(AppError::BadRequest(
            "Currency must be a 3-letter ISO 4217 code".into(),
        ));
    }
    if payload.method.is_card() && payload.card_details.is_none() {
        return Err(AppError::BadRequest(
            "Card details are required for card payments".into(),
        ));
    }

    let gateway = state
        .providers
        .get(payload.provider)
        .ok_or_else(|| AppError::ProviderNotSupported(payload.provider.to_string()))?;

    if !gateway.supports_method(payload.method) {
        return Err(AppError::MethodNotSupported {
            provider: payload.provider.to_string(),
            method: payload.method.to_string(),
        });
    }

    let now = Utc::now();
    let payment = Payment {
        id: Uuid::new_v4(),
        payment_reference: build_payment_reference(),
        order_id: payload.order_id,
        user_id: user.user_id,
        amount: payload.amount.clone(),
        currency: payload.currency.clone(),
        status: PaymentStatus::Pending,
        provider: payload.provider,
        method: payload.method,
        provider_transaction_id: None,
        provider_response: None,
        failure_reason: None,
        customer_email: Some(payload.customer_email.clone()),
        customer_name: payload.customer_name.clone(),
        ip_address: payload.ip_address.clone(),
        created_at: now,
        updated_at: now,
        completed_at: None,
        failed_at: None,
    };
    let payment = insert_payment(&state.orm, payment).await?;

    let request = GatewayRequest {
        payment_reference: payment.payment_reference.clone(),
        amount: payload.amount,
        currency: payload.currency,
        method: payload.method,
        customer_email: Some(payload.customer_email),
        customer_name: payload.customer_name,
        card_details: payload.card_details,
        billing_address: Some(payload.billing_address),
        callback_url: payload.callback_url,
        ip_address: payload.ip_address,
    };

    let payment = drive_provider_call(&state.orm, gateway, payment, request).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "payment_initiate",
        Some("payments"),
        Some(serde_json::json!({
            "payment_id": payment.id,
            "status": payment.status,
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Payment initiated",
        payment,
        Some(Meta::empty()),
    ))
}

pub async fn get_payment(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Payment>> {
    let payment = Payments::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(ApiResponse::success(
        "Payment",
        payment_from_entity(payment)?,
        None,
    ))
}

pub async fn get_payment_by_reference(
    state: &AppState,
    reference: &str,
) -> AppResult<ApiResponse<Payment>> {
    let payment = find_by_reference(&state.orm, reference).await?;
    Ok(ApiResponse::success("Payment", payment, None))
}

pub async fn list_order_payments(
    state: &AppState,
    order_id: Uuid,
) -> AppResult<ApiResponse<PaymentList>> {
    let items = Payments::find()
        .filter(PaymentCol::OrderId.eq(order_id))
        .order_by_desc(PaymentCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(payment_from_entity)
        .collect::<AppResult<Vec<Payment>>>()?;

    Ok(ApiResponse::success(
        "Payments",
        PaymentList { items },
        Some(Meta::empty()),
    ))
}

pub async fn list_user_payments(
    state: &AppState,
    user_id: Uuid,
    query: PaymentListQuery,
) -> AppResult<ApiResponse<PaymentList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let finder = Payments::find()
        .filter(PaymentCol::UserId.eq(user_id))
        .order_by_desc(PaymentCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(payment_from_entity)
        .collect::<AppResult<Vec<Payment>>>()?;

    Ok(ApiResponse::success(
        "Payments",
        PaymentList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn list_payments_by_status(
    state: &AppState,
    status: PaymentStatus,
    query: PaymentListQuery,
) -> AppResult<ApiResponse<PaymentList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let finder = Payments::find()
        .filter(PaymentCol::Status.eq(status.as_str()))
        .order_by_desc(PaymentCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(payment_from_entity)
        .collect::<AppResult<Vec<Payment>>>()?;

    Ok(ApiResponse::success(
        "Payments",
        PaymentList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn list_retryable_payments(
    state: &AppState,
    user_id: Uuid,
) -> AppResult<ApiResponse<PaymentList>> {
    let items = find_retryable(&state.orm, user_id)
        .await?
        .into_iter()
        .map(payment_from_entity)
        .collect::<AppResult<Vec<Payment>>>()?;

    Ok(ApiResponse::success(
        "Retryable payments",
        PaymentList { items },
        Some(Meta::empty()),
    ))
}

/// Bulk sweep over a user's failed and cancelled payments. Every eligible
/// payment gets a fresh attempt with a new reference that re-runs the provider
/// call; the original rows are left untouched.
pub async fn retry_payments(state: &AppState, user_id: Uuid) -> AppResult<ApiResponse<PaymentList>> {
    let eligible = find_retryable(&state.orm, user_id).await?;
    tracing::info!(user_id = %user_id, count = eligible.len(), "retrying payments");

    let mut attempts: Vec<Payment> = Vec::with_capacity(eligible.len());

    for model in eligible {
        let previous = payment_from_entity(model)?;
        let gateway = match state.providers.get(previous.provider) {
            Some(gateway) => gateway,
            None => {
                tracing::warn!(
                    reference = %previous.payment_reference,
                    provider = %previous.provider,
                    "skipping retry, provider not registered"
                );
                continue;
            }
        };

        let now = Utc::now();
        let attempt = Payment {
            id: Uuid::new_v4(),
            payment_reference: build_payment_reference(),
            order_id: previous.order_id,
            user_id: previous.user_id,
            amount: previous.amount.clone(),
            currency: previous.currency.clone(),
            status: PaymentStatus::Pending,
            provider: previous.provider,
            method: previous.method,
            provider_transaction_id: None,
            provider_response: None,
            failure_reason: None,
            customer_email: previous.customer_email.clone(),
            customer_name: previous.customer_name.clone(),
            ip_address: previous.ip_address.clone(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            failed_at: None,
        };
        let attempt = insert_payment(&state.orm, attempt).await?;

        let request = GatewayRequest {
            payment_reference: attempt.payment_reference.clone(),
            amount: attempt.amount.clone(),
            currency: attempt.currency.clone(),
            method: attempt.method,
            customer_email: attempt.customer_email.clone(),
            customer_name: attempt.customer_name.clone(),
            card_details: None,
            billing_address: None,
            callback_url: None,
            ip_address: attempt.ip_address.clone(),
        };

        let attempt = drive_provider_call(&state.orm, gateway, attempt, request).await?;
        attempts.push(attempt);
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user_id),
        "payment_retry",
        Some("payments"),
        Some(serde_json::json!({ "attempts": attempts.len() })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Retry sweep finished",
        PaymentList { items: attempts },
        Some(Meta::empty()),
    ))
}

/// Refunds a settled payment, fully or partially, through its original
/// provider transaction. Unlike initiation, provider failures here surface as
/// hard errors instead of being persisted on the payment.
pub async fn refund_payment(
    state: &AppState,
    payload: RefundPaymentRequest,
) -> AppResult<ApiResponse<Payment>> {
    tracing::info!(reference = %payload.payment_reference, "processing refund");

    if payload.amount <= BigDecimal::from(0) {
        return Err(AppError::BadRequest(
            "Refund amount must be greater than zero".into(),
        ));
    }

    let payment = find_by_reference(&state.orm, &payload.payment_reference).await?;

    let refundable = payment.is_successful() || payment.status == PaymentStatus::PartialRefund;
    if !refundable {
        return Err(AppError::InvalidState(format!(
            "Cannot refund payment with status: {}",
            payment.status
        )));
    }
    if payload.amount > payment.amount {
        return Err(AppError::InvalidState(
            "Refund amount cannot exceed original payment amount".into(),
        ));
    }

    let gateway = state
        .providers
        .get(payment.provider)
        .ok_or_else(|| AppError::ProviderNotSupported(payment.provider.to_string()))?;

    let transaction_id = payment
        .provider_transaction_id
        .clone()
        .ok_or_else(|| AppError::InvalidState("Payment has no provider transaction id".into()))?;

    let response = gateway
        .refund_payment(&transaction_id, &payload.amount)
        .await
        .map_err(|err| AppError::ProviderError(format!("Failed to process refund: {err}")))?;

    if !response.success {
        return Err(AppError::ProviderError(format!(
            "Refund failed: {}",
            response.failure_reason()
        )));
    }

    let previous_status = payment.status;
    let full_refund = payload.amount == payment.amount;
    let mut payment = if full_refund {
        payment.refund()?
    } else {
        payment.partial_refund()?
    };
    payment.failure_reason = Some(payload.reason);
    persist_transition(&state.orm, &mut payment, previous_status).await?;

    tracing::info!(reference = %payment.payment_reference, full_refund, "refund processed");

    if let Err(err) = log_audit(
        &state.pool,
        Some(payment.user_id),
        "payment_refund",
        Some("payments"),
        Some(serde_json::json!({
            "payment_id": payment.id,
            "full_refund": full_refund,
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Refund processed",
        payment,
        Some(Meta::empty()),
    ))
}

/// Applies an asynchronous provider notification. Only payments still in
/// PROCESSING are mutated; replayed or late callbacks fall through untouched.
pub async fn handle_callback(
    state: &AppState,
    transaction_id: &str,
    raw_payload: String,
) -> AppResult<ApiResponse<Payment>> {
    tracing::info!(transaction_id, "handling payment callback");

    let model = Payments::find()
        .filter(PaymentCol::ProviderTransactionId.eq(transaction_id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let payment = payment_from_entity(model)?;

    let payment = if payment.status == PaymentStatus::Processing {
        let now = Utc::now();
        // Markers are matched on the raw payload; provider-specific schemas
        // are not parsed here.
        let updated = if raw_payload.contains("SUCCESS") || raw_payload.contains("COMPLETED") {
            Some(payment.clone().complete(transaction_id, Some(raw_payload), now)?)
        } else if raw_payload.contains("FAILED") {
            Some(payment.clone().fail(
                "Payment failed from provider callback",
                Some(raw_payload),
                now,
            )?)
        } else {
            None
        };

        match updated {
            Some(mut updated) => {
                persist_transition(&state.orm, &mut updated, PaymentStatus::Processing).await?;
                if let Err(err) = log_audit(
                    &state.pool,
                    Some(updated.user_id),
                    "payment_callback",
                    Some("payments"),
                    Some(serde_json::json!({
                        "payment_id": updated.id,
                        "status": updated.status,
                    })),
                )
                .await
                {
                    tracing::warn!(error = %err, "audit log failed");
                }
                updated
            }
            None => payment,
        }
    } else {
        payment
    };

    Ok(ApiResponse::success(
        "Callback processed",
        payment,
        Some(Meta::empty()),
    ))
}

/// Marks the payment processing, calls the provider, and settles the outcome.
/// Adapter declines and errors land in FAILED; only persistence failures
/// propagate.
async fn drive_provider_call(
    orm: &OrmConn,
    gateway: Arc<dyn PaymentGateway>,
    payment: Payment,
    request: GatewayRequest,
) -> AppResult<Payment> {
    let mut payment = payment.mark_processing()?;
    persist_transition(orm, &mut payment, PaymentStatus::Pending).await?;

    let now = Utc::now();
    let mut payment = match gateway.process_payment(&request).await {
        Ok(response) if response.success => match response.transaction_id.clone() {
            Some(transaction_id) => {
                let payment = payment.complete(transaction_id, response.raw_response, now)?;
                tracing::info!(
                    reference = %payment.payment_reference,
                    transaction_id = payment.provider_transaction_id.as_deref(),
                    "payment completed"
                );
                payment
            }
            None => payment.fail(
                "Provider returned success without a transaction id",
                response.raw_response,
                now,
            )?,
        },
        Ok(response) => {
            let reason = response.failure_reason();
            tracing::warn!(reference = %payment.payment_reference, %reason, "payment declined");
            payment.fail(reason, response.raw_response, now)?
        }
        Err(err) => {
            tracing::error!(reference = %payment.payment_reference, error = %err, "payment processing error");
            payment.fail(format!("Payment processing error: {err}"), None, now)?
        }
    };

    persist_transition(orm, &mut payment, PaymentStatus::Processing).await?;
    Ok(payment)
}

async fn find_by_reference(orm: &OrmConn, reference: &str) -> AppResult<Payment> {
    let model = Payments::find()
        .filter(PaymentCol::PaymentReference.eq(reference))
        .one(orm)
        .await?
        .ok_or(AppError::NotFound)?;
    payment_from_entity(model)
}

async fn find_retryable(orm: &OrmConn, user_id: Uuid) -> AppResult<Vec<PaymentModel>> {
    let models = Payments::find()
        .filter(
            Condition::all()
                .add(PaymentCol::UserId.eq(user_id))
                .add(
                    PaymentCol::Status.is_in([
                        PaymentStatus::Failed.as_str(),
                        PaymentStatus::Cancelled.as_str(),
                    ]),
                ),
        )
        .order_by_desc(PaymentCol::CreatedAt)
        .all(orm)
        .await?;
    Ok(models)
}

async fn insert_payment(orm: &OrmConn, payment: Payment) -> AppResult<Payment> {
    let model = PaymentActive {
        id: Set(payment.id),
        payment_reference: Set(payment.payment_reference.clone()),
        order_id: Set(payment.order_id),
        user_id: Set(payment.user_id),
        amount: Set(payment.amount.clone()),
        currency: Set(payment.currency.clone()),
        status: Set(payment.status.as_str().to_string()),
        provider: Set(payment.provider.as_str().to_string()),
        method: Set(payment.method.as_str().to_string()),
        provider_transaction_id: Set(payment.provider_transaction_id.clone()),
        provider_response: Set(payment.provider_response.clone()),
        failure_reason: Set(payment.failure_reason.clone()),
        customer_email: Set(payment.customer_email.clone()),
        customer_name: Set(payment.customer_name.clone()),
        ip_address: Set(payment.ip_address.clone()),
        created_at: Set(payment.created_at.into()),
        updated_at: Set(payment.updated_at.into()),
        completed_at: Set(payment.completed_at.map(Into::into)),
        failed_at: Set(payment.failed_at.map(Into::into)),
    }
    .insert(orm)
    .await?;
    payment_from_entity(model)
}

/// Single-row compare-and-set on the payment status. Two racing transitions
/// cannot both pass; the loser gets an invalid-state error instead of
/// overwriting a settled row.
async fn persist_transition(
    orm: &OrmConn,
    payment: &mut Payment,
    expected: PaymentStatus,
) -> AppResult<()> {
    payment.updated_at = Utc::now();
    let result = Payments::update_many()
        .col_expr(PaymentCol::Status, Expr::value(payment.status.as_str()))
        .col_expr(
            PaymentCol::ProviderTransactionId,
            Expr::value(payment.provider_transaction_id.clone()),
        )
        .col_expr(
            PaymentCol::ProviderResponse,
            Expr::value(payment.provider_response.clone()),
        )
        .col_expr(
            PaymentCol::FailureReason,
            Expr::value(payment.failure_reason.clone()),
        )
        .col_expr(PaymentCol::CompletedAt, Expr::value(payment.completed_at))
        .col_expr(PaymentCol::FailedAt, Expr::value(payment.failed_at))
        .col_expr(PaymentCol::UpdatedAt, Expr::value(payment.updated_at))
        .filter(PaymentCol::Id.eq(payment.id))
        .filter(PaymentCol::Status.eq(expected.as_str()))
        .exec(orm)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::InvalidState(
            "Payment was modified concurrently".into(),
        ));
    }
    Ok(())
}

fn payment_from_entity(model: PaymentModel) -> AppResult<Payment> {
    let status = PaymentStatus::parse(&model.status)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown payment status: {}", model.status)))?;
    let provider = PaymentProvider::parse(&model.provider).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!("unknown payment provider: {}", model.provider))
    })?;
    let method = PaymentMethod::parse(&model.method).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!("unknown payment method: {}", model.method))
    })?;

    Ok(Payment {
        id: model.id,
        payment_reference: model.payment_reference,
        order_id: model.order_id,
        user_id: model.user_id,
        amount: model.amount,
        currency: model.currency,
        status,
        provider,
        method,
        provider_transaction_id: model.provider_transaction_id,
        provider_response: model.provider_response,
        failure_reason: model.failure_reason,
        customer_email: model.customer_email,
        customer_name: model.customer_name,
        ip_address: model.ip_address,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
        completed_at: model.completed_at.map(|dt| dt.with_timezone(&Utc)),
        failed_at: model.failed_at.map(|dt| dt.with_timezone(&Utc)),
    })
}

/// `PAY-<millis>-<random>`: readable, sortable, and unique under concurrent
/// creation thanks to the random suffix.
fn build_payment_reference() -> String {
    let timestamp = Utc::now().timestamp_millis();
    let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("PAY-{timestamp}-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::build_payment_reference;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    #[test]
    fn payment_reference_format_and_uniqueness() {
        let first = build_payment_reference();
        let second = build_payment_reference();

        assert!(first.starts_with("PAY-"));
        let parts: Vec<&str> = first.splitn(3, '-').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 8);
        assert_ne!(first, second);
    }

    #[test]
    fn amount_equality_ignores_trailing_scale() {
        let stored = BigDecimal::from_str("100.00").unwrap();
        let requested = BigDecimal::from_str("100").unwrap();
        assert_eq!(stored, requested);
        assert!(BigDecimal::from_str("40.00").unwrap() < stored);
    }
}
