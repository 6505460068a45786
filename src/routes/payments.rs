use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::payments::{CallbackQuery, InitiatePaymentRequest, PaymentList, RefundPaymentRequest},
    error::AppResult,
    middleware::auth::CurrentUser,
    models::{Payment, PaymentStatus},
    response::ApiResponse,
    routes::params::PaymentListQuery,
    services::payment_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(initiate_payment))
        .route("/refund", post(refund_payment))
        .route("/callback", post(handle_callback))
        .route("/reference/{reference}", get(get_payment_by_reference))
        .route("/order/{order_id}", get(list_order_payments))
        .route("/user/{user_id}", get(list_user_payments))
        .route("/status/{status}", get(list_payments_by_status))
        .route("/retryable/{user_id}", get(list_retryable_payments))
        .route("/retry/{user_id}", post(retry_payments))
        .route("/{id}", get(get_payment))
}

#[utoipa::path(post, path = "/payments", tag = "Payments")]
pub async fn initiate_payment(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<InitiatePaymentRequest>,
) -> AppResult<Json<ApiResponse<Payment>>> {
    let response = payment_service::initiate_payment(&state, &user, payload).await?;
    Ok(Json(response))
}

#[utoipa::path(get, path = "/payments/{id}", tag = "Payments")]
pub async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Payment>>> {
    let response = payment_service::get_payment(&state, id).await?;
    Ok(Json(response))
}

#[utoipa::path(get, path = "/payments/reference/{reference}", tag = "Payments")]
pub async fn get_payment_by_reference(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> AppResult<Json<ApiResponse<Payment>>> {
    let response = payment_service::get_payment_by_reference(&state, &reference).await?;
    Ok(Json(response))
}

#[utoipa::path(get, path = "/payments/order/{order_id}", tag = "Payments")]
pub async fn list_order_payments(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<PaymentList>>> {
    let response = payment_service::list_order_payments(&state, order_id).await?;
    Ok(Json(response))
}

#[utoipa::path(get, path = "/payments/user/{user_id}", tag = "Payments")]
pub async fn list_user_payments(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<PaymentListQuery>,
) -> AppResult<Json<ApiResponse<PaymentList>>> {
    let response = payment_service::list_user_payments(&state, user_id, query).await?;
    Ok(Json(response))
}

#[utoipa::path(get, path = "/payments/status/{status}", tag = "Payments")]
pub async fn list_payments_by_status(
    State(state): State<AppState>,
    Path(status): Path<PaymentStatus>,
    Query(query): Query<PaymentListQuery>,
) -> AppResult<Json<ApiResponse<PaymentList>>> {
    let response = payment_service::list_payments_by_status(&state, status, query).await?;
    Ok(Json(response))
}

#[utoipa::path(post, path = "/payments/refund", tag = "Payments")]
pub async fn refund_payment(
    State(state): State<AppState>,
    Json(payload): Json<RefundPaymentRequest>,
) -> AppResult<Json<ApiResponse<Payment>>> {
    let response = payment_service::refund_payment(&state, payload).await?;
    Ok(Json(response))
}

#[utoipa::path(post, path = "/payments/callback", tag = "Payments")]
pub async fn handle_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    body: String,
) -> AppResult<Json<ApiResponse<Payment>>> {
    let response = payment_service::handle_callback(&state, &query.transaction_id, body).await?;
    Ok(Json(response))
}

#[utoipa::path(get, path = "/payments/retryable/{user_id}", tag = "Payments")]
pub async fn list_retryable_payments(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<PaymentList>>> {
    let response = payment_service::list_retryable_payments(&state, user_id).await?;
    Ok(Json(response))
}

#[utoipa::path(post, path = "/payments/retry/{user_id}", tag = "Payments")]
pub async fn retry_payments(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<PaymentList>>> {
    let response = payment_service::retry_payments(&state, user_id).await?;
    Ok(Json(response))
}
