use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Payment, PaymentMethod, PaymentProvider};
use crate::providers::{BillingAddress, CardDetails};

#[derive(Debug, Deserialize, ToSchema)]
pub struct InitiatePaymentRequest {
    pub order_id: Uuid,
    #[schema(value_type = String)]
    pub amount: BigDecimal,
    /// ISO 4217 code, e.g. TRY or USD.
    pub currency: String,
    pub provider: PaymentProvider,
    pub method: PaymentMethod,
    pub customer_email: String,
    pub customer_name: Option<String>,
    pub card_details: Option<CardDetails>,
    pub billing_address: BillingAddress,
    pub callback_url: Option<String>,
    pub ip_address: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefundPaymentRequest {
    pub payment_reference: String,
    #[schema(value_type = String)]
    pub amount: BigDecimal,
    pub reason: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CallbackQuery {
    pub transaction_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentList {
    pub items: Vec<Payment>,
}
