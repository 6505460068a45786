use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(OrderStatus::Pending),
            "CONFIRMED" => Some(OrderStatus::Confirmed),
            "PROCESSING" => Some(OrderStatus::Processing),
            "SHIPPED" => Some(OrderStatus::Shipped),
            "DELIVERED" => Some(OrderStatus::Delivered),
            "CANCELLED" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    /// An order may only be cancelled before fulfillment starts.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Confirmed)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    #[schema(value_type = String)]
    pub total_amount: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub product_sku: Option<String>,
    pub quantity: i32,
    #[schema(value_type = String)]
    pub price_at_purchase: BigDecimal,
    #[schema(value_type = String)]
    pub subtotal: BigDecimal,
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    /// Builds a line item snapshot. The subtotal is derived here, once, and the
    /// stored value is authoritative from then on.
    pub fn new(
        order_id: Uuid,
        product_id: Uuid,
        product_name: impl Into<String>,
        product_sku: Option<String>,
        quantity: i32,
        price_at_purchase: BigDecimal,
        now: DateTime<Utc>,
    ) -> Self {
        let subtotal = &price_at_purchase * BigDecimal::from(quantity);
        Self {
            id: Uuid::new_v4(),
            order_id,
            product_id,
            product_name: product_name.into(),
            product_sku,
            quantity,
            price_at_purchase,
            subtotal,
            created_at: now,
        }
    }
}

/// Sum of line item subtotals; the order total is fixed at creation time.
pub fn total_amount(items: &[OrderItem]) -> BigDecimal {
    items
        .iter()
        .fold(BigDecimal::from(0), |acc, item| acc + &item.subtotal)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentProvider {
    Iyzico,
    Stripe,
    Paypal,
}

impl PaymentProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentProvider::Iyzico => "IYZICO",
            PaymentProvider::Stripe => "STRIPE",
            PaymentProvider::Paypal => "PAYPAL",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "IYZICO" => Some(PaymentProvider::Iyzico),
            "STRIPE" => Some(PaymentProvider::Stripe),
            "PAYPAL" => Some(PaymentProvider::Paypal),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    CreditCard,
    DebitCard,
    BankTransfer,
    DigitalWallet,
    CashOnDelivery,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "CREDIT_CARD",
            PaymentMethod::DebitCard => "DEBIT_CARD",
            PaymentMethod::BankTransfer => "BANK_TRANSFER",
            PaymentMethod::DigitalWallet => "DIGITAL_WALLET",
            PaymentMethod::CashOnDelivery => "CASH_ON_DELIVERY",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CREDIT_CARD" => Some(PaymentMethod::CreditCard),
            "DEBIT_CARD" => Some(PaymentMethod::DebitCard),
            "BANK_TRANSFER" => Some(PaymentMethod::BankTransfer),
            "DIGITAL_WALLET" => Some(PaymentMethod::DigitalWallet),
            "CASH_ON_DELIVERY" => Some(PaymentMethod::CashOnDelivery),
            _ => None,
        }
    }

    pub fn is_card(&self) -> bool {
        matches!(self, PaymentMethod::CreditCard | PaymentMethod::DebitCard)
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Refunded,
    PartialRefund,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Cancelled => "CANCELLED",
            PaymentStatus::Refunded => "REFUNDED",
            PaymentStatus::PartialRefund => "PARTIAL_REFUND",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(PaymentStatus::Pending),
            "PROCESSING" => Some(PaymentStatus::Processing),
            "COMPLETED" => Some(PaymentStatus::Completed),
            "FAILED" => Some(PaymentStatus::Failed),
            "CANCELLED" => Some(PaymentStatus::Cancelled),
            "REFUNDED" => Some(PaymentStatus::Refunded),
            "PARTIAL_REFUND" => Some(PaymentStatus::PartialRefund),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle guard was violated. Carries the attempted action and the status
/// the payment was actually in.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {action} a payment in {status} status")]
pub struct InvalidTransition {
    pub action: &'static str,
    pub status: PaymentStatus,
}

impl InvalidTransition {
    fn new(action: &'static str, status: PaymentStatus) -> Self {
        Self { action, status }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Payment {
    pub id: Uuid,
    pub payment_reference: String,
    pub order_id: Uuid,
    pub user_id: Uuid,
    #[schema(value_type = String)]
    pub amount: BigDecimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub provider: PaymentProvider,
    pub method: PaymentMethod,
    pub provider_transaction_id: Option<String>,
    pub provider_response: Option<String>,
    pub failure_reason: Option<String>,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

/// Lifecycle transitions. Each one consumes the current value and hands back
/// either the next state or the guard violation, so the whole machine can be
/// exercised without a database.
impl Payment {
    /// PENDING -> PROCESSING, taken right before the provider call.
    pub fn mark_processing(mut self) -> Result<Self, InvalidTransition> {
        if self.status != PaymentStatus::Pending {
            return Err(InvalidTransition::new("mark as processing", self.status));
        }
        self.status = PaymentStatus::Processing;
        Ok(self)
    }

    /// PROCESSING -> COMPLETED. Records the provider transaction id exactly once.
    pub fn complete(
        mut self,
        transaction_id: impl Into<String>,
        raw_response: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, InvalidTransition> {
        if self.status != PaymentStatus::Processing {
            return Err(InvalidTransition::new("complete", self.status));
        }
        self.status = PaymentStatus::Completed;
        self.provider_transaction_id = Some(transaction_id.into());
        self.provider_response = raw_response;
        self.completed_at = Some(now);
        Ok(self)
    }

    /// Moves to FAILED. A completed or refunded payment can no longer fail.
    pub fn fail(
        mut self,
        reason: impl Into<String>,
        raw_response: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, InvalidTransition> {
        if matches!(
            self.status,
            PaymentStatus::Completed | PaymentStatus::Refunded
        ) {
            return Err(InvalidTransition::new("fail", self.status));
        }
        self.status = PaymentStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.provider_response = raw_response;
        self.failed_at = Some(now);
        Ok(self)
    }

    pub fn cancel(mut self) -> Result<Self, InvalidTransition> {
        if matches!(
            self.status,
            PaymentStatus::Completed | PaymentStatus::Refunded
        ) {
            return Err(InvalidTransition::new("cancel", self.status));
        }
        self.status = PaymentStatus::Cancelled;
        Ok(self)
    }

    /// COMPLETED -> REFUNDED, the full-amount path.
    pub fn refund(mut self) -> Result<Self, InvalidTransition> {
        if self.status != PaymentStatus::Completed {
            return Err(InvalidTransition::new("refund", self.status));
        }
        self.status = PaymentStatus::Refunded;
        Ok(self)
    }

    /// COMPLETED or PARTIAL_REFUND -> PARTIAL_REFUND. Further partial refunds
    /// stay in PARTIAL_REFUND; there is no way back to COMPLETED.
    pub fn partial_refund(mut self) -> Result<Self, InvalidTransition> {
        if !matches!(
            self.status,
            PaymentStatus::Completed | PaymentStatus::PartialRefund
        ) {
            return Err(InvalidTransition::new("partially refund", self.status));
        }
        self.status = PaymentStatus::PartialRefund;
        Ok(self)
    }

    pub fn is_final(&self) -> bool {
        matches!(
            self.status,
            PaymentStatus::Completed
                | PaymentStatus::Failed
                | PaymentStatus::Cancelled
                | PaymentStatus::Refunded
        )
    }

    pub fn is_successful(&self) -> bool {
        self.status == PaymentStatus::Completed
    }

    pub fn can_retry(&self) -> bool {
        matches!(
            self.status,
            PaymentStatus::Failed | PaymentStatus::Cancelled
        )
    }
}
