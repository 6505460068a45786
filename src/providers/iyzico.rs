//! Iyzico gateway adapter: translates generic charge/refund requests into the
//! Iyzico REST wire format and back.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::IyzicoConfig;
use crate::models::{PaymentMethod, PaymentProvider};
use crate::providers::{GatewayError, GatewayRequest, GatewayResponse, PaymentGateway};

pub struct IyzicoGateway {
    http: reqwest::Client,
    config: IyzicoConfig,
}

impl IyzicoGateway {
    pub fn new(config: IyzicoConfig) -> Self {
        tracing::info!(base_url = %config.base_url, "initialized Iyzico gateway");
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn credentials(&self) -> String {
        let pair = format!("{}:{}", self.config.api_key, self.config.secret_key);
        format!("Basic {}", BASE64.encode(pair))
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<String, GatewayError> {
        let url = format!("{}{}", self.config.base_url, path);
        let response = self
            .http
            .post(&url)
            .header("Authorization", self.credentials())
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError(format!("Iyzico request failed: {e}")))?;

        response
            .text()
            .await
            .map_err(|e| GatewayError(format!("Iyzico response unreadable: {e}")))
    }

    fn build_auth_request(&self, request: &GatewayRequest) -> Result<AuthRequest, GatewayError> {
        let billing = request
            .billing_address
            .as_ref()
            .ok_or_else(|| GatewayError("billing address is required".to_string()))?;

        let payment_card = request.card_details.as_ref().map(|card| WireCard {
            card_holder_name: card.card_holder_name.clone(),
            card_number: card.card_number.clone(),
            expire_month: card.expire_month.clone(),
            expire_year: card.expire_year.clone(),
            cvc: card.cvc.clone(),
        });

        let address = WireAddress {
            contact_name: billing.contact_name.clone(),
            city: billing.city.clone(),
            country: billing.country.clone(),
            address: billing.address.clone(),
            zip_code: billing.zip_code.clone(),
        };

        let ip = request
            .ip_address
            .clone()
            .unwrap_or_else(|| "127.0.0.1".to_string());

        let buyer = WireBuyer {
            id: short_id(),
            name: first_name(&billing.contact_name),
            surname: last_name(&billing.contact_name),
            email: request.customer_email.clone().unwrap_or_default(),
            // Placeholder contact fields until buyer profiles carry them.
            gsm_number: "+905350000000".to_string(),
            identity_number: "11111111111".to_string(),
            registration_address: billing.address.clone(),
            ip,
            city: billing.city.clone(),
            country: billing.country.clone(),
            zip_code: billing.zip_code.clone(),
        };

        let price = request.amount.to_string();

        Ok(AuthRequest {
            locale: "tr".to_string(),
            conversation_id: request.payment_reference.clone(),
            price: price.clone(),
            paid_price: price.clone(),
            currency: request.currency.clone(),
            installment: 1,
            basket_id: short_id(),
            payment_channel: "WEB".to_string(),
            payment_group: "PRODUCT".to_string(),
            payment_card,
            buyer,
            shipping_address: address.clone(),
            billing_address: address,
            basket_items: vec![WireBasketItem {
                id: "ITEM1".to_string(),
                name: "Order Payment".to_string(),
                category1: "General".to_string(),
                item_type: "PHYSICAL".to_string(),
                price,
            }],
            callback_url: request.callback_url.clone(),
        })
    }

    fn translate(&self, raw: String) -> Result<GatewayResponse, GatewayError> {
        let parsed: AuthResponse = serde_json::from_str(&raw)
            .map_err(|e| GatewayError(format!("Iyzico response unparsable: {e}")))?;

        let success = parsed.status.as_deref() == Some("success");
        if success {
            // Iyzico reports the refundable transaction id on the first item.
            let transaction_id = parsed
                .item_transactions
                .as_ref()
                .and_then(|items| items.first())
                .and_then(|item| item.payment_transaction_id.clone())
                .or(parsed.payment_id);
            Ok(GatewayResponse {
                success: true,
                transaction_id,
                status: parsed.status,
                message: Some("Payment completed successfully".to_string()),
                raw_response: Some(raw),
                ..Default::default()
            })
        } else {
            let message = parsed
                .error_message
                .clone()
                .unwrap_or_else(|| "unknown error".to_string());
            Ok(GatewayResponse {
                success: false,
                status: parsed.status,
                message: Some(format!("Payment failed: {message}")),
                error_code: parsed.error_code,
                error_message: parsed.error_message,
                raw_response: Some(raw),
                ..Default::default()
            })
        }
    }
}

#[async_trait]
impl PaymentGateway for IyzicoGateway {
    async fn process_payment(
        &self,
        request: &GatewayRequest,
    ) -> Result<GatewayResponse, GatewayError> {
        tracing::info!(reference = %request.payment_reference, "processing Iyzico payment");
        let wire_request = self.build_auth_request(request)?;
        let raw = self.post("/payment/auth", &wire_request).await?;
        self.translate(raw)
    }

    async fn refund_payment(
        &self,
        transaction_id: &str,
        amount: &BigDecimal,
    ) -> Result<GatewayResponse, GatewayError> {
        tracing::info!(transaction_id, %amount, "processing Iyzico refund");
        let wire_request = RefundRequest {
            locale: "tr".to_string(),
            conversation_id: Uuid::new_v4().to_string(),
            payment_transaction_id: transaction_id.to_string(),
            price: amount.to_string(),
            currency: "TRY".to_string(),
            ip: "127.0.0.1".to_string(),
        };
        let raw = self.post("/payment/refund", &wire_request).await?;
        let mut response = self.translate(raw)?;
        if response.success {
            response.transaction_id = Some(transaction_id.to_string());
        }
        Ok(response)
    }

    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Iyzico
    }

    fn supports_method(&self, method: PaymentMethod) -> bool {
        method.is_card()
    }
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn first_name(full_name: &str) -> String {
    full_name
        .split_whitespace()
        .next()
        .unwrap_or("Unknown")
        .to_string()
}

fn last_name(full_name: &str) -> String {
    let parts: Vec<&str> = full_name.split_whitespace().collect();
    if parts.len() > 1 {
        parts[parts.len() - 1].to_string()
    } else {
        "Unknown".to_string()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthRequest {
    locale: String,
    conversation_id: String,
    price: String,
    paid_price: String,
    currency: String,
    installment: u8,
    basket_id: String,
    payment_channel: String,
    payment_group: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    payment_card: Option<WireCard>,
    buyer: WireBuyer,
    shipping_address: WireAddress,
    billing_address: WireAddress,
    basket_items: Vec<WireBasketItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireCard {
    card_holder_name: String,
    card_number: String,
    expire_month: String,
    expire_year: String,
    cvc: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireBuyer {
    id: String,
    name: String,
    surname: String,
    email: String,
    gsm_number: String,
    identity_number: String,
    registration_address: String,
    ip: String,
    city: String,
    country: String,
    zip_code: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireAddress {
    contact_name: String,
    city: String,
    country: String,
    address: String,
    zip_code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireBasketItem {
    id: String,
    name: String,
    category1: String,
    item_type: String,
    price: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefundRequest {
    locale: String,
    conversation_id: String,
    payment_transaction_id: String,
    price: String,
    currency: String,
    ip: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    status: Option<String>,
    payment_id: Option<String>,
    item_transactions: Option<Vec<ItemTransaction>>,
    error_code: Option<String>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemTransaction {
    payment_transaction_id: Option<String>,
}
