//! Uniform contract over external payment gateways, plus the startup-built
//! registry the lifecycle service resolves adapters from.

pub mod iyzico;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::config::ProvidersConfig;
use crate::models::{PaymentMethod, PaymentProvider};

pub use iyzico::IyzicoGateway;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CardDetails {
    pub card_holder_name: String,
    pub card_number: String,
    pub expire_month: String,
    pub expire_year: String,
    pub cvc: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BillingAddress {
    pub contact_name: String,
    pub city: String,
    pub country: String,
    pub address: String,
    pub zip_code: String,
}

/// Provider-agnostic charge request handed to an adapter.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub payment_reference: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub method: PaymentMethod,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub card_details: Option<CardDetails>,
    pub billing_address: Option<BillingAddress>,
    pub callback_url: Option<String>,
    pub ip_address: Option<String>,
}

/// Provider-agnostic result an adapter translates the gateway's answer into.
#[derive(Debug, Clone, Default)]
pub struct GatewayResponse {
    pub success: bool,
    pub transaction_id: Option<String>,
    pub status: Option<String>,
    pub message: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub raw_response: Option<String>,
}

impl GatewayResponse {
    /// Best human-readable failure description available in the response.
    pub fn failure_reason(&self) -> String {
        self.error_message
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| "Payment failed".to_string())
    }
}

/// Transport or translation failure inside an adapter. Provider-specific error
/// types never cross this boundary.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct GatewayError(pub String);

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn process_payment(
        &self,
        request: &GatewayRequest,
    ) -> Result<GatewayResponse, GatewayError>;

    async fn refund_payment(
        &self,
        transaction_id: &str,
        amount: &BigDecimal,
    ) -> Result<GatewayResponse, GatewayError>;

    /// Stable identifier used as the registry key.
    fn provider(&self) -> PaymentProvider;

    /// Checked by the lifecycle service before any `process_payment` call.
    fn supports_method(&self, method: PaymentMethod) -> bool;
}

/// Adapter lookup table, built once at startup from configuration and
/// read-only afterwards.
#[derive(Default)]
pub struct ProviderRegistry {
    gateways: HashMap<PaymentProvider, Arc<dyn PaymentGateway>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ProvidersConfig) -> Self {
        let mut registry = Self::new();

        if config.iyzico.enabled {
            registry.register(Arc::new(IyzicoGateway::new(config.iyzico.clone())));
        }
        if config.stripe_enabled {
            tracing::warn!("Stripe is enabled but no adapter is available; skipping");
        }
        if config.paypal_enabled {
            tracing::warn!("PayPal is enabled but no adapter is available; skipping");
        }

        tracing::info!(count = registry.gateways.len(), "payment providers registered");
        registry
    }

    pub fn register(&mut self, gateway: Arc<dyn PaymentGateway>) {
        let provider = gateway.provider();
        tracing::info!(%provider, "registered payment provider");
        self.gateways.insert(provider, gateway);
    }

    pub fn get(&self, provider: PaymentProvider) -> Option<Arc<dyn PaymentGateway>> {
        self.gateways.get(&provider).cloned()
    }

    pub fn len(&self) -> usize {
        self.gateways.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gateways.is_empty()
    }
}

/// Scripted outcome for the in-memory gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GatewayMode {
    #[default]
    Approve,
    Decline,
    Error,
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    mode: GatewayMode,
    next_transaction: u32,
    process_calls: u32,
    refund_calls: u32,
}

/// In-memory gateway for testing the payment lifecycle without a real
/// provider.
#[derive(Clone)]
pub struct InMemoryGateway {
    provider: PaymentProvider,
    methods: Vec<PaymentMethod>,
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryGateway {
    pub fn new(provider: PaymentProvider, methods: Vec<PaymentMethod>) -> Self {
        Self {
            provider,
            methods,
            state: Arc::new(RwLock::new(InMemoryGatewayState::default())),
        }
    }

    pub fn set_mode(&self, mode: GatewayMode) {
        self.state.write().unwrap().mode = mode;
    }

    pub fn process_call_count(&self) -> u32 {
        self.state.read().unwrap().process_calls
    }

    pub fn refund_call_count(&self) -> u32 {
        self.state.read().unwrap().refund_calls
    }

    fn respond(&self, state: &mut InMemoryGatewayState) -> Result<GatewayResponse, GatewayError> {
        match state.mode {
            GatewayMode::Approve => {
                state.next_transaction += 1;
                Ok(GatewayResponse {
                    success: true,
                    transaction_id: Some(format!("TX-{:04}", state.next_transaction)),
                    status: Some("success".into()),
                    message: Some("approved".into()),
                    raw_response: Some("{\"status\":\"SUCCESS\"}".into()),
                    ..Default::default()
                })
            }
            GatewayMode::Decline => Ok(GatewayResponse {
                success: false,
                status: Some("failure".into()),
                error_code: Some("5001".into()),
                error_message: Some("card declined".into()),
                raw_response: Some("{\"status\":\"FAILED\"}".into()),
                ..Default::default()
            }),
            GatewayMode::Error => Err(GatewayError("gateway unreachable".into())),
        }
    }
}

#[async_trait]
impl PaymentGateway for InMemoryGateway {
    async fn process_payment(
        &self,
        _request: &GatewayRequest,
    ) -> Result<GatewayResponse, GatewayError> {
        let mut state = self.state.write().unwrap();
        state.process_calls += 1;
        self.respond(&mut state)
    }

    async fn refund_payment(
        &self,
        transaction_id: &str,
        _amount: &BigDecimal,
    ) -> Result<GatewayResponse, GatewayError> {
        let mut state = self.state.write().unwrap();
        state.refund_calls += 1;
        let mut response = self.respond(&mut state)?;
        if response.success {
            response.transaction_id = Some(transaction_id.to_string());
        }
        Ok(response)
    }

    fn provider(&self) -> PaymentProvider {
        self.provider
    }

    fn supports_method(&self, method: PaymentMethod) -> bool {
        self.methods.contains(&method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn card_gateway() -> InMemoryGateway {
        InMemoryGateway::new(
            PaymentProvider::Iyzico,
            vec![PaymentMethod::CreditCard, PaymentMethod::DebitCard],
        )
    }

    fn charge_request() -> GatewayRequest {
        GatewayRequest {
            payment_reference: "PAY-1-A".into(),
            amount: BigDecimal::from_str("50.00").unwrap(),
            currency: "TRY".into(),
            method: PaymentMethod::CreditCard,
            customer_email: Some("buyer@example.com".into()),
            customer_name: None,
            card_details: None,
            billing_address: None,
            callback_url: None,
            ip_address: None,
        }
    }

    #[test]
    fn registry_lookup_is_keyed_by_provider() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(card_gateway()));

        assert_eq!(registry.len(), 1);
        assert!(registry.get(PaymentProvider::Iyzico).is_some());
        assert!(registry.get(PaymentProvider::Stripe).is_none());
    }

    #[test]
    fn method_support_is_a_pure_predicate() {
        let gateway = card_gateway();
        assert!(gateway.supports_method(PaymentMethod::CreditCard));
        assert!(gateway.supports_method(PaymentMethod::DebitCard));
        assert!(!gateway.supports_method(PaymentMethod::CashOnDelivery));
    }

    #[tokio::test]
    async fn approve_mode_returns_transaction_ids() {
        let gateway = card_gateway();
        let first = gateway.process_payment(&charge_request()).await.unwrap();
        let second = gateway.process_payment(&charge_request()).await.unwrap();

        assert!(first.success);
        assert_eq!(first.transaction_id.as_deref(), Some("TX-0001"));
        assert_eq!(second.transaction_id.as_deref(), Some("TX-0002"));
        assert_eq!(gateway.process_call_count(), 2);
    }

    #[tokio::test]
    async fn decline_and_error_modes() {
        let gateway = card_gateway();

        gateway.set_mode(GatewayMode::Decline);
        let declined = gateway.process_payment(&charge_request()).await.unwrap();
        assert!(!declined.success);
        assert_eq!(declined.failure_reason(), "card declined");

        gateway.set_mode(GatewayMode::Error);
        assert!(gateway.process_payment(&charge_request()).await.is_err());
    }
}
