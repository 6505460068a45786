//! Client for the remote product service that owns catalog and stock.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;

/// Product state as reported by the inventory service at fetch time.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductSnapshot {
    pub id: Uuid,
    pub sku: Option<String>,
    pub name: String,
    #[schema(value_type = String)]
    pub price: BigDecimal,
    pub stock_quantity: i32,
    pub is_active: bool,
}

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("product {0} not found")]
    NotFound(Uuid),
    #[error("inventory service unavailable: {0}")]
    Unavailable(String),
}

impl From<InventoryError> for AppError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::NotFound(_) => AppError::NotFound,
            InventoryError::Unavailable(message) => AppError::InventoryUnavailable(message),
        }
    }
}

/// Remote stock operations used by order placement. Calls are synchronous from
/// the caller's perspective and are not transactional with each other.
#[async_trait]
pub trait InventoryClient: Send + Sync {
    async fn get_product(&self, product_id: Uuid) -> Result<ProductSnapshot, InventoryError>;

    async fn reduce_stock(&self, product_id: Uuid, quantity: i32) -> Result<(), InventoryError>;

    /// Compensation hook: puts previously reduced stock back.
    async fn restore_stock(&self, product_id: Uuid, quantity: i32) -> Result<(), InventoryError>;
}

/// Envelope the product service wraps every payload in.
#[derive(Debug, Deserialize)]
struct ServiceEnvelope<T> {
    success: bool,
    data: Option<T>,
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct StockChangeRequest {
    quantity: i32,
}

pub struct HttpInventoryClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpInventoryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn post_stock_change(
        &self,
        product_id: Uuid,
        action: &str,
        quantity: i32,
    ) -> Result<(), InventoryError> {
        let url = format!(
            "{}/api/v1/products/{}/stock/{}",
            self.base_url, product_id, action
        );
        tracing::debug!(%product_id, quantity, action, "stock change request");

        let response = self
            .http
            .post(&url)
            .json(&StockChangeRequest { quantity })
            .send()
            .await
            .map_err(|e| InventoryError::Unavailable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(InventoryError::NotFound(product_id));
        }
        if !response.status().is_success() {
            return Err(InventoryError::Unavailable(format!(
                "stock {action} returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl InventoryClient for HttpInventoryClient {
    async fn get_product(&self, product_id: Uuid) -> Result<ProductSnapshot, InventoryError> {
        let url = format!("{}/api/v1/products/{}", self.base_url, product_id);
        tracing::debug!(%product_id, "fetching product");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| InventoryError::Unavailable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(InventoryError::NotFound(product_id));
        }
        if !response.status().is_success() {
            return Err(InventoryError::Unavailable(format!(
                "product fetch returned {}",
                response.status()
            )));
        }

        let envelope: ServiceEnvelope<ProductSnapshot> = response
            .json()
            .await
            .map_err(|e| InventoryError::Unavailable(e.to_string()))?;

        if !envelope.success {
            return Err(InventoryError::Unavailable(
                envelope
                    .message
                    .unwrap_or_else(|| "product fetch rejected".to_string()),
            ));
        }
        envelope
            .data
            .ok_or_else(|| InventoryError::Unavailable("empty product payload".to_string()))
    }

    async fn reduce_stock(&self, product_id: Uuid, quantity: i32) -> Result<(), InventoryError> {
        self.post_stock_change(product_id, "reduce", quantity).await
    }

    async fn restore_stock(&self, product_id: Uuid, quantity: i32) -> Result<(), InventoryError> {
        self.post_stock_change(product_id, "restore", quantity)
            .await
    }
}

#[derive(Debug, Default)]
struct InMemoryInventoryState {
    products: HashMap<Uuid, ProductSnapshot>,
    fail_on_reduce: bool,
    reduce_calls: u32,
    restore_calls: u32,
}

/// In-memory inventory client for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryClient {
    state: Arc<RwLock<InMemoryInventoryState>>,
}

impl InMemoryInventoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, product: ProductSnapshot) {
        self.state
            .write()
            .unwrap()
            .products
            .insert(product.id, product);
    }

    pub fn stock_of(&self, product_id: Uuid) -> Option<i32> {
        self.state
            .read()
            .unwrap()
            .products
            .get(&product_id)
            .map(|p| p.stock_quantity)
    }

    /// Configures the client to fail on the next reduce call.
    pub fn set_fail_on_reduce(&self, fail: bool) {
        self.state.write().unwrap().fail_on_reduce = fail;
    }

    pub fn reduce_call_count(&self) -> u32 {
        self.state.read().unwrap().reduce_calls
    }

    pub fn restore_call_count(&self) -> u32 {
        self.state.read().unwrap().restore_calls
    }
}

#[async_trait]
impl InventoryClient for InMemoryInventoryClient {
    async fn get_product(&self, product_id: Uuid) -> Result<ProductSnapshot, InventoryError> {
        self.state
            .read()
            .unwrap()
            .products
            .get(&product_id)
            .cloned()
            .ok_or(InventoryError::NotFound(product_id))
    }

    async fn reduce_stock(&self, product_id: Uuid, quantity: i32) -> Result<(), InventoryError> {
        let mut state = self.state.write().unwrap();
        state.reduce_calls += 1;
        if state.fail_on_reduce {
            return Err(InventoryError::Unavailable(
                "injected reduce failure".to_string(),
            ));
        }
        let product = state
            .products
            .get_mut(&product_id)
            .ok_or(InventoryError::NotFound(product_id))?;
        product.stock_quantity -= quantity;
        Ok(())
    }

    async fn restore_stock(&self, product_id: Uuid, quantity: i32) -> Result<(), InventoryError> {
        let mut state = self.state.write().unwrap();
        state.restore_calls += 1;
        let product = state
            .products
            .get_mut(&product_id)
            .ok_or(InventoryError::NotFound(product_id))?;
        product.stock_quantity += quantity;
        Ok(())
    }
}
