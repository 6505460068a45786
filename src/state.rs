use std::sync::Arc;

use crate::db::{DbPool, OrmConn};
use crate::inventory::InventoryClient;
use crate::providers::ProviderRegistry;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub inventory: Arc<dyn InventoryClient>,
    pub providers: Arc<ProviderRegistry>,
    pub compensate_stock_on_abort: bool,
}
