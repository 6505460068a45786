use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::orders::{OrderList, OrderWithItems, PlaceOrderRequest},
    entity::{
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
    },
    error::{AppError, AppResult},
    middleware::auth::CurrentUser,
    models::{Order, OrderItem, OrderStatus, total_amount},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    state::AppState,
};

pub async fn list_orders(
    state: &AppState,
    user: &CurrentUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::Status.eq(status.as_str()));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect::<AppResult<Vec<Order>>>()?;

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Ok",
        OrderList { items: orders },
        Some(meta),
    ))
}

/// Builds an order out of the requested line items. Each item is validated
/// against the remote inventory and its stock reduced before the next item is
/// touched; the order row itself is written only after every item went
/// through. Remote reductions are not transactional with the final write.
pub async fn place_order(
    state: &AppState,
    user: &CurrentUser,
    payload: PlaceOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    if payload.items.is_empty() {
        return Err(AppError::BadRequest(
            "Order must contain at least one item".into(),
        ));
    }
    if payload.items.iter().any(|item| item.quantity <= 0) {
        return Err(AppError::BadRequest(
            "Item quantity must be greater than zero".into(),
        ));
    }

    tracing::info!(user_id = %user.user_id, items = payload.items.len(), "placing order");

    let order_id = Uuid::new_v4();
    let now = Utc::now();
    let mut items: Vec<OrderItem> = Vec::with_capacity(payload.items.len());
    // Reductions already applied remotely, kept for best-effort compensation.
    let mut reduced: Vec<(Uuid, i32)> = Vec::new();

    for requested in &payload.items {
        let product = match state.inventory.get_product(requested.product_id).await {
            Ok(product) => product,
            Err(err) => {
                compensate_reductions(state, &reduced).await;
                return Err(err.into());
            }
        };

        if !product.is_active {
            compensate_reductions(state, &reduced).await;
            return Err(AppError::ProductUnavailable(product.name));
        }
        if product.stock_quantity < requested.quantity {
            compensate_reductions(state, &reduced).await;
            return Err(AppError::InsufficientStock(product.name));
        }

        let item = OrderItem::new(
            order_id,
            product.id,
            product.name,
            product.sku,
            requested.quantity,
            product.price,
            now,
        );

        if let Err(err) = state
            .inventory
            .reduce_stock(requested.product_id, requested.quantity)
            .await
        {
            compensate_reductions(state, &reduced).await;
            return Err(err.into());
        }
        reduced.push((requested.product_id, requested.quantity));
        items.push(item);
    }

    let total = total_amount(&items);
    let order_number = build_order_number(order_id);

    let txn = state.orm.begin().await?;

    let order = OrderActive {
        id: Set(order_id),
        user_id: Set(user.user_id),
        order_number: Set(order_number),
        status: Set(OrderStatus::Pending.as_str().to_string()),
        total_amount: Set(total),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    for item in &items {
        OrderItemActive {
            id: Set(item.id),
            order_id: Set(order.id),
            product_id: Set(item.product_id),
            product_name: Set(item.product_name.clone()),
            product_sku: Set(item.product_sku.clone()),
            quantity: Set(item.quantity),
            price_at_purchase: Set(item.price_at_purchase.clone()),
            subtotal: Set(item.subtotal.clone()),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
    }

    txn.commit().await?;

    tracing::info!(order_number = %order.order_number, "order placed");

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_place",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order placed",
        OrderWithItems {
            order: order_from_entity(order)?,
            items,
        },
        Some(Meta::empty()),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &CurrentUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .one(&state.orm)
        .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(item_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "OK",
        OrderWithItems {
            order: order_from_entity(order)?,
            items,
        },
        Some(Meta::empty()),
    ))
}

/// Flips a PENDING or CONFIRMED order to CANCELLED. Stock already reserved for
/// the order is forfeited, not restored.
pub async fn cancel_order(
    state: &AppState,
    user: &CurrentUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    if order.user_id != user.user_id {
        return Err(AppError::Unauthorized);
    }

    let status = parse_order_status(&order.status)?;
    if !status.can_cancel() {
        return Err(AppError::InvalidState(format!(
            "Order cannot be cancelled in {status} status"
        )));
    }

    let mut active: OrderActive = order.into();
    active.status = Set(OrderStatus::Cancelled.as_str().to_string());
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&state.orm).await?;

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(item_from_entity)
        .collect();

    tracing::info!(order_number = %order.order_number, "order cancelled");

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_cancel",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order cancelled",
        OrderWithItems {
            order: order_from_entity(order)?,
            items,
        },
        Some(Meta::empty()),
    ))
}

/// Best-effort rollback of remote stock reductions after an aborted placement.
/// Disabled by default, in which case earlier reductions stay applied.
async fn compensate_reductions(state: &AppState, reduced: &[(Uuid, i32)]) {
    if reduced.is_empty() {
        return;
    }
    if !state.compensate_stock_on_abort {
        tracing::warn!(
            count = reduced.len(),
            "order placement aborted; leaving earlier stock reductions in place"
        );
        return;
    }
    for (product_id, quantity) in reduced {
        if let Err(err) = state.inventory.restore_stock(*product_id, *quantity).await {
            tracing::warn!(%product_id, quantity, error = %err, "stock compensation failed");
        }
    }
}

fn parse_order_status(value: &str) -> AppResult<OrderStatus> {
    OrderStatus::parse(value)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown order status: {value}")))
}

fn order_from_entity(model: OrderModel) -> AppResult<Order> {
    Ok(Order {
        id: model.id,
        user_id: model.user_id,
        order_number: model.order_number,
        status: parse_order_status(&model.status)?,
        total_amount: model.total_amount,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

fn item_from_entity(model: OrderItemModel) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        product_id: model.product_id,
        product_name: model.product_name,
        product_sku: model.product_sku,
        quantity: model.quantity,
        price_at_purchase: model.price_at_purchase,
        subtotal: model.subtotal,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

fn build_order_number(order_id: Uuid) -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix = order_id.to_string();
    let short = &suffix[..8];
    format!("ORD-{}-{}", date, short)
}

#[cfg(test)]
mod tests {
    use super::build_order_number;
    use uuid::Uuid;

    #[test]
    fn order_number_embeds_date_and_id_prefix() {
        let id = Uuid::new_v4();
        let number = build_order_number(id);
        assert!(number.starts_with("ORD-"));
        assert!(number.ends_with(&id.to_string()[..8]));
        assert_eq!(number.len(), "ORD-".len() + 8 + 1 + 8);
    }
}
