use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use utoipa::openapi::OpenApi as OpenApiSpec;

use crate::{
    dto::{
        orders::{OrderList, OrderWithItems, PlaceOrderItem, PlaceOrderRequest},
        payments::{InitiatePaymentRequest, PaymentList, RefundPaymentRequest},
    },
    inventory::ProductSnapshot,
    models::{
        Order, OrderItem, OrderStatus, Payment, PaymentMethod, PaymentProvider, PaymentStatus,
    },
    providers::{BillingAddress, CardDetails},
    response::{ApiResponse, Meta},
    routes::{health, orders, params, payments},
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        orders::place_order,
        orders::list_orders,
        orders::get_order,
        orders::cancel_order,
        payments::initiate_payment,
        payments::get_payment,
        payments::get_payment_by_reference,
        payments::list_order_payments,
        payments::list_user_payments,
        payments::list_payments_by_status,
        payments::refund_payment,
        payments::handle_callback,
        payments::list_retryable_payments,
        payments::retry_payments
    ),
    components(
        schemas(
            Order,
            OrderItem,
            OrderStatus,
            Payment,
            PaymentStatus,
            PaymentProvider,
            PaymentMethod,
            ProductSnapshot,
            CardDetails,
            BillingAddress,
            PlaceOrderItem,
            PlaceOrderRequest,
            OrderList,
            OrderWithItems,
            InitiatePaymentRequest,
            RefundPaymentRequest,
            PaymentList,
            params::Pagination,
            params::OrderListQuery,
            params::PaymentListQuery,
            Meta,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<Payment>,
            ApiResponse<PaymentList>
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Orders", description = "Order fulfillment endpoints"),
        (name = "Payments", description = "Payment lifecycle endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
