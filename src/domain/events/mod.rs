//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;
use crate::domain::aggregates::{Order, OrderStatus};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Order(OrderEvent),
    Inventory(InventoryEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderEvent {
    Confirmed { order_id: Uuid, order_number: String, email: Option<String>, total: Decimal },
    StatusChanged { order_id: Uuid, order_number: String, email: Option<String>, from: OrderStatus, to: OrderStatus },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InventoryEvent {
    LowStock { admin_email: String, threshold: i32, products: Vec<LowStockProduct> },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LowStockProduct {
    pub product_id: Uuid,
    pub name: String,
    pub sku: Option<String>,
    pub stock: i32,
    pub low_variants: Vec<(String, i32)>,
}

impl DomainEvent {
    pub fn order_confirmed(order: &Order) -> Self {
        DomainEvent::Order(OrderEvent::Confirmed {
            order_id: order.id, order_number: order.order_number.clone(),
            email: order.customer_email.clone(), total: order.total.amount(),
        })
    }

    pub fn order_status_changed(order: &Order, from: OrderStatus) -> Self {
        DomainEvent::Order(OrderEvent::StatusChanged {
            order_id: order.id, order_number: order.order_number.clone(),
            email: order.customer_email.clone(), from, to: order.status,
        })
    }

    /// Dotted routing key such as `order.confirmed`.
    pub fn routing_key(&self) -> &'static str {
        match self {
            DomainEvent::Order(OrderEvent::Confirmed { .. }) => "order.confirmed",
            DomainEvent::Order(OrderEvent::StatusChanged { .. }) => "order.status_changed",
            DomainEvent::Inventory(InventoryEvent::LowStock { .. }) => "inventory.low_stock",
        }
    }
}
