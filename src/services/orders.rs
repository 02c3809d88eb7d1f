//! Checkout and order lifecycle.
//!
//! Creating an order only snapshots the cart: stock and the cart are left alone
//! until the payment is confirmed, which commits both in one store call.

use std::sync::Arc;
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;
use crate::domain::aggregates::cart::insufficient_stock_message;
use crate::domain::aggregates::order::generate_order_number;
use crate::domain::aggregates::{
    Address, LineStatus, OfferRejection, Order, OrderItem, OrderStatus, PaymentStatus, PricingPolicy,
};
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::Money;
use crate::notify::{dispatch, Notifier};
use crate::services::{Actor, CartService, OfferService};
use crate::store::{Confirmation, Store, StoreError};
use crate::{EcommerceError, Result};

const MAX_ORDER_NUMBER_ATTEMPTS: usize = 5;

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    #[validate]
    pub shipping_address: Address,
    /// Defaults to the shipping address.
    #[validate]
    pub billing_address: Option<Address>,
    pub payment_intent_id: Option<String>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
    pub offer_code: Option<String>,
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn Store>,
    carts: CartService,
    offers: OfferService,
    pricing: PricingPolicy,
    notifier: Arc<dyn Notifier>,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn Store>, carts: CartService, offers: OfferService, pricing: PricingPolicy, notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { store, carts, offers, pricing, notifier }
    }

    /// Places a PENDING order from the caller's cart.
    #[instrument(skip(self, draft), fields(user_id = %actor.user_id))]
    pub async fn create(&self, actor: &Actor, draft: OrderDraft) -> Result<Order> {
        draft.validate()?;
        let cart = self.carts.get_cart(actor.user_id).await?;
        if cart.is_empty() {
            return Err(EcommerceError::bad_request("Cart is empty"));
        }
        for line in &cart.items {
            if line.status() != LineStatus::Valid {
                let available = if line.is_purchasable() { line.available_stock() } else { 0 };
                return Err(EcommerceError::bad_request(insufficient_stock_message(&line.display_name(), available)));
            }
        }

        let now = Utc::now();
        let offer = match draft.offer_code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            Some(code) => Some(self.offers.resolve(code, cart.subtotal, now).await?),
            None => None,
        };
        let discount = offer.as_ref().map_or(Money::ZERO, |(_, d)| *d);
        let totals = self.pricing.totals(cart.subtotal, discount);
        let items: Vec<OrderItem> = cart.items.iter().map(OrderItem::snapshot).collect();
        let billing_address = draft.billing_address.unwrap_or_else(|| draft.shipping_address.clone());

        for attempt in 1..=MAX_ORDER_NUMBER_ATTEMPTS {
            let order = Order {
                id: Uuid::now_v7(),
                order_number: generate_order_number(now),
                user_id: actor.user_id,
                customer_email: actor.email.clone(),
                status: OrderStatus::Pending,
                payment_status: PaymentStatus::Pending,
                subtotal: totals.subtotal,
                discount: totals.discount,
                tax: totals.tax,
                shipping: totals.shipping,
                total: totals.total,
                shipping_address: draft.shipping_address.clone(),
                billing_address: billing_address.clone(),
                payment_intent_id: draft.payment_intent_id.clone(),
                notes: draft.notes.clone(),
                offer_id: offer.as_ref().map(|(o, _)| o.id),
                offer_code: offer.as_ref().map(|(o, _)| o.code.to_string()),
                items: items.clone(),
                created_at: now,
                updated_at: now,
            };
            match self.store.insert_order(&order).await {
                Ok(()) => {
                    info!(order_id = %order.id, order_number = %order.order_number, total = %order.total, "order created");
                    return Ok(order);
                }
                Err(StoreError::Conflict(_)) => {
                    warn!(attempt, "order number collision, regenerating");
                }
                Err(StoreError::OfferExhausted) => {
                    return Err(EcommerceError::bad_request(OfferRejection::UsageLimitReached.to_string()));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(EcommerceError::Conflict("Could not allocate an order number".into()))
    }

    /// Moves a PENDING order to PROCESSING/PAID, committing stock and clearing the cart.
    /// Confirming an order that already left PENDING only records the reference.
    #[instrument(skip(self), fields(user_id = %actor.user_id))]
    pub async fn confirm_payment(&self, actor: &Actor, order_id: Uuid, payment_reference: &str) -> Result<Order> {
        let payment_reference = payment_reference.trim();
        if payment_reference.is_empty() {
            return Err(EcommerceError::bad_request("paymentIntentId is required"));
        }
        self.find_one(actor, order_id).await?;

        match self.store.confirm_payment(order_id, payment_reference).await? {
            Confirmation::Confirmed(order) => {
                info!(order_id = %order.id, "payment confirmed");
                dispatch(self.notifier.clone(), DomainEvent::order_confirmed(&order));
                Ok(order)
            }
            Confirmation::AlreadyProcessed(order) => {
                info!(order_id = %order.id, status = %order.status, "order already processed");
                Ok(order)
            }
            Confirmation::NotFound => Err(EcommerceError::not_found("Order")),
        }
    }

    /// Admin override; no transition rules apply.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self, order_id: Uuid, status: Option<OrderStatus>, payment_status: Option<PaymentStatus>,
    ) -> Result<Order> {
        if status.is_none() && payment_status.is_none() {
            return Err(EcommerceError::bad_request("Nothing to update"));
        }
        let (previous, order) = self.store.update_order_status(order_id, status, payment_status).await?
            .ok_or_else(|| EcommerceError::not_found("Order"))?;
        if previous != order.status {
            info!(order_id = %order.id, from = %previous, to = %order.status, "order status changed");
            dispatch(self.notifier.clone(), DomainEvent::order_status_changed(&order, previous));
        }
        Ok(order)
    }

    pub async fn find_all(&self, actor: &Actor) -> Result<Vec<Order>> {
        Ok(self.store.list_orders(Some(actor.user_id)).await?)
    }

    pub async fn list_all(&self) -> Result<Vec<Order>> {
        Ok(self.store.list_orders(None).await?)
    }

    /// Another user's order looks the same as a missing one.
    pub async fn find_one(&self, actor: &Actor, order_id: Uuid) -> Result<Order> {
        self.store.get_order(order_id).await?
            .filter(|o| actor.can_see(o.user_id))
            .ok_or_else(|| EcommerceError::not_found("Order"))
    }
}
