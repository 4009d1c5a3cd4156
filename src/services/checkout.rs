use crate::{
    db::DbPool,
    entities::{
        cart_item::{self, Entity as CartItem},
        order::{self, Entity as Order, OrderStatus},
        order_item::{self, Entity as OrderItem},
    },
    errors::ServiceError,
    notifications::{Committed, Notification},
    services::{
        inventory::StockGuard,
        orders::{
            commit_order_stock, lock_products, try_transition, OrderDraft, OrderLineRequest,
            OrderResponse, OrderService, PlaceOrderRequest, PlacedOrder, PlacementMode,
            ShippingInput,
        },
        payment_provider::{
            encode_basket, parse_reference, payment_reference, to_minor_units, BasketLine,
            CallbackForm, PaymentGateway, TokenRequest,
        },
    },
};
use chrono::Utc;
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Checkout of the caller's saved cart.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CartCheckoutRequest {
    #[serde(default)]
    pub shipping_address_id: Option<Uuid>,
    #[serde(default)]
    pub shipping: Option<ShippingInput>,
    #[serde(default)]
    pub customer_note: Option<String>,
}

/// What the client needs to open the provider's hosted payment page.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentSession {
    pub token: String,
    pub merchant_oid: String,
    pub order_id: Uuid,
    pub order_number: i32,
}

/// Why a callback was acknowledged without touching state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoredCallback {
    BadSignature,
    UnknownReference,
    Underpaid,
    IllegalTransition,
}

impl IgnoredCallback {
    fn label(self) -> &'static str {
        match self {
            IgnoredCallback::BadSignature => "bad_signature",
            IgnoredCallback::UnknownReference => "unknown_reference",
            IgnoredCallback::Underpaid => "underpaid",
            IgnoredCallback::IllegalTransition => "illegal_transition",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// `changed` is false when the order was already paid.
    Paid { order_id: Uuid, changed: bool },
    Canceled { order_id: Uuid, changed: bool },
    Ignored(IgnoredCallback),
}

impl CallbackOutcome {
    fn label(&self) -> &'static str {
        match self {
            CallbackOutcome::Paid { changed: true, .. } => "paid",
            CallbackOutcome::Paid { changed: false, .. } => "already_paid",
            CallbackOutcome::Canceled { .. } => "canceled",
            CallbackOutcome::Ignored(reason) => reason.label(),
        }
    }
}

/// The two checkout paths: pay-now orders and provider-redirect payments
/// settled by the provider's callback.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DbPool>,
    orders: Arc<OrderService>,
    gateway: Arc<dyn PaymentGateway>,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DbPool>,
        orders: Arc<OrderService>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            db,
            orders,
            gateway,
        }
    }

    /// Creates a PAID order and decrements stock in one transaction.
    #[instrument(skip(self, draft), fields(user_id = %draft.user_id))]
    pub async fn place_direct(
        &self,
        draft: OrderDraft,
    ) -> Result<Committed<OrderResponse>, ServiceError> {
        let placed = self
            .orders
            .place(&draft, PlacementMode::Direct, false)
            .await?;
        Ok(Self::confirmed(placed))
    }

    /// Turns the caller's cart into a PAID order and empties the cart in the
    /// same transaction.
    #[instrument(skip(self, email, request), fields(user_id = %user_id))]
    pub async fn checkout_cart(
        &self,
        user_id: Uuid,
        email: Option<String>,
        request: CartCheckoutRequest,
    ) -> Result<Committed<OrderResponse>, ServiceError> {
        let lines = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        if lines.is_empty() {
            return Err(ServiceError::ValidationError("cart is empty".to_string()));
        }

        let draft = OrderDraft {
            user_id,
            contact_email: email,
            request: PlaceOrderRequest {
                items: lines
                    .into_iter()
                    .map(|l| OrderLineRequest {
                        product_id: l.product_id,
                        quantity: l.quantity,
                        size_id: l.size_id,
                        color_id: l.color_id,
                    })
                    .collect(),
                shipping_address_id: request.shipping_address_id,
                shipping: request.shipping,
                customer_note: request.customer_note,
            },
        };

        let placed = self
            .orders
            .place(&draft, PlacementMode::Direct, true)
            .await?;
        Ok(Self::confirmed(placed))
    }

    fn confirmed(placed: PlacedOrder) -> Committed<OrderResponse> {
        let notification = Notification::order_confirmed(&placed.order);
        Committed::new(placed.into_response()).with(notification)
    }

    /// Creates a PENDING order without touching stock and asks the provider
    /// for a hosted checkout token. A provider failure leaves the order
    /// PENDING for the callback or an admin to resolve.
    #[instrument(skip(self, draft, client_ip), fields(user_id = %draft.user_id))]
    pub async fn start_payment(
        &self,
        draft: OrderDraft,
        client_ip: String,
    ) -> Result<PaymentSession, ServiceError> {
        let email = draft
            .contact_email
            .clone()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| {
                ServiceError::ValidationError(
                    "an email address is required for card payments".to_string(),
                )
            })?;

        let placed = self
            .orders
            .place(&draft, PlacementMode::Provider, false)
            .await?;
        let order_number = placed.order_number();
        let merchant_oid = payment_reference(order_number, Utc::now().timestamp_millis());

        let mut active: order::ActiveModel = placed.order.clone().into();
        active.payment_reference = Set(Some(merchant_oid.clone()));
        active.updated_at = Set(Utc::now());
        let order = active.update(self.db.as_ref()).await?;

        let basket = encode_basket(
            &placed
                .lines
                .iter()
                .map(|l| BasketLine {
                    name: l.product.name.clone(),
                    unit_price: l.unit_price(),
                    quantity: l.quantity,
                })
                .collect::<Vec<_>>(),
        );

        let token = self
            .gateway
            .request_token(&TokenRequest {
                user_ip: client_ip,
                merchant_oid: merchant_oid.clone(),
                email,
                payment_amount: to_minor_units(order.total)?,
                user_basket: basket,
                user_name: order.shipping_name.clone(),
                user_address: format!(
                    "{} {}/{}",
                    order.shipping_address_line, order.shipping_district, order.shipping_city
                ),
                user_phone: order.shipping_phone.clone(),
            })
            .await?;

        self.mark_awaiting_payment(order.id).await?;
        counter!("storefront.payments.started", 1);
        info!(order_id = %order.id, order_number, merchant_oid = %merchant_oid, "payment started");

        Ok(PaymentSession {
            token,
            merchant_oid,
            order_id: order.id,
            order_number,
        })
    }

    /// PENDING -> AWAITING_PAYMENT unless a callback already settled the order.
    async fn mark_awaiting_payment(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        let order = Order::find_by_id(order_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", order_id))?;
        if order.status == OrderStatus::Pending {
            try_transition(&txn, order, OrderStatus::AwaitingPayment, None).await?;
        } else {
            info!(status = %order.status, "order settled before token was issued");
        }
        txn.commit().await?;
        Ok(())
    }

    /// Applies a provider callback. Unverifiable or inapplicable callbacks
    /// come back as [`CallbackOutcome::Ignored`]; the caller acknowledges
    /// every callback regardless.
    #[instrument(skip(self, form), fields(merchant_oid = %form.merchant_oid, status = %form.status))]
    pub async fn handle_callback(
        &self,
        form: CallbackForm,
    ) -> Result<Committed<CallbackOutcome>, ServiceError> {
        let committed = self.apply_callback(&form).await?;
        let outcome = &committed.value;
        counter!("storefront.payments.callbacks", 1, "outcome" => outcome.label());
        match outcome {
            CallbackOutcome::Ignored(reason) => {
                warn!(reason = reason.label(), "payment callback ignored")
            }
            other => info!(outcome = other.label(), "payment callback applied"),
        }
        Ok(committed)
    }

    async fn apply_callback(
        &self,
        form: &CallbackForm,
    ) -> Result<Committed<CallbackOutcome>, ServiceError> {
        let ignored = |reason| Ok(Committed::new(CallbackOutcome::Ignored(reason)));

        if !self.gateway.verify_callback(form) {
            return ignored(IgnoredCallback::BadSignature);
        }
        let Some(order_number) = parse_reference(&form.merchant_oid) else {
            return ignored(IgnoredCallback::UnknownReference);
        };

        let txn = self.db.begin().await?;
        let Some(order) = Order::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .lock_exclusive()
            .one(&txn)
            .await?
        else {
            return ignored(IgnoredCallback::UnknownReference);
        };

        let order_id = order.id;
        if form.is_success() {
            // Installment surcharges make the charged total exceed the order total.
            let expected = to_minor_units(order.total)?;
            match form.total_amount.trim().parse::<i64>() {
                Ok(received) if received >= expected => {
                    if received > expected {
                        info!(expected, received, "callback total includes a surcharge");
                    }
                }
                _ => {
                    warn!(
                        expected,
                        received = %form.total_amount,
                        "callback total is below the order total"
                    );
                    return ignored(IgnoredCallback::Underpaid);
                }
            }
            if order.status == OrderStatus::Paid {
                return Ok(Committed::new(CallbackOutcome::Paid {
                    order_id,
                    changed: false,
                }));
            }
            let (changed, order) = match try_transition(&txn, order, OrderStatus::Paid, None).await
            {
                Ok(result) => result,
                Err(ServiceError::InvalidOperation(_)) => {
                    return ignored(IgnoredCallback::IllegalTransition)
                }
                Err(e) => return Err(e),
            };
            let items = OrderItem::find()
                .filter(order_item::Column::OrderId.eq(order_id))
                .all(&txn)
                .await?;
            lock_products(&txn, items.iter().map(|i| i.product_id)).await?;
            commit_order_stock(&txn, order_number, &items, "(payment)", StockGuard::Unchecked)
                .await?;
            txn.commit().await?;

            Ok(Committed::new(CallbackOutcome::Paid { order_id, changed })
                .with(Notification::order_confirmed(&order)))
        } else {
            let (changed, _) =
                match try_transition(&txn, order, OrderStatus::Canceled, None).await {
                    Ok(result) => result,
                    Err(ServiceError::InvalidOperation(_)) => {
                        return ignored(IgnoredCallback::IllegalTransition)
                    }
                    Err(e) => return Err(e),
                };
            txn.commit().await?;
            Ok(Committed::new(CallbackOutcome::Canceled { order_id, changed }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_labels_distinguish_duplicates() {
        let id = Uuid::new_v4();
        assert_eq!(
            CallbackOutcome::Paid {
                order_id: id,
                changed: true
            }
            .label(),
            "paid"
        );
        assert_eq!(
            CallbackOutcome::Paid {
                order_id: id,
                changed: false
            }
            .label(),
            "already_paid"
        );
        assert_eq!(
            CallbackOutcome::Ignored(IgnoredCallback::BadSignature).label(),
            "bad_signature"
        );
    }
}
