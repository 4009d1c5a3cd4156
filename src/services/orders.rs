use crate::{
    db::DbPool,
    entities::{
        address::{self, Entity as Address},
        cart_item::{self, Entity as CartItem},
        order::{self, check_transition, Entity as Order, OrderStatus, TransitionCheck},
        order_item::{self, Entity as OrderItem},
        product::{self, Entity as Product},
        product_color::{self, Entity as ProductColor},
        product_size::{self, Entity as ProductSize},
    },
    errors::ServiceError,
    notifications::{Committed, Notification},
    services::{
        inventory::{self, StockGuard, VariantRef},
        non_blank,
        order_numbers::{classify_insert_error, OrderNumberAllocator},
    },
};
use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// One requested line of an order.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct OrderLineRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "quantity must be at least 1"))]
    pub quantity: i32,
    #[serde(default)]
    pub size_id: Option<Uuid>,
    #[serde(default)]
    pub color_id: Option<Uuid>,
}

/// Inline shipping destination, copied verbatim into the order.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ShippingInput {
    #[validate(custom = "non_blank")]
    pub full_name: String,
    #[validate(custom = "non_blank")]
    pub phone: String,
    #[validate(custom = "non_blank")]
    pub city: String,
    #[validate(custom = "non_blank")]
    pub district: String,
    #[serde(default)]
    pub neighborhood: Option<String>,
    #[validate(custom = "non_blank")]
    pub address_line: String,
    #[serde(default)]
    pub postal_code: Option<String>,
}

/// Body shared by direct order creation and payment start.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PlaceOrderRequest {
    #[serde(default)]
    pub items: Vec<OrderLineRequest>,
    #[serde(default)]
    pub shipping_address_id: Option<Uuid>,
    #[serde(default)]
    pub shipping: Option<ShippingInput>,
    #[serde(default)]
    pub customer_note: Option<String>,
}

impl PlaceOrderRequest {
    /// Shape checks that need no database access.
    pub fn check(&self) -> Result<(), ServiceError> {
        if self.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "at least one item is required".to_string(),
            ));
        }
        for line in &self.items {
            line.validate()?;
        }
        match (&self.shipping_address_id, &self.shipping) {
            (Some(_), _) => Ok(()),
            (None, Some(inline)) => Ok(inline.validate()?),
            (None, None) => Err(ServiceError::ValidationError(
                "a saved address or an inline shipping destination is required".to_string(),
            )),
        }
    }
}

/// An order request bound to its caller.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub user_id: Uuid,
    pub contact_email: Option<String>,
    pub request: PlaceOrderRequest,
}

/// Decides the initial status and whether stock moves at placement time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementMode {
    /// Paid up front: status PAID, stock decremented in the same transaction.
    Direct,
    /// Paid later through the provider: status PENDING, stock only checked.
    Provider,
}

impl PlacementMode {
    fn initial_status(self) -> OrderStatus {
        match self {
            PlacementMode::Direct => OrderStatus::Paid,
            PlacementMode::Provider => OrderStatus::Pending,
        }
    }

    fn label(self) -> &'static str {
        match self {
            PlacementMode::Direct => "direct",
            PlacementMode::Provider => "provider",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ShippingSnapshot {
    address_id: Option<Uuid>,
    name: String,
    phone: String,
    city: String,
    district: String,
    neighborhood: Option<String>,
    address_line: String,
    postal_code: Option<String>,
}

impl From<address::Model> for ShippingSnapshot {
    fn from(a: address::Model) -> Self {
        Self {
            address_id: Some(a.id),
            name: a.full_name,
            phone: a.phone,
            city: a.city,
            district: a.district,
            neighborhood: a.neighborhood,
            address_line: a.address_line,
            postal_code: a.postal_code,
        }
    }
}

impl From<&ShippingInput> for ShippingSnapshot {
    fn from(s: &ShippingInput) -> Self {
        Self {
            address_id: None,
            name: s.full_name.trim().to_string(),
            phone: s.phone.trim().to_string(),
            city: s.city.trim().to_string(),
            district: s.district.trim().to_string(),
            neighborhood: s.neighborhood.clone(),
            address_line: s.address_line.trim().to_string(),
            postal_code: s.postal_code.clone(),
        }
    }
}

/// A requested line resolved against the live catalog.
#[derive(Debug, Clone)]
pub(crate) struct PricedLine {
    pub product: product::Model,
    pub quantity: i32,
    pub size: Option<product_size::Model>,
    pub color: Option<product_color::Model>,
}

impl PricedLine {
    pub fn stock_source(&self) -> Option<VariantRef> {
        VariantRef::from_ids(
            self.size.as_ref().map(|s| s.id),
            self.color.as_ref().map(|c| c.id),
        )
    }

    fn available(&self) -> i32 {
        match (&self.size, &self.color) {
            (Some(size), _) => size.stock,
            (None, Some(color)) => color.stock,
            (None, None) => self.product.stock,
        }
    }

    pub fn unit_price(&self) -> Decimal {
        self.product.price
    }

    pub fn line_total(&self) -> Decimal {
        self.product.price * Decimal::from(self.quantity)
    }
}

/// Resolves every line against current prices and stock. Repeated lines on
/// the same stock source are checked against their combined quantity.
pub(crate) async fn price_lines<C: ConnectionTrait>(
    conn: &C,
    lines: &[OrderLineRequest],
) -> Result<(Vec<PricedLine>, Decimal), ServiceError> {
    let mut priced = Vec::with_capacity(lines.len());
    let mut requested: HashMap<(Uuid, Option<VariantRef>), i32> = HashMap::new();
    let mut total = Decimal::ZERO;

    for line in lines {
        let product = Product::find_by_id(line.product_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", line.product_id))?;

        let size = match line.size_id {
            Some(id) => Some(
                ProductSize::find_by_id(id)
                    .filter(product_size::Column::ProductId.eq(product.id))
                    .one(conn)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("Size", id))?,
            ),
            None => None,
        };
        let color = match line.color_id {
            Some(id) => Some(
                ProductColor::find_by_id(id)
                    .filter(product_color::Column::ProductId.eq(product.id))
                    .one(conn)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("Color", id))?,
            ),
            None => None,
        };

        let line = PricedLine {
            product,
            quantity: line.quantity,
            size,
            color,
        };

        let cumulative = requested
            .entry((line.product.id, line.stock_source()))
            .or_insert(0);
        *cumulative += line.quantity;
        if *cumulative > line.available() {
            return Err(ServiceError::InsufficientStock {
                available: i64::from(line.available()),
                requested: i64::from(*cumulative),
            });
        }

        total += line.line_total();
        priced.push(line);
    }

    Ok((priced, total))
}

async fn resolve_shipping<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    request: &PlaceOrderRequest,
) -> Result<ShippingSnapshot, ServiceError> {
    match (request.shipping_address_id, &request.shipping) {
        (Some(address_id), _) => Address::find_by_id(address_id)
            .filter(address::Column::UserId.eq(user_id))
            .one(conn)
            .await?
            .map(ShippingSnapshot::from)
            .ok_or_else(|| ServiceError::not_found("Address", address_id)),
        (None, Some(inline)) => Ok(ShippingSnapshot::from(inline)),
        (None, None) => Err(ServiceError::ValidationError(
            "a saved address or an inline shipping destination is required".to_string(),
        )),
    }
}

/// Locks product rows in id order so concurrent writers cannot deadlock.
pub(crate) async fn lock_products<C, I>(conn: &C, product_ids: I) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
    I: IntoIterator<Item = Uuid>,
{
    let ordered: BTreeSet<Uuid> = product_ids.into_iter().collect();
    for product_id in ordered {
        inventory::lock_product(conn, product_id).await?;
    }
    Ok(())
}

/// Decrements stock for every item of an order and logs one movement each.
pub(crate) async fn commit_order_stock<C: ConnectionTrait>(
    conn: &C,
    order_number: i32,
    items: &[order_item::Model],
    note: &str,
    guard: StockGuard,
) -> Result<(), ServiceError> {
    for item in items {
        inventory::apply_movement(
            conn,
            item.product_id,
            VariantRef::from_ids(item.size_id, item.color_id),
            -item.quantity,
            format!("Order #{} {}", order_number, note),
            guard,
        )
        .await?;
    }
    Ok(())
}

/// Carrier metadata accepted with a shipping transition.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ShipmentInfo {
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
}

/// Moves `order` to `target` when the state machine allows it. Already being
/// in `target` is a no-op and reports `false`.
pub(crate) async fn try_transition<C: ConnectionTrait>(
    conn: &C,
    order: order::Model,
    target: OrderStatus,
    shipment: Option<&ShipmentInfo>,
) -> Result<(bool, order::Model), ServiceError> {
    match check_transition(order.status, target) {
        TransitionCheck::Unchanged => Ok((false, order)),
        TransitionCheck::Rejected => Err(ServiceError::InvalidOperation(format!(
            "order cannot move from {} to {}",
            order.status, target
        ))),
        TransitionCheck::Allowed => {
            let now = Utc::now();
            let mut active: order::ActiveModel = order.into();
            active.status = Set(target);
            active.status_changed_at = Set(now);
            active.updated_at = Set(now);
            if let Some(info) = shipment {
                if info.carrier.is_some() {
                    active.carrier = Set(info.carrier.clone());
                }
                if info.tracking_number.is_some() {
                    active.tracking_number = Set(info.tracking_number.clone());
                }
            }
            let updated = active.update(conn).await?;
            Ok((true, updated))
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub price: Decimal,
    pub line_total: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_label: Option<String>,
}

impl From<order_item::Model> for OrderItemResponse {
    fn from(item: order_item::Model) -> Self {
        Self {
            line_total: item.line_total(),
            id: item.id,
            product_id: item.product_id,
            product_name: item.product_name,
            quantity: item.quantity,
            price: item.price,
            size_id: item.size_id,
            color_id: item.color_id,
            size_label: item.size_label,
            color_label: item.color_label,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ShippingResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_id: Option<Uuid>,
    pub name: String,
    pub phone: String,
    pub city: String,
    pub district: String,
    pub neighborhood: Option<String>,
    pub address_line: String,
    pub postal_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: Option<i32>,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub total: Decimal,
    pub shipping: ShippingResponse,
    pub customer_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    pub items: Vec<OrderItemResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status_changed_at: DateTime<Utc>,
}

impl OrderResponse {
    pub fn new(order: order::Model, items: Vec<order_item::Model>) -> Self {
        Self {
            id: order.id,
            order_number: order.order_number,
            user_id: order.user_id,
            status: order.status,
            total: order.total,
            shipping: ShippingResponse {
                address_id: order.shipping_address_id,
                name: order.shipping_name,
                phone: order.shipping_phone,
                city: order.shipping_city,
                district: order.shipping_district,
                neighborhood: order.shipping_neighborhood,
                address_line: order.shipping_address_line,
                postal_code: order.shipping_postal_code,
            },
            customer_note: order.customer_note,
            payment_reference: order.payment_reference,
            carrier: order.carrier,
            tracking_number: order.tracking_number,
            items: items.into_iter().map(OrderItemResponse::from).collect(),
            created_at: order.created_at,
            updated_at: order.updated_at,
            status_changed_at: order.status_changed_at,
        }
    }
}

/// Order written by one successful placement attempt.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    /// Lines as priced at placement, used for provider baskets.
    pub(crate) lines: Vec<PricedLine>,
}

impl PlacedOrder {
    pub fn order_number(&self) -> i32 {
        self.order.order_number.unwrap_or_default()
    }

    pub fn into_response(self) -> OrderResponse {
        OrderResponse::new(self.order, self.items)
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    #[serde(flatten)]
    pub shipment: ShipmentInfo,
}

/// Order assembly plus order queries and admin transitions.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    allocator: OrderNumberAllocator,
}

impl OrderService {
    pub fn new(db: Arc<DbPool>, allocator: OrderNumberAllocator) -> Self {
        Self { db, allocator }
    }

    pub fn allocator(&self) -> &OrderNumberAllocator {
        &self.allocator
    }

    /// Validates and persists an order, retrying the whole attempt on an
    /// order number collision. `clear_cart` empties the caller's cart in the
    /// same transaction.
    #[instrument(skip(self, draft), fields(user_id = %draft.user_id, mode = mode.label()))]
    pub async fn place(
        &self,
        draft: &OrderDraft,
        mode: PlacementMode,
        clear_cart: bool,
    ) -> Result<PlacedOrder, ServiceError> {
        draft.request.check()?;

        let placed = self
            .allocator
            .retry_on_collision(move |_| self.place_once(draft, mode, clear_cart, None))
            .await?;

        counter!("storefront.orders.placed", 1, "mode" => mode.label());
        info!(
            order_id = %placed.order.id,
            order_number = placed.order_number(),
            total = %placed.order.total,
            "order placed"
        );
        Ok(placed)
    }

    /// One allocate-validate-insert attempt. `number` replaces the allocator's
    /// read, standing in for a number another writer may already hold.
    async fn place_once(
        &self,
        draft: &OrderDraft,
        mode: PlacementMode,
        clear_cart: bool,
        number: Option<i32>,
    ) -> Result<PlacedOrder, ServiceError> {
        let request = &draft.request;
        let txn = self.db.begin().await?;

        if mode == PlacementMode::Direct {
            lock_products(&txn, request.items.iter().map(|l| l.product_id)).await?;
        }
        let (lines, total) = price_lines(&txn, &request.items).await?;
        let shipping = resolve_shipping(&txn, draft.user_id, request).await?;
        let order_number = match number {
            Some(n) => n,
            None => self.allocator.next(&txn).await?,
        };

        let now = Utc::now();
        let order = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_number: Set(Some(order_number)),
            user_id: Set(draft.user_id),
            status: Set(mode.initial_status()),
            total: Set(total),
            shipping_address_id: Set(shipping.address_id),
            shipping_name: Set(shipping.name),
            shipping_phone: Set(shipping.phone),
            shipping_city: Set(shipping.city),
            shipping_district: Set(shipping.district),
            shipping_neighborhood: Set(shipping.neighborhood),
            shipping_address_line: Set(shipping.address_line),
            shipping_postal_code: Set(shipping.postal_code),
            customer_note: Set(request
                .customer_note
                .as_ref()
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())),
            contact_email: Set(draft.contact_email.clone()),
            payment_reference: Set(None),
            carrier: Set(None),
            tracking_number: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            status_changed_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| classify_insert_error(e, order_number))?;

        let mut items = Vec::with_capacity(lines.len());
        for line in &lines {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                product_id: Set(line.product.id),
                product_name: Set(line.product.name.clone()),
                quantity: Set(line.quantity),
                price: Set(line.unit_price()),
                size_id: Set(line.size.as_ref().map(|s| s.id)),
                color_id: Set(line.color.as_ref().map(|c| c.id)),
                size_label: Set(line.size.as_ref().map(|s| s.label.clone())),
                color_label: Set(line.color.as_ref().map(|c| c.label.clone())),
            }
            .insert(&txn)
            .await?;
            items.push(item);
        }

        if mode == PlacementMode::Direct {
            commit_order_stock(&txn, order_number, &items, "sale", StockGuard::NonNegative)
                .await?;
        }

        if clear_cart {
            CartItem::delete_many()
                .filter(cart_item::Column::UserId.eq(draft.user_id))
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;
        Ok(PlacedOrder {
            order,
            items,
            lines,
        })
    }

    async fn load_items<C: ConnectionTrait>(
        conn: &C,
        order_id: Uuid,
    ) -> Result<Vec<order_item::Model>, ServiceError> {
        Ok(OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(conn)
            .await?)
    }

    async fn with_items(
        &self,
        orders: Vec<order::Model>,
    ) -> Result<Vec<OrderResponse>, ServiceError> {
        let db = self.db.as_ref();
        let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let mut grouped: HashMap<Uuid, Vec<order_item::Model>> = HashMap::new();
        if !ids.is_empty() {
            for item in OrderItem::find()
                .filter(order_item::Column::OrderId.is_in(ids))
                .all(db)
                .await?
            {
                grouped.entry(item.order_id).or_default().push(item);
            }
        }
        Ok(orders
            .into_iter()
            .map(|o| {
                let items = grouped.remove(&o.id).unwrap_or_default();
                OrderResponse::new(o, items)
            })
            .collect())
    }

    /// Visible to its owner and to admins; anyone else gets NotFound.
    pub async fn get_order(
        &self,
        order_id: Uuid,
        viewer: Uuid,
        is_admin: bool,
    ) -> Result<OrderResponse, ServiceError> {
        let db = self.db.as_ref();
        let order = Order::find_by_id(order_id)
            .one(db)
            .await?
            .filter(|o| is_admin || o.user_id == viewer)
            .ok_or_else(|| ServiceError::not_found("Order", order_id))?;
        let items = Self::load_items(db, order.id).await?;
        Ok(OrderResponse::new(order, items))
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<OrderResponse>, ServiceError> {
        let orders = Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        self.with_items(orders).await
    }

    pub async fn list_all(
        &self,
        status: Option<OrderStatus>,
    ) -> Result<Vec<OrderResponse>, ServiceError> {
        let mut query = Order::find();
        if let Some(status) = status {
            query = query.filter(order::Column::Status.eq(status));
        }
        let orders = query
            .order_by_desc(order::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        self.with_items(orders).await
    }

    /// Admin-driven fulfilment transition. Shipping and delivery produce a
    /// notification; a repeated target changes nothing.
    #[instrument(skip(self, request), fields(order_id = %order_id, target = %request.status))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        request: UpdateOrderStatusRequest,
    ) -> Result<Committed<OrderResponse>, ServiceError> {
        let target = request.status;
        if !matches!(
            target,
            OrderStatus::Shipped | OrderStatus::Delivered | OrderStatus::Canceled
        ) {
            return Err(ServiceError::ValidationError(format!(
                "status {} cannot be set manually",
                target
            )));
        }

        let txn = self.db.begin().await?;
        let order = Order::find_by_id(order_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", order_id))?;

        if target == OrderStatus::Canceled && order.status != target && !order.status.is_unpaid()
        {
            return Err(ServiceError::InvalidOperation(format!(
                "a {} order cannot be canceled manually",
                order.status
            )));
        }

        let (changed, order) = try_transition(&txn, order, target, Some(&request.shipment)).await?;
        let items = Self::load_items(&txn, order.id).await?;
        txn.commit().await?;

        let mut committed = Committed::new(());
        if changed {
            info!(status = %order.status, "order status updated");
            match order.status {
                OrderStatus::Shipped => committed = committed.with(Notification::order_shipped(&order)),
                OrderStatus::Delivered => {
                    committed = committed.with(Notification::order_delivered(&order))
                }
                _ => {}
            }
        }
        Ok(committed.map(|_| OrderResponse::new(order, items)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn line(quantity: i32) -> OrderLineRequest {
        OrderLineRequest {
            product_id: Uuid::new_v4(),
            quantity,
            size_id: None,
            color_id: None,
        }
    }

    fn inline_shipping() -> ShippingInput {
        ShippingInput {
            full_name: "Ada Lovelace".into(),
            phone: "+90 555 000 0000".into(),
            city: "Izmir".into(),
            district: "Konak".into(),
            neighborhood: None,
            address_line: "1 Main St".into(),
            postal_code: Some("35000".into()),
        }
    }

    #[test]
    fn empty_item_list_is_rejected() {
        let request = PlaceOrderRequest {
            shipping: Some(inline_shipping()),
            ..Default::default()
        };
        assert_matches!(request.check(), Err(ServiceError::ValidationError(_)));
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let request = PlaceOrderRequest {
            items: vec![line(0)],
            shipping: Some(inline_shipping()),
            ..Default::default()
        };
        assert_matches!(request.check(), Err(ServiceError::ValidationError(_)));
    }

    #[test]
    fn shipping_destination_is_required() {
        let request = PlaceOrderRequest {
            items: vec![line(1)],
            ..Default::default()
        };
        assert_matches!(request.check(), Err(ServiceError::ValidationError(_)));
    }

    #[test]
    fn blank_inline_fields_are_rejected() {
        let mut shipping = inline_shipping();
        shipping.city = "   ".into();
        let request = PlaceOrderRequest {
            items: vec![line(1)],
            shipping: Some(shipping),
            ..Default::default()
        };
        assert_matches!(request.check(), Err(ServiceError::ValidationError(_)));
    }

    async fn memory_db() -> Arc<DbPool> {
        let mut cfg = crate::config::AppConfig::new(
            "sqlite::memory:".to_string(),
            "order-service-unit-test-secret-0123456789".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        let pool = crate::db::establish_connection_from_app_config(&cfg)
            .await
            .expect("database");
        crate::db::run_migrations(&pool).await.expect("migrations");
        Arc::new(pool)
    }

    async fn seeded_draft(db: &Arc<DbPool>, stock: i32) -> (OrderDraft, Uuid) {
        let product = crate::services::catalog::CatalogService::new(db.clone())
            .create_product(crate::services::catalog::CreateProductRequest {
                name: "Scarf".into(),
                price: Decimal::new(1500, 2),
                stock,
                sizes: vec![],
                colors: vec![],
            })
            .await
            .expect("product");
        let mut line = line(1);
        line.product_id = product.id;
        let draft = OrderDraft {
            user_id: Uuid::new_v4(),
            contact_email: Some("ada@example.com".into()),
            request: PlaceOrderRequest {
                items: vec![line],
                shipping: Some(inline_shipping()),
                ..Default::default()
            },
        };
        (draft, product.id)
    }

    async fn stock_of(db: &Arc<DbPool>, product_id: Uuid) -> i32 {
        Product::find_by_id(product_id)
            .one(db.as_ref())
            .await
            .expect("query")
            .expect("product")
            .stock
    }

    #[tokio::test]
    async fn duplicate_number_insert_is_a_collision() {
        let db = memory_db().await;
        let service = OrderService::new(db.clone(), OrderNumberAllocator::default());
        let (draft, product_id) = seeded_draft(&db, 5).await;

        let first = service
            .place(&draft, PlacementMode::Direct, false)
            .await
            .expect("first order");
        assert_eq!(first.order_number(), 4758);

        let clash = service
            .place_once(&draft, PlacementMode::Direct, false, Some(4758))
            .await;
        assert_matches!(clash, Err(ServiceError::OrderNumberTaken(4758)));
        assert_eq!(stock_of(&db, product_id).await, 4);
    }

    #[tokio::test]
    async fn collision_retries_with_a_fresh_number() {
        let db = memory_db().await;
        let service = OrderService::new(db.clone(), OrderNumberAllocator::default());
        let (draft, product_id) = seeded_draft(&db, 5).await;
        service
            .place(&draft, PlacementMode::Direct, false)
            .await
            .expect("first order");

        let attempts = std::cell::Cell::new(0u32);
        let (service, draft, attempts_seen) = (&service, &draft, &attempts);
        let placed = service
            .allocator()
            .retry_on_collision(move |attempt| {
                attempts_seen.set(attempt);
                // The first attempt replays a read taken before 4758 committed.
                let stale = (attempt == 1).then_some(4758);
                service.place_once(draft, PlacementMode::Direct, false, stale)
            })
            .await
            .expect("retried order");

        assert_eq!(attempts.get(), 2);
        assert_eq!(placed.order_number(), 4759);
        assert_eq!(stock_of(&db, product_id).await, 3);
        assert_eq!(Order::find().all(db.as_ref()).await.expect("orders").len(), 2);
    }

    #[test]
    fn saved_address_reference_skips_inline_checks() {
        let request = PlaceOrderRequest {
            items: vec![line(2)],
            shipping_address_id: Some(Uuid::new_v4()),
            ..Default::default()
        };
        assert!(request.check().is_ok());
    }
}
