use crate::{
    db::DbPool,
    entities::{
        order::{self, Entity as Order, OrderStatus},
        order_item::{self, Entity as OrderItem},
        return_item::{self, Entity as ReturnItem},
        return_request::{self, Entity as ReturnRequest, ReturnStatus},
    },
    errors::ServiceError,
    notifications::{Committed, Notification},
    services::{
        inventory::{self, VariantRef},
        orders::lock_products,
    },
};
use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, JoinType, QueryFilter,
    QueryOrder, QuerySelect, RelationTrait, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

pub const DEFAULT_RETURN_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ReturnLineRequest {
    pub order_item_id: Uuid,
    #[validate(range(min = 1, message = "quantity must be at least 1"))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateReturnRequest {
    pub order_id: Uuid,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub items: Vec<ReturnLineRequest>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateReturnStatusRequest {
    pub status: ReturnStatus,
    #[serde(default)]
    pub admin_note: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReturnItemResponse {
    pub id: Uuid,
    pub order_item_id: Uuid,
    pub product_id: Option<Uuid>,
    pub product_name: Option<String>,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReturnResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub order_number: Option<i32>,
    pub user_id: Uuid,
    pub reason: String,
    pub status: ReturnStatus,
    pub admin_note: Option<String>,
    pub items: Vec<ReturnItemResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Whether a return may still be raised for an order last transitioned at
/// `status_changed_at`.
pub fn within_window(status_changed_at: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    now - status_changed_at <= window
}

/// Return requests and their settlement back into stock.
#[derive(Clone)]
pub struct ReturnsService {
    db: Arc<DbPool>,
    window: Duration,
}

impl ReturnsService {
    pub fn new(db: Arc<DbPool>, window_days: i64) -> Self {
        Self {
            db,
            window: Duration::days(window_days),
        }
    }

    /// Raises a return for a delivered order owned by `user_id`.
    #[instrument(skip(self, request), fields(user_id = %user_id, order_id = %request.order_id))]
    pub async fn create(
        &self,
        user_id: Uuid,
        request: CreateReturnRequest,
    ) -> Result<ReturnResponse, ServiceError> {
        let reason = request.reason.trim().to_string();
        if reason.is_empty() {
            return Err(ServiceError::ValidationError("reason is required".to_string()));
        }
        if request.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "at least one item is required".to_string(),
            ));
        }
        for line in &request.items {
            line.validate()?;
        }

        let txn = self.db.begin().await?;
        let order = Order::find_by_id(request.order_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", request.order_id))?;
        if order.user_id != user_id {
            return Err(ServiceError::Forbidden(
                "order belongs to another user".to_string(),
            ));
        }
        if order.status != OrderStatus::Delivered {
            return Err(ServiceError::ValidationError(
                "only delivered orders can be returned".to_string(),
            ));
        }
        if !within_window(order.status_changed_at, Utc::now(), self.window) {
            return Err(ServiceError::ValidationError(format!(
                "the {} day return window has closed",
                self.window.num_days()
            )));
        }

        let ordered: HashMap<Uuid, order_item::Model> = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .all(&txn)
            .await?
            .into_iter()
            .map(|i| (i.id, i))
            .collect();
        let already = Self::requested_quantities(&txn, order.id).await?;

        let mut wanted: HashMap<Uuid, i32> = HashMap::new();
        for line in &request.items {
            let item = ordered.get(&line.order_item_id).ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "item {} is not part of this order",
                    line.order_item_id
                ))
            })?;
            let total = wanted.entry(item.id).or_insert(0);
            *total += line.quantity;
            let remaining = item.quantity - already.get(&item.id).copied().unwrap_or(0);
            if *total > remaining {
                return Err(ServiceError::ValidationError(format!(
                    "at most {} of {} can still be returned",
                    remaining.max(0),
                    item.product_name
                )));
            }
        }

        let now = Utc::now();
        let saved = return_request::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            user_id: Set(user_id),
            reason: Set(reason),
            status: Set(ReturnStatus::Pending),
            admin_note: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(request.items.len());
        for line in &request.items {
            items.push(
                return_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    return_request_id: Set(saved.id),
                    order_item_id: Set(line.order_item_id),
                    quantity: Set(line.quantity),
                }
                .insert(&txn)
                .await?,
            );
        }
        txn.commit().await?;

        info!(return_id = %saved.id, "return requested");
        Ok(Self::response(saved, order.order_number, items, &ordered))
    }

    /// Quantities per order item already claimed by returns that were not rejected.
    async fn requested_quantities<C: ConnectionTrait>(
        conn: &C,
        order_id: Uuid,
    ) -> Result<HashMap<Uuid, i32>, ServiceError> {
        let rows = ReturnItem::find()
            .join(JoinType::InnerJoin, return_item::Relation::ReturnRequest.def())
            .filter(return_request::Column::OrderId.eq(order_id))
            .filter(return_request::Column::Status.ne(ReturnStatus::Rejected))
            .all(conn)
            .await?;
        let mut totals = HashMap::new();
        for row in rows {
            *totals.entry(row.order_item_id).or_insert(0) += row.quantity;
        }
        Ok(totals)
    }

    fn response(
        request: return_request::Model,
        order_number: Option<i32>,
        items: Vec<return_item::Model>,
        ordered: &HashMap<Uuid, order_item::Model>,
    ) -> ReturnResponse {
        ReturnResponse {
            id: request.id,
            order_id: request.order_id,
            order_number,
            user_id: request.user_id,
            reason: request.reason,
            status: request.status,
            admin_note: request.admin_note,
            items: items
                .into_iter()
                .map(|i| {
                    let source = ordered.get(&i.order_item_id);
                    ReturnItemResponse {
                        id: i.id,
                        order_item_id: i.order_item_id,
                        product_id: source.map(|s| s.product_id),
                        product_name: source.map(|s| s.product_name.clone()),
                        quantity: i.quantity,
                    }
                })
                .collect(),
            created_at: request.created_at,
            updated_at: request.updated_at,
        }
    }

    async fn load_responses(
        &self,
        requests: Vec<return_request::Model>,
    ) -> Result<Vec<ReturnResponse>, ServiceError> {
        let db = self.db.as_ref();
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let request_ids: Vec<Uuid> = requests.iter().map(|r| r.id).collect();
        let order_ids: Vec<Uuid> = requests.iter().map(|r| r.order_id).collect();

        let mut items_by_request: HashMap<Uuid, Vec<return_item::Model>> = HashMap::new();
        for item in ReturnItem::find()
            .filter(return_item::Column::ReturnRequestId.is_in(request_ids))
            .all(db)
            .await?
        {
            items_by_request
                .entry(item.return_request_id)
                .or_default()
                .push(item);
        }
        let numbers: HashMap<Uuid, Option<i32>> = Order::find()
            .filter(order::Column::Id.is_in(order_ids.clone()))
            .all(db)
            .await?
            .into_iter()
            .map(|o| (o.id, o.order_number))
            .collect();
        let ordered: HashMap<Uuid, order_item::Model> = OrderItem::find()
            .filter(order_item::Column::OrderId.is_in(order_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|i| (i.id, i))
            .collect();

        Ok(requests
            .into_iter()
            .map(|r| {
                let items = items_by_request.remove(&r.id).unwrap_or_default();
                let number = numbers.get(&r.order_id).copied().flatten();
                Self::response(r, number, items, &ordered)
            })
            .collect())
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<ReturnResponse>, ServiceError> {
        let requests = ReturnRequest::find()
            .filter(return_request::Column::UserId.eq(user_id))
            .order_by_desc(return_request::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        self.load_responses(requests).await
    }

    pub async fn list_all(
        &self,
        status: Option<ReturnStatus>,
    ) -> Result<Vec<ReturnResponse>, ServiceError> {
        let mut query = ReturnRequest::find();
        if let Some(status) = status {
            query = query.filter(return_request::Column::Status.eq(status));
        }
        let requests = query
            .order_by_desc(return_request::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        self.load_responses(requests).await
    }

    /// Admin decision on a return. REFUNDED credits every returned unit back
    /// to stock in the same transaction; repeating REFUNDED changes nothing.
    #[instrument(skip(self, admin_note), fields(return_id = %return_id, target = %target))]
    pub async fn update_status(
        &self,
        return_id: Uuid,
        target: ReturnStatus,
        admin_note: Option<String>,
    ) -> Result<Committed<ReturnResponse>, ServiceError> {
        if target == ReturnStatus::Pending {
            return Err(ServiceError::ValidationError(
                "a return cannot be moved back to PENDING".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let request = ReturnRequest::find_by_id(return_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Return request", return_id))?;
        let order = Order::find_by_id(request.order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", request.order_id))?;
        let items = ReturnItem::find()
            .filter(return_item::Column::ReturnRequestId.eq(request.id))
            .all(&txn)
            .await?;
        let ordered: HashMap<Uuid, order_item::Model> = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .all(&txn)
            .await?
            .into_iter()
            .map(|i| (i.id, i))
            .collect();

        if request.status == ReturnStatus::Refunded && target == ReturnStatus::Refunded {
            return Ok(Committed::new(Self::response(
                request,
                order.order_number,
                items,
                &ordered,
            )));
        }
        if request.status.is_terminal() {
            return Err(ServiceError::InvalidOperation(format!(
                "return request is already {}",
                request.status
            )));
        }

        let mut active: return_request::ActiveModel = request.into();
        active.status = Set(target);
        if let Some(note) = admin_note {
            active.admin_note = Set(Some(note));
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        if target == ReturnStatus::Refunded {
            let note = format!("Return credit (request #{})", updated.short_id());
            lock_products(
                &txn,
                items
                    .iter()
                    .filter_map(|i| ordered.get(&i.order_item_id))
                    .map(|o| o.product_id),
            )
            .await?;
            for item in &items {
                let source = ordered.get(&item.order_item_id).ok_or_else(|| {
                    ServiceError::InternalError(format!(
                        "order item {} of return {} is missing",
                        item.order_item_id, updated.id
                    ))
                })?;
                inventory::restock(
                    &txn,
                    source.product_id,
                    VariantRef::from_ids(source.size_id, source.color_id),
                    item.quantity,
                    note.clone(),
                )
                .await?;
            }
        }
        txn.commit().await?;

        info!(status = %updated.status, "return status updated");
        let mut committed = Committed::new(());
        if target == ReturnStatus::Refunded {
            counter!("storefront.returns.refunded", 1);
            committed = committed.with(Notification::refund_issued(&updated, &order));
        }
        Ok(committed.map(|_| Self::response(updated, order.order_number, items, &ordered)))
    }

    pub async fn approve_refund(
        &self,
        return_id: Uuid,
    ) -> Result<Committed<ReturnResponse>, ServiceError> {
        self.update_status(return_id, ReturnStatus::Refunded, None)
            .await
    }
}
