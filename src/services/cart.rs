use crate::{
    db::DbPool,
    entities::{
        cart_item::{self, Entity as CartItem},
        product::Entity as Product,
        product_color::Entity as ProductColor,
        product_size::Entity as ProductSize,
    },
    errors::ServiceError,
    services::orders::{price_lines, OrderLineRequest},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Select, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct AddCartItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "quantity must be at least 1"))]
    pub quantity: i32,
    #[serde(default)]
    pub size_id: Option<Uuid>,
    #[serde(default)]
    pub color_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UpdateCartItemRequest {
    #[validate(range(min = 1, message = "quantity must be at least 1"))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartLineResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub size_id: Option<Uuid>,
    pub size_label: Option<String>,
    pub color_id: Option<Uuid>,
    pub color_label: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartResponse {
    pub items: Vec<CartLineResponse>,
    pub total: Decimal,
}

fn same_variant(
    query: Select<CartItem>,
    size_id: Option<Uuid>,
    color_id: Option<Uuid>,
) -> Select<CartItem> {
    let query = match size_id {
        Some(id) => query.filter(cart_item::Column::SizeId.eq(id)),
        None => query.filter(cart_item::Column::SizeId.is_null()),
    };
    match color_id {
        Some(id) => query.filter(cart_item::Column::ColorId.eq(id)),
        None => query.filter(cart_item::Column::ColorId.is_null()),
    }
}

/// Persistent per-user cart. Prices are never stored on cart lines.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DbPool>,
}

impl CartService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Fails with NotFound for unknown products or variants and with
    /// InsufficientStock when `quantity` exceeds the live stock source.
    async fn ensure_available(
        &self,
        product_id: Uuid,
        size_id: Option<Uuid>,
        color_id: Option<Uuid>,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        price_lines(
            self.db.as_ref(),
            &[OrderLineRequest {
                product_id,
                quantity,
                size_id,
                color_id,
            }],
        )
        .await
        .map(|_| ())
    }

    async fn owned_line(
        &self,
        user_id: Uuid,
        line_id: Uuid,
    ) -> Result<cart_item::Model, ServiceError> {
        CartItem::find_by_id(line_id)
            .filter(cart_item::Column::UserId.eq(user_id))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::not_found("Cart item", line_id))
    }

    pub async fn get(&self, user_id: Uuid) -> Result<CartResponse, ServiceError> {
        let db = self.db.as_ref();
        let lines = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(db)
            .await?;

        let mut items = Vec::with_capacity(lines.len());
        let mut total = Decimal::ZERO;
        for line in lines {
            let Some(product) = Product::find_by_id(line.product_id).one(db).await? else {
                debug!(cart_item_id = %line.id, "cart line refers to a missing product");
                continue;
            };
            let size_label = match line.size_id {
                Some(id) => ProductSize::find_by_id(id).one(db).await?.map(|s| s.label),
                None => None,
            };
            let color_label = match line.color_id {
                Some(id) => ProductColor::find_by_id(id).one(db).await?.map(|c| c.label),
                None => None,
            };
            let line_total = product.price * Decimal::from(line.quantity);
            total += line_total;
            items.push(CartLineResponse {
                id: line.id,
                product_id: product.id,
                product_name: product.name,
                size_id: line.size_id,
                size_label,
                color_id: line.color_id,
                color_label,
                quantity: line.quantity,
                unit_price: product.price,
                line_total,
            });
        }
        Ok(CartResponse { items, total })
    }

    /// Adds a line, merging with an identical product/variant line.
    #[instrument(skip(self, request), fields(user_id = %user_id, product_id = %request.product_id))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        request: AddCartItemRequest,
    ) -> Result<CartResponse, ServiceError> {
        request.validate()?;
        let db = self.db.as_ref();

        let existing = same_variant(
            CartItem::find()
                .filter(cart_item::Column::UserId.eq(user_id))
                .filter(cart_item::Column::ProductId.eq(request.product_id)),
            request.size_id,
            request.color_id,
        )
        .one(db)
        .await?;

        let merged = existing.as_ref().map_or(0, |l| l.quantity) + request.quantity;
        self.ensure_available(request.product_id, request.size_id, request.color_id, merged)
            .await?;

        let now = Utc::now();
        match existing {
            Some(line) => {
                let mut active: cart_item::ActiveModel = line.into();
                active.quantity = Set(merged);
                active.updated_at = Set(now);
                active.update(db).await?;
            }
            None => {
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id),
                    product_id: Set(request.product_id),
                    size_id: Set(request.size_id),
                    color_id: Set(request.color_id),
                    quantity: Set(merged),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(db)
                .await?;
            }
        }
        self.get(user_id).await
    }

    pub async fn update_item(
        &self,
        user_id: Uuid,
        line_id: Uuid,
        request: UpdateCartItemRequest,
    ) -> Result<CartResponse, ServiceError> {
        request.validate()?;
        let line = self.owned_line(user_id, line_id).await?;
        self.ensure_available(line.product_id, line.size_id, line.color_id, request.quantity)
            .await?;

        let mut active: cart_item::ActiveModel = line.into();
        active.quantity = Set(request.quantity);
        active.updated_at = Set(Utc::now());
        active.update(self.db.as_ref()).await?;
        self.get(user_id).await
    }

    pub async fn remove_item(
        &self,
        user_id: Uuid,
        line_id: Uuid,
    ) -> Result<CartResponse, ServiceError> {
        let line = self.owned_line(user_id, line_id).await?;
        CartItem::delete_by_id(line.id)
            .exec(self.db.as_ref())
            .await?;
        self.get(user_id).await
    }

    pub async fn clear(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        let result = CartItem::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected)
    }
}
