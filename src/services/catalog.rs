use crate::{
    db::DbPool,
    entities::{
        cart_item::{self, Entity as CartItem},
        order_item::{self, Entity as OrderItem},
        product::{self, Entity as Product},
        product_color::{self, Entity as ProductColor},
        product_size::{self, Entity as ProductSize},
    },
    errors::ServiceError,
    services::{
        inventory::{self, aggregate_stock, VariantRef},
        non_blank,
    },
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

pub const INITIAL_STOCK_NOTE: &str = "Initial stock";

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct VariantInput {
    #[validate(custom = "non_blank")]
    pub label: String,
    #[serde(default)]
    #[validate(range(min = 0, message = "stock cannot be negative"))]
    pub stock: i32,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateProductRequest {
    #[validate(custom = "non_blank")]
    pub name: String,
    pub price: Decimal,
    /// Used only when the product has no variants.
    #[serde(default)]
    #[validate(range(min = 0, message = "stock cannot be negative"))]
    pub stock: i32,
    #[serde(default)]
    pub sizes: Vec<VariantInput>,
    #[serde(default)]
    pub colors: Vec<VariantInput>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VariantResponse {
    pub id: Uuid,
    pub label: String,
    pub stock: i32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProductResponse {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub stock: i32,
    pub sizes: Vec<VariantResponse>,
    pub colors: Vec<VariantResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Products with their size and color variants.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DbPool>,
}

impl CatalogService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    async fn load<C: ConnectionTrait>(
        conn: &C,
        product_id: Uuid,
    ) -> Result<ProductResponse, ServiceError> {
        let product = Product::find_by_id(product_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", product_id))?;
        let sizes = ProductSize::find()
            .filter(product_size::Column::ProductId.eq(product_id))
            .order_by_asc(product_size::Column::CreatedAt)
            .all(conn)
            .await?
            .into_iter()
            .map(|s| VariantResponse {
                id: s.id,
                label: s.label,
                stock: s.stock,
            })
            .collect();
        let colors = ProductColor::find()
            .filter(product_color::Column::ProductId.eq(product_id))
            .order_by_asc(product_color::Column::CreatedAt)
            .all(conn)
            .await?
            .into_iter()
            .map(|c| VariantResponse {
                id: c.id,
                label: c.label,
                stock: c.stock,
            })
            .collect();
        Ok(ProductResponse {
            id: product.id,
            name: product.name,
            price: product.price,
            stock: product.stock,
            sizes,
            colors,
            created_at: product.created_at,
            updated_at: product.updated_at,
        })
    }

    pub async fn get_product(&self, product_id: Uuid) -> Result<ProductResponse, ServiceError> {
        Self::load(self.db.as_ref(), product_id).await
    }

    async fn insert_size<C: ConnectionTrait>(
        conn: &C,
        product_id: Uuid,
        input: &VariantInput,
    ) -> Result<product_size::Model, ServiceError> {
        let size = product_size::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            label: Set(input.label.trim().to_string()),
            stock: Set(input.stock),
            created_at: Set(Utc::now()),
        }
        .insert(conn)
        .await?;
        if size.stock != 0 {
            inventory::record_movement(
                conn,
                product_id,
                Some(VariantRef::Size(size.id)),
                size.stock,
                INITIAL_STOCK_NOTE.to_string(),
            )
            .await?;
        }
        Ok(size)
    }

    async fn insert_color<C: ConnectionTrait>(
        conn: &C,
        product_id: Uuid,
        input: &VariantInput,
    ) -> Result<product_color::Model, ServiceError> {
        let color = product_color::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            label: Set(input.label.trim().to_string()),
            stock: Set(input.stock),
            created_at: Set(Utc::now()),
        }
        .insert(conn)
        .await?;
        if color.stock != 0 {
            inventory::record_movement(
                conn,
                product_id,
                Some(VariantRef::Color(color.id)),
                color.stock,
                INITIAL_STOCK_NOTE.to_string(),
            )
            .await?;
        }
        Ok(color)
    }

    /// Creates a product and its variants. With variants the aggregate
    /// counter follows the size-then-color rule; without, `stock` is used.
    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_product(
        &self,
        request: CreateProductRequest,
    ) -> Result<ProductResponse, ServiceError> {
        request.validate()?;
        for variant in request.sizes.iter().chain(request.colors.iter()) {
            variant.validate()?;
        }
        if request.price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "price cannot be negative".to_string(),
            ));
        }

        let has_variants = !request.sizes.is_empty() || !request.colors.is_empty();
        let stock = if has_variants {
            let sizes: Vec<i32> = request.sizes.iter().map(|s| s.stock).collect();
            let colors: Vec<i32> = request.colors.iter().map(|c| c.stock).collect();
            aggregate_stock(&sizes, &colors)
        } else {
            request.stock
        };

        let txn = self.db.begin().await?;
        let now = Utc::now();
        let product = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name.trim().to_string()),
            price: Set(request.price),
            stock: Set(stock),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        for size in &request.sizes {
            Self::insert_size(&txn, product.id, size).await?;
        }
        for color in &request.colors {
            Self::insert_color(&txn, product.id, color).await?;
        }
        if !has_variants && stock != 0 {
            inventory::record_movement(
                &txn,
                product.id,
                None,
                stock,
                INITIAL_STOCK_NOTE.to_string(),
            )
            .await?;
        }

        let response = Self::load(&txn, product.id).await?;
        txn.commit().await?;
        info!(product_id = %response.id, stock = response.stock, "product created");
        Ok(response)
    }

    pub async fn add_size(
        &self,
        product_id: Uuid,
        input: VariantInput,
    ) -> Result<ProductResponse, ServiceError> {
        input.validate()?;
        let txn = self.db.begin().await?;
        inventory::lock_product(&txn, product_id).await?;
        Self::insert_size(&txn, product_id, &input).await?;
        inventory::recompute_aggregate(&txn, product_id).await?;
        let response = Self::load(&txn, product_id).await?;
        txn.commit().await?;
        Ok(response)
    }

    pub async fn add_color(
        &self,
        product_id: Uuid,
        input: VariantInput,
    ) -> Result<ProductResponse, ServiceError> {
        input.validate()?;
        let txn = self.db.begin().await?;
        inventory::lock_product(&txn, product_id).await?;
        Self::insert_color(&txn, product_id, &input).await?;
        inventory::recompute_aggregate(&txn, product_id).await?;
        let response = Self::load(&txn, product_id).await?;
        txn.commit().await?;
        Ok(response)
    }

    /// Removes a size no order refers to, dropping cart lines that do.
    #[instrument(skip(self), fields(product_id = %product_id, size_id = %size_id))]
    pub async fn remove_size(
        &self,
        product_id: Uuid,
        size_id: Uuid,
    ) -> Result<ProductResponse, ServiceError> {
        let txn = self.db.begin().await?;
        inventory::lock_product(&txn, product_id).await?;
        let size = ProductSize::find_by_id(size_id)
            .filter(product_size::Column::ProductId.eq(product_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Size", size_id))?;

        let ordered = OrderItem::find()
            .filter(order_item::Column::SizeId.eq(size.id))
            .count(&txn)
            .await?;
        if ordered > 0 {
            return Err(ServiceError::Conflict(format!(
                "size {} is referenced by {} order item(s)",
                size.label, ordered
            )));
        }

        CartItem::delete_many()
            .filter(cart_item::Column::SizeId.eq(size.id))
            .exec(&txn)
            .await?;
        ProductSize::delete_by_id(size.id).exec(&txn).await?;
        inventory::recompute_aggregate(&txn, product_id).await?;
        let response = Self::load(&txn, product_id).await?;
        txn.commit().await?;
        Ok(response)
    }

    /// Removes a color no order refers to, dropping cart lines that do.
    #[instrument(skip(self), fields(product_id = %product_id, color_id = %color_id))]
    pub async fn remove_color(
        &self,
        product_id: Uuid,
        color_id: Uuid,
    ) -> Result<ProductResponse, ServiceError> {
        let txn = self.db.begin().await?;
        inventory::lock_product(&txn, product_id).await?;
        let color = ProductColor::find_by_id(color_id)
            .filter(product_color::Column::ProductId.eq(product_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Color", color_id))?;

        let ordered = OrderItem::find()
            .filter(order_item::Column::ColorId.eq(color.id))
            .count(&txn)
            .await?;
        if ordered > 0 {
            return Err(ServiceError::Conflict(format!(
                "color {} is referenced by {} order item(s)",
                color.label, ordered
            )));
        }

        CartItem::delete_many()
            .filter(cart_item::Column::ColorId.eq(color.id))
            .exec(&txn)
            .await?;
        ProductColor::delete_by_id(color.id).exec(&txn).await?;
        inventory::recompute_aggregate(&txn, product_id).await?;
        let response = Self::load(&txn, product_id).await?;
        txn.commit().await?;
        Ok(response)
    }
}
