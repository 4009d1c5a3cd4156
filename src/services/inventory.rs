use crate::{
    db::DbPool,
    entities::{
        product::{self, Entity as Product},
        product_color::{self, Entity as ProductColor},
        product_size::{self, Entity as ProductSize},
        stock_movement::{self, Entity as StockMovement},
    },
    errors::ServiceError,
};
use chrono::Utc;
use metrics::counter;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

pub const DEFAULT_ADJUST_NOTE: &str = "Manual stock adjustment";

/// Stock source below the product level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum VariantRef {
    Size(Uuid),
    Color(Uuid),
}

impl VariantRef {
    /// Size wins over color when a line names both.
    pub fn from_ids(size_id: Option<Uuid>, color_id: Option<Uuid>) -> Option<Self> {
        size_id
            .map(VariantRef::Size)
            .or(color_id.map(VariantRef::Color))
    }

    fn size_id(self) -> Option<Uuid> {
        match self {
            VariantRef::Size(id) => Some(id),
            VariantRef::Color(_) => None,
        }
    }

    fn color_id(self) -> Option<Uuid> {
        match self {
            VariantRef::Color(id) => Some(id),
            VariantRef::Size(_) => None,
        }
    }
}

/// Whether a negative delta may take the counter below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockGuard {
    /// The decrement only applies while `stock >= quantity`.
    NonNegative,
    /// Applied as-is; used once payment is already captured.
    Unchecked,
}

/// Aggregate rule: size sum when positive, else color sum.
pub fn aggregate_stock(size_stocks: &[i32], color_stocks: &[i32]) -> i32 {
    let sizes: i32 = size_stocks.iter().sum();
    if sizes > 0 {
        sizes
    } else {
        color_stocks.iter().sum()
    }
}

/// Loads the product row under an exclusive lock so concurrent writers to the
/// same product serialize on it.
pub(crate) async fn lock_product<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
) -> Result<product::Model, ServiceError> {
    Product::find_by_id(product_id)
        .lock_exclusive()
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Product", product_id))
}

/// Current counter of a product or one of its variants.
pub(crate) async fn current_stock<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    variant: Option<VariantRef>,
) -> Result<i32, ServiceError> {
    let stock = match variant {
        None => Product::find_by_id(product_id).one(conn).await?.map(|p| p.stock),
        Some(VariantRef::Size(id)) => ProductSize::find_by_id(id)
            .filter(product_size::Column::ProductId.eq(product_id))
            .one(conn)
            .await?
            .map(|s| s.stock),
        Some(VariantRef::Color(id)) => ProductColor::find_by_id(id)
            .filter(product_color::Column::ProductId.eq(product_id))
            .one(conn)
            .await?
            .map(|c| c.stock),
    };
    stock.ok_or_else(|| variant_not_found(product_id, variant))
}

fn variant_not_found(product_id: Uuid, variant: Option<VariantRef>) -> ServiceError {
    match variant {
        None => ServiceError::not_found("Product", product_id),
        Some(VariantRef::Size(id)) => ServiceError::not_found("Size", id),
        Some(VariantRef::Color(id)) => ServiceError::not_found("Color", id),
    }
}

/// Adds `delta` to one counter with a single atomic UPDATE.
async fn bump_counter<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    variant: Option<VariantRef>,
    delta: i32,
    guard: StockGuard,
) -> Result<(), ServiceError> {
    let guarded = guard == StockGuard::NonNegative && delta < 0;
    let result = match variant {
        None => {
            let mut update = Product::update_many()
                .col_expr(
                    product::Column::Stock,
                    Expr::col(product::Column::Stock).add(delta),
                )
                .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(product::Column::Id.eq(product_id));
            if guarded {
                update = update.filter(product::Column::Stock.gte(-delta));
            }
            update.exec(conn).await?
        }
        Some(VariantRef::Size(id)) => {
            let mut update = ProductSize::update_many()
                .col_expr(
                    product_size::Column::Stock,
                    Expr::col(product_size::Column::Stock).add(delta),
                )
                .filter(product_size::Column::Id.eq(id))
                .filter(product_size::Column::ProductId.eq(product_id));
            if guarded {
                update = update.filter(product_size::Column::Stock.gte(-delta));
            }
            update.exec(conn).await?
        }
        Some(VariantRef::Color(id)) => {
            let mut update = ProductColor::update_many()
                .col_expr(
                    product_color::Column::Stock,
                    Expr::col(product_color::Column::Stock).add(delta),
                )
                .filter(product_color::Column::Id.eq(id))
                .filter(product_color::Column::ProductId.eq(product_id));
            if guarded {
                update = update.filter(product_color::Column::Stock.gte(-delta));
            }
            update.exec(conn).await?
        }
    };

    if result.rows_affected == 0 {
        // Either the row is gone or the guard rejected the decrement.
        let available = current_stock(conn, product_id, variant).await?;
        return Err(ServiceError::InsufficientStock {
            available: i64::from(available),
            requested: i64::from(-delta),
        });
    }
    Ok(())
}

/// Overwrites the product's aggregate counter from its variants and returns it.
/// Products without variants keep their own counter.
pub(crate) async fn recompute_aggregate<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
) -> Result<i32, ServiceError> {
    let sizes: Vec<i32> = ProductSize::find()
        .filter(product_size::Column::ProductId.eq(product_id))
        .all(conn)
        .await?
        .into_iter()
        .map(|s| s.stock)
        .collect();
    let colors: Vec<i32> = ProductColor::find()
        .filter(product_color::Column::ProductId.eq(product_id))
        .all(conn)
        .await?
        .into_iter()
        .map(|c| c.stock)
        .collect();

    if sizes.is_empty() && colors.is_empty() {
        return current_stock(conn, product_id, None).await;
    }

    let total = aggregate_stock(&sizes, &colors);
    Product::update_many()
        .col_expr(product::Column::Stock, Expr::value(total))
        .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(product::Column::Id.eq(product_id))
        .exec(conn)
        .await?;
    Ok(total)
}

pub(crate) async fn record_movement<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    variant: Option<VariantRef>,
    delta: i32,
    note: String,
) -> Result<stock_movement::Model, ServiceError> {
    let movement = stock_movement::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        size_id: Set(variant.and_then(VariantRef::size_id)),
        color_id: Set(variant.and_then(VariantRef::color_id)),
        delta: Set(delta),
        note: Set(note),
        created_at: Set(Utc::now()),
    };
    Ok(movement.insert(conn).await?)
}

/// Applies one ledger entry inside the caller's transaction: counter change,
/// aggregate recompute for variants, then the movement row.
/// The caller is expected to hold the product lock.
pub(crate) async fn apply_movement<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    variant: Option<VariantRef>,
    delta: i32,
    note: String,
    guard: StockGuard,
) -> Result<stock_movement::Model, ServiceError> {
    bump_counter(conn, product_id, variant, delta, guard).await?;
    if variant.is_some() {
        recompute_aggregate(conn, product_id).await?;
    }
    record_movement(conn, product_id, variant, delta, note).await
}

/// Returned goods go back to the original variant and, independently, to the
/// product's aggregate counter. One movement per credit.
pub(crate) async fn restock<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    variant: Option<VariantRef>,
    quantity: i32,
    note: String,
) -> Result<stock_movement::Model, ServiceError> {
    if variant.is_some() {
        bump_counter(conn, product_id, variant, quantity, StockGuard::Unchecked).await?;
    }
    bump_counter(conn, product_id, None, quantity, StockGuard::Unchecked).await?;
    record_movement(conn, product_id, variant, quantity, note).await
}

/// Counter versus ledger for one stock source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SourceReconciliation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<VariantRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub counter: i64,
    pub movement_sum: i64,
    pub drift: i64,
}

impl SourceReconciliation {
    fn new(variant: Option<VariantRef>, label: Option<String>, counter: i32, movement_sum: i64) -> Self {
        let counter = i64::from(counter);
        Self {
            variant,
            label,
            counter,
            movement_sum,
            drift: counter - movement_sum,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct StockReconciliation {
    pub product_id: Uuid,
    pub product: SourceReconciliation,
    pub variants: Vec<SourceReconciliation>,
    pub consistent: bool,
}

/// Stock ledger over products and their size/color variants.
#[derive(Clone)]
pub struct InventoryLedger {
    db: Arc<DbPool>,
}

impl InventoryLedger {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Adjusts a product or variant counter by `delta` and appends the movement.
    #[instrument(skip(self, note), fields(product_id = %product_id, variant = ?variant, delta))]
    pub async fn adjust(
        &self,
        product_id: Uuid,
        variant: Option<VariantRef>,
        delta: i32,
        note: Option<String>,
    ) -> Result<stock_movement::Model, ServiceError> {
        if delta == 0 {
            return Err(ServiceError::ValidationError(
                "delta must be a non-zero integer".to_string(),
            ));
        }
        let note = note
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_ADJUST_NOTE.to_string());

        let txn = self.db.begin().await?;
        lock_product(&txn, product_id).await?;
        if variant.is_some() {
            // Surfaces a foreign or unknown variant as NotFound before any write.
            current_stock(&txn, product_id, variant).await?;
        }
        let movement =
            apply_movement(&txn, product_id, variant, delta, note, StockGuard::NonNegative)
                .await?;
        txn.commit().await?;

        counter!("storefront.stock.adjustments", 1);
        info!(movement_id = %movement.id, "stock adjusted");
        Ok(movement)
    }

    /// Owning product of a size variant.
    pub async fn product_of_size(&self, size_id: Uuid) -> Result<Uuid, ServiceError> {
        ProductSize::find_by_id(size_id)
            .one(self.db.as_ref())
            .await?
            .map(|s| s.product_id)
            .ok_or_else(|| ServiceError::not_found("Size", size_id))
    }

    /// Owning product of a color variant.
    pub async fn product_of_color(&self, color_id: Uuid) -> Result<Uuid, ServiceError> {
        ProductColor::find_by_id(color_id)
            .one(self.db.as_ref())
            .await?
            .map(|c| c.product_id)
            .ok_or_else(|| ServiceError::not_found("Color", color_id))
    }

    /// Movements newest first. With a variant, only that variant's movements.
    pub async fn history(
        &self,
        product_id: Uuid,
        variant: Option<VariantRef>,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        let db = self.db.as_ref();
        Product::find_by_id(product_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", product_id))?;

        let mut query =
            StockMovement::find().filter(stock_movement::Column::ProductId.eq(product_id));
        query = match variant {
            None => query,
            Some(VariantRef::Size(id)) => query.filter(stock_movement::Column::SizeId.eq(id)),
            Some(VariantRef::Color(id)) => query.filter(stock_movement::Column::ColorId.eq(id)),
        };
        Ok(query
            .order_by_desc(stock_movement::Column::CreatedAt)
            .all(db)
            .await?)
    }

    /// Compares every counter of a product with the sum of its movements.
    /// Read-only; drift is reported, never repaired.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn reconcile(&self, product_id: Uuid) -> Result<StockReconciliation, ServiceError> {
        let db = self.db.as_ref();
        let product = Product::find_by_id(product_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", product_id))?;
        let sizes = ProductSize::find()
            .filter(product_size::Column::ProductId.eq(product_id))
            .order_by_asc(product_size::Column::CreatedAt)
            .all(db)
            .await?;
        let colors = ProductColor::find()
            .filter(product_color::Column::ProductId.eq(product_id))
            .order_by_asc(product_color::Column::CreatedAt)
            .all(db)
            .await?;

        let sums: Vec<(Option<Uuid>, Option<Uuid>, Option<i64>)> = StockMovement::find()
            .select_only()
            .column(stock_movement::Column::SizeId)
            .column(stock_movement::Column::ColorId)
            .column_as(Expr::col(stock_movement::Column::Delta).sum(), "total")
            .filter(stock_movement::Column::ProductId.eq(product_id))
            .group_by(stock_movement::Column::SizeId)
            .group_by(stock_movement::Column::ColorId)
            .into_tuple()
            .all(db)
            .await?;

        let mut by_size: HashMap<Uuid, i64> = HashMap::new();
        let mut by_color: HashMap<Uuid, i64> = HashMap::new();
        let mut unscoped = 0i64;
        for (size_id, color_id, total) in sums {
            let total = total.unwrap_or(0);
            match (size_id, color_id) {
                (Some(id), _) => *by_size.entry(id).or_default() += total,
                (None, Some(id)) => *by_color.entry(id).or_default() += total,
                (None, None) => unscoped += total,
            }
        }

        // With variants the product counter is derived, so its ledger value
        // is the aggregate rule over the variant ledgers.
        let product_sum = if sizes.is_empty() && colors.is_empty() {
            unscoped + by_size.values().sum::<i64>() + by_color.values().sum::<i64>()
        } else {
            let size_sums: Vec<i64> = sizes
                .iter()
                .map(|s| by_size.get(&s.id).copied().unwrap_or(0))
                .collect();
            let color_sums: Vec<i64> = colors
                .iter()
                .map(|c| by_color.get(&c.id).copied().unwrap_or(0))
                .collect();
            let derived: i64 = size_sums.iter().sum();
            if derived > 0 {
                derived
            } else {
                color_sums.iter().sum()
            }
        };

        let variants: Vec<SourceReconciliation> = sizes
            .into_iter()
            .map(|s| {
                SourceReconciliation::new(
                    Some(VariantRef::Size(s.id)),
                    Some(s.label),
                    s.stock,
                    by_size.get(&s.id).copied().unwrap_or(0),
                )
            })
            .chain(colors.into_iter().map(|c| {
                SourceReconciliation::new(
                    Some(VariantRef::Color(c.id)),
                    Some(c.label),
                    c.stock,
                    by_color.get(&c.id).copied().unwrap_or(0),
                )
            }))
            .collect();

        let product = SourceReconciliation::new(None, None, product.stock, product_sum);
        let consistent = product.drift == 0 && variants.iter().all(|v| v.drift == 0);
        if !consistent {
            warn!(product_drift = product.drift, "stock counters drifted from ledger");
        }

        Ok(StockReconciliation {
            product_id,
            product,
            variants,
            consistent,
        })
    }
}
