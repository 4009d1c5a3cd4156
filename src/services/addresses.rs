use crate::{
    db::DbPool,
    entities::address::{self, Entity as Address},
    errors::ServiceError,
    services::non_blank,
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

pub const DEFAULT_ADDRESS_TITLE: &str = "Home";

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct AddressInput {
    #[serde(default)]
    pub title: Option<String>,
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
    #[serde(default)]
    pub is_default: bool,
}

impl AddressInput {
    fn title(&self) -> String {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_ADDRESS_TITLE)
            .to_string()
    }
}

fn optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Clears the default flag on every address of `user_id` except `keep`.
async fn clear_other_defaults<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    keep: Uuid,
) -> Result<(), ServiceError> {
    Address::update_many()
        .col_expr(address::Column::IsDefault, Expr::value(false))
        .filter(address::Column::UserId.eq(user_id))
        .filter(address::Column::Id.ne(keep))
        .filter(address::Column::IsDefault.eq(true))
        .exec(conn)
        .await?;
    Ok(())
}

/// Saved addresses of a user. Exactly one is the default once any exist.
#[derive(Clone)]
pub struct AddressService {
    db: Arc<DbPool>,
}

impl AddressService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    async fn owned<C: ConnectionTrait>(
        conn: &C,
        user_id: Uuid,
        address_id: Uuid,
    ) -> Result<address::Model, ServiceError> {
        Address::find_by_id(address_id)
            .filter(address::Column::UserId.eq(user_id))
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Address", address_id))
    }

    /// Default first, then newest.
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<address::Model>, ServiceError> {
        Ok(Address::find()
            .filter(address::Column::UserId.eq(user_id))
            .order_by_desc(address::Column::IsDefault)
            .order_by_desc(address::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?)
    }

    /// The first address of a user becomes the default whatever was requested.
    #[instrument(skip(self, input), fields(user_id = %user_id))]
    pub async fn create(
        &self,
        user_id: Uuid,
        input: AddressInput,
    ) -> Result<address::Model, ServiceError> {
        input.validate()?;

        let txn = self.db.begin().await?;
        let existing = Address::find()
            .filter(address::Column::UserId.eq(user_id))
            .count(&txn)
            .await?;
        let is_default = existing == 0 || input.is_default;

        let now = Utc::now();
        let saved = address::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            title: Set(input.title()),
            full_name: Set(input.full_name.trim().to_string()),
            phone: Set(input.phone.trim().to_string()),
            city: Set(input.city.trim().to_string()),
            district: Set(input.district.trim().to_string()),
            neighborhood: Set(optional(&input.neighborhood)),
            address_line: Set(input.address_line.trim().to_string()),
            postal_code: Set(optional(&input.postal_code)),
            is_default: Set(is_default),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        if is_default {
            clear_other_defaults(&txn, user_id, saved.id).await?;
        }
        txn.commit().await?;

        info!(address_id = %saved.id, is_default, "address created");
        Ok(saved)
    }

    /// Replaces every field. Un-setting the only default is ignored.
    #[instrument(skip(self, input), fields(user_id = %user_id, address_id = %address_id))]
    pub async fn update(
        &self,
        user_id: Uuid,
        address_id: Uuid,
        input: AddressInput,
    ) -> Result<address::Model, ServiceError> {
        input.validate()?;

        let txn = self.db.begin().await?;
        let current = Self::owned(&txn, user_id, address_id).await?;
        let is_default = current.is_default || input.is_default;

        let mut active: address::ActiveModel = current.into();
        active.title = Set(input.title());
        active.full_name = Set(input.full_name.trim().to_string());
        active.phone = Set(input.phone.trim().to_string());
        active.city = Set(input.city.trim().to_string());
        active.district = Set(input.district.trim().to_string());
        active.neighborhood = Set(optional(&input.neighborhood));
        active.address_line = Set(input.address_line.trim().to_string());
        active.postal_code = Set(optional(&input.postal_code));
        active.is_default = Set(is_default);
        active.updated_at = Set(Utc::now());
        let saved = active.update(&txn).await?;

        if is_default {
            clear_other_defaults(&txn, user_id, saved.id).await?;
        }
        txn.commit().await?;
        Ok(saved)
    }

    #[instrument(skip(self), fields(user_id = %user_id, address_id = %address_id))]
    pub async fn set_default(
        &self,
        user_id: Uuid,
        address_id: Uuid,
    ) -> Result<address::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let current = Self::owned(&txn, user_id, address_id).await?;

        let saved = if current.is_default {
            current
        } else {
            let mut active: address::ActiveModel = current.into();
            active.is_default = Set(true);
            active.updated_at = Set(Utc::now());
            active.update(&txn).await?
        };
        clear_other_defaults(&txn, user_id, saved.id).await?;
        txn.commit().await?;
        Ok(saved)
    }

    /// Deleting the default promotes the newest remaining address.
    #[instrument(skip(self), fields(user_id = %user_id, address_id = %address_id))]
    pub async fn delete(&self, user_id: Uuid, address_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        let current = Self::owned(&txn, user_id, address_id).await?;
        let was_default = current.is_default;
        Address::delete_by_id(current.id).exec(&txn).await?;

        if was_default {
            let successor = Address::find()
                .filter(address::Column::UserId.eq(user_id))
                .order_by_desc(address::Column::CreatedAt)
                .one(&txn)
                .await?;
            if let Some(next) = successor {
                let mut active: address::ActiveModel = next.into();
                active.is_default = Set(true);
                active.updated_at = Set(Utc::now());
                active.update(&txn).await?;
            }
        }
        txn.commit().await?;
        Ok(())
    }
}
