use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

/// Order lifecycle. Forward only: an order never re-enters `Pending`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum OrderStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "AWAITING_PAYMENT")]
    AwaitingPayment,
    #[sea_orm(string_value = "PAID")]
    Paid,
    #[sea_orm(string_value = "SHIPPED")]
    Shipped,
    #[sea_orm(string_value = "DELIVERED")]
    Delivered,
    #[sea_orm(string_value = "CANCELED")]
    Canceled,
}

impl OrderStatus {
    /// Whether `self -> target` is an edge of the order state machine.
    /// Staying in the same state is not an edge; callers treat it as a no-op.
    pub fn can_transition_to(self, target: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, target),
            (Pending, AwaitingPayment)
                | (Pending, Paid)
                | (Pending, Canceled)
                | (AwaitingPayment, Paid)
                | (AwaitingPayment, Canceled)
                | (Paid, Shipped)
                | (Paid, Canceled)
                | (Shipped, Delivered)
        )
    }

    /// Payment has not been captured yet.
    pub fn is_unpaid(self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::AwaitingPayment)
    }
}

/// Outcome of checking a requested status change against the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionCheck {
    /// Already in the target state.
    Unchanged,
    Allowed,
    Rejected,
}

pub fn check_transition(current: OrderStatus, target: OrderStatus) -> TransitionCheck {
    if current == target {
        TransitionCheck::Unchanged
    } else if current.can_transition_to(target) {
        TransitionCheck::Allowed
    } else {
        TransitionCheck::Rejected
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Human-facing sequential number; unique when present.
    #[sea_orm(unique)]
    pub order_number: Option<i32>,

    pub user_id: Uuid,
    pub status: OrderStatus,
    pub total: Decimal,

    // Shipping snapshot, copied at order time.
    pub shipping_address_id: Option<Uuid>,
    pub shipping_name: String,
    pub shipping_phone: String,
    pub shipping_city: String,
    pub shipping_district: String,
    pub shipping_neighborhood: Option<String>,
    pub shipping_address_line: String,
    pub shipping_postal_code: Option<String>,
    pub customer_note: Option<String>,
    pub contact_email: Option<String>,

    /// Provider-facing reference of the redirect checkout, when used.
    pub payment_reference: Option<String>,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Time of the last status transition.
    pub status_changed_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
    #[sea_orm(has_many = "super::return_request::Entity")]
    ReturnRequests,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

impl Related<super::return_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ReturnRequests.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
