use crate::{
    config::AppConfig,
    db::is_unique_violation_on,
    entities::order::{self, Entity as Order},
    errors::ServiceError,
};
use metrics::counter;
use sea_orm::{sea_query::Expr, ConnectionTrait, DbErr, EntityTrait, QuerySelect};
use std::future::Future;
use tracing::{error, warn};

pub const ORDER_NUMBER_FLOOR: i32 = 4758;
pub const MAX_ALLOCATION_ATTEMPTS: u32 = 5;

/// Next number after the current maximum, never below `floor`.
pub fn next_after(current_max: Option<i32>, floor: i32) -> i32 {
    match current_max {
        Some(max) if max >= floor => max + 1,
        _ => floor,
    }
}

/// Maps an order insert failure: a uniqueness violation on the order number
/// becomes a retryable collision, anything else stays a database error.
pub fn classify_insert_error(err: DbErr, order_number: i32) -> ServiceError {
    if is_unique_violation_on(&err, "order_number") {
        ServiceError::OrderNumberTaken(order_number)
    } else {
        ServiceError::DatabaseError(err)
    }
}

/// Hands out human-facing order numbers with read-max-then-insert and a
/// bounded retry when two writers pick the same number.
#[derive(Debug, Clone, Copy)]
pub struct OrderNumberAllocator {
    floor: i32,
    max_attempts: u32,
}

impl Default for OrderNumberAllocator {
    fn default() -> Self {
        Self::new(ORDER_NUMBER_FLOOR, MAX_ALLOCATION_ATTEMPTS)
    }
}

impl OrderNumberAllocator {
    pub fn new(floor: i32, max_attempts: u32) -> Self {
        Self {
            floor,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(cfg.order_number_floor, cfg.order_number_max_attempts)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Reads the highest assigned number inside the caller's transaction.
    pub async fn next<C: ConnectionTrait>(&self, conn: &C) -> Result<i32, ServiceError> {
        let current_max: Option<i32> = Order::find()
            .select_only()
            .column_as(Expr::col(order::Column::OrderNumber).max(), "max_number")
            .into_tuple::<Option<i32>>()
            .one(conn)
            .await?
            .flatten();
        Ok(next_after(current_max, self.floor))
    }

    /// Runs `attempt` until it succeeds or fails with something other than an
    /// order number collision. Each call must open its own transaction.
    pub async fn retry_on_collision<T, F, Fut>(&self, mut attempt: F) -> Result<T, ServiceError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        for n in 1..=self.max_attempts {
            match attempt(n).await {
                Err(ServiceError::OrderNumberTaken(number)) => {
                    counter!("storefront.orders.number_collisions", 1);
                    warn!(attempt = n, order_number = number, "order number collision");
                }
                other => return other,
            }
        }
        counter!("storefront.orders.number_exhausted", 1);
        error!(
            attempts = self.max_attempts,
            "order number allocation exhausted"
        );
        Err(ServiceError::OrderNumberExhausted(self.max_attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;
    use std::cell::Cell;

    #[rstest]
    #[case(None, 4758)]
    #[case(Some(12), 4758)]
    #[case(Some(4757), 4758)]
    #[case(Some(4758), 4759)]
    #[case(Some(9000), 9001)]
    fn next_number_respects_floor(#[case] max: Option<i32>, #[case] expected: i32) {
        assert_eq!(next_after(max, ORDER_NUMBER_FLOOR), expected);
    }

    #[tokio::test]
    async fn collisions_are_retried_until_success() {
        let allocator = OrderNumberAllocator::default();
        let calls = Cell::new(0u32);
        let result = allocator
            .retry_on_collision(|attempt| {
                calls.set(attempt);
                async move {
                    if attempt < 3 {
                        Err(ServiceError::OrderNumberTaken(4758 + attempt as i32))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn exhausting_the_budget_is_fatal() {
        let allocator = OrderNumberAllocator::default();
        let calls = Cell::new(0u32);
        let result: Result<(), _> = allocator
            .retry_on_collision(|_| {
                calls.set(calls.get() + 1);
                async { Err(ServiceError::OrderNumberTaken(4758)) }
            })
            .await;
        assert_matches!(result, Err(ServiceError::OrderNumberExhausted(5)));
        assert_eq!(calls.get(), MAX_ALLOCATION_ATTEMPTS);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let allocator = OrderNumberAllocator::default();
        let calls = Cell::new(0u32);
        let result: Result<(), _> = allocator
            .retry_on_collision(|_| {
                calls.set(calls.get() + 1);
                async {
                    Err(ServiceError::InsufficientStock {
                        available: 1,
                        requested: 2,
                    })
                }
            })
            .await;
        assert_matches!(result, Err(ServiceError::InsufficientStock { .. }));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn non_unique_errors_stay_database_errors() {
        let err = classify_insert_error(DbErr::Custom("connection reset".into()), 4758);
        assert_matches!(err, ServiceError::DatabaseError(_));
    }
}
