//! Property-based tests for the storefront's pure rules.
//!
//! These use proptest to check invariants over wide input ranges: stock
//! aggregation, order numbering, payment references and the order state
//! machine.

use proptest::prelude::*;
use rust_decimal::Decimal;
use storefront_api::{
    entities::order::{check_transition, OrderStatus, TransitionCheck},
    services::{
        inventory::aggregate_stock,
        order_numbers::{next_after, ORDER_NUMBER_FLOOR},
        payment_provider::{parse_reference, payment_reference, to_minor_units},
    },
};

fn stocks() -> impl Strategy<Value = Vec<i32>> {
    prop::collection::vec(0i32..10_000, 0..8)
}

fn status() -> impl Strategy<Value = OrderStatus> {
    prop_oneof![
        Just(OrderStatus::Pending),
        Just(OrderStatus::AwaitingPayment),
        Just(OrderStatus::Paid),
        Just(OrderStatus::Shipped),
        Just(OrderStatus::Delivered),
        Just(OrderStatus::Canceled),
    ]
}

fn rank(status: OrderStatus) -> u8 {
    match status {
        OrderStatus::Pending => 0,
        OrderStatus::AwaitingPayment => 1,
        OrderStatus::Paid => 2,
        OrderStatus::Shipped => 3,
        OrderStatus::Delivered => 4,
        OrderStatus::Canceled => 5,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn aggregate_prefers_positive_size_totals(sizes in stocks(), colors in stocks()) {
        let size_total: i32 = sizes.iter().sum();
        let color_total: i32 = colors.iter().sum();
        let aggregate = aggregate_stock(&sizes, &colors);
        if size_total > 0 {
            prop_assert_eq!(aggregate, size_total);
        } else {
            prop_assert_eq!(aggregate, color_total);
        }
        prop_assert!(aggregate >= 0);
    }

    #[test]
    fn order_numbers_never_drop_below_the_floor(max in proptest::option::of(0i32..1_000_000)) {
        let next = next_after(max, ORDER_NUMBER_FLOOR);
        prop_assert!(next >= ORDER_NUMBER_FLOOR);
        if let Some(max) = max {
            prop_assert!(next > max || max < ORDER_NUMBER_FLOOR);
        }
    }

    #[test]
    fn payment_references_carry_the_order_number(
        number in ORDER_NUMBER_FLOOR..i32::MAX,
        millis in 0i64..i64::MAX,
    ) {
        let reference = payment_reference(number, millis);
        prop_assert!(reference.chars().all(|c| c.is_ascii_alphanumeric()));
        prop_assert_eq!(parse_reference(&reference), Some(number));
    }

    #[test]
    fn foreign_references_are_rejected(reference in "[a-z0-9]{0,12}") {
        prop_assert_eq!(parse_reference(&reference), None);
    }

    #[test]
    fn minor_units_are_exact_for_two_decimals(units in 0i64..10_000_000_000) {
        let amount = Decimal::new(units, 2);
        prop_assert_eq!(to_minor_units(amount).ok(), Some(units));
    }

    #[test]
    fn transitions_only_move_forward(from in status(), to in status()) {
        match check_transition(from, to) {
            TransitionCheck::Unchanged => prop_assert_eq!(from, to),
            TransitionCheck::Allowed => {
                prop_assert!(rank(to) > rank(from));
                prop_assert!(from != OrderStatus::Delivered && from != OrderStatus::Canceled);
            }
            TransitionCheck::Rejected => prop_assert_ne!(from, to),
        }
    }
}
