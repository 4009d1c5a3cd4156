// Stock and catalog
pub mod catalog;
pub mod inventory;

// Ordering
pub mod checkout;
pub mod order_numbers;
pub mod orders;
pub mod payment_provider;
pub mod returns;

// Account
pub mod addresses;
pub mod cart;

// Service container for dependency injection
pub mod factory;

use validator::ValidationError;

/// Rejects empty and whitespace-only strings.
pub(crate) fn non_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("required");
        err.message = Some("must not be blank".into());
        Err(err)
    } else {
        Ok(())
    }
}
