pub mod addresses;
pub mod cart;
pub mod common;
pub mod orders;
pub mod payments;
pub mod products;
pub mod returns;
pub mod stock;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;
