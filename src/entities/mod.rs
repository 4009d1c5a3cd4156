pub mod address;
pub mod cart_item;
pub mod order;
pub mod order_item;
pub mod product;
pub mod product_color;
pub mod product_size;
pub mod return_item;
pub mod return_request;
pub mod stock_movement;
