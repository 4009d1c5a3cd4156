use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::DbPool,
    errors::ServiceError,
    services::{
        addresses::AddressService,
        cart::CartService,
        catalog::CatalogService,
        checkout::CheckoutService,
        inventory::InventoryLedger,
        order_numbers::OrderNumberAllocator,
        orders::OrderService,
        payment_provider::{PaymentGateway, PaytrGateway},
        returns::ReturnsService,
    },
};

/// Factory for creating service instances with shared dependencies
pub struct ServiceFactory {
    db_pool: Arc<DbPool>,
    allocator: OrderNumberAllocator,
    return_window_days: i64,
    gateway: Arc<dyn PaymentGateway>,
}

impl ServiceFactory {
    /// Creates a factory backed by the configured payment provider
    pub fn new(db_pool: Arc<DbPool>, config: &AppConfig) -> Result<Self, ServiceError> {
        let gateway = Arc::new(PaytrGateway::new(config.payment.clone())?);
        Ok(Self::with_gateway(db_pool, config, gateway))
    }

    /// Creates a factory with an explicit payment gateway
    pub fn with_gateway(
        db_pool: Arc<DbPool>,
        config: &AppConfig,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            db_pool,
            allocator: OrderNumberAllocator::from_config(config),
            return_window_days: config.return_window_days,
            gateway,
        }
    }

    pub fn inventory(&self) -> InventoryLedger {
        InventoryLedger::new(self.db_pool.clone())
    }

    pub fn catalog(&self) -> CatalogService {
        CatalogService::new(self.db_pool.clone())
    }

    pub fn orders(&self) -> OrderService {
        OrderService::new(self.db_pool.clone(), self.allocator)
    }

    pub fn returns(&self) -> ReturnsService {
        ReturnsService::new(self.db_pool.clone(), self.return_window_days)
    }

    pub fn addresses(&self) -> AddressService {
        AddressService::new(self.db_pool.clone())
    }

    pub fn cart(&self) -> CartService {
        CartService::new(self.db_pool.clone())
    }

    /// Gets a reference to the database pool
    pub fn db_pool(&self) -> &Arc<DbPool> {
        &self.db_pool
    }
}

/// Service container holding all service instances
#[derive(Clone)]
pub struct ServiceContainer {
    pub inventory: Arc<InventoryLedger>,
    pub catalog: Arc<CatalogService>,
    pub orders: Arc<OrderService>,
    pub checkout: Arc<CheckoutService>,
    pub returns: Arc<ReturnsService>,
    pub addresses: Arc<AddressService>,
    pub cart: Arc<CartService>,
}

impl ServiceContainer {
    /// Creates a new service container with all services initialized
    pub fn new(factory: &ServiceFactory) -> Self {
        let orders = Arc::new(factory.orders());
        let checkout = Arc::new(CheckoutService::new(
            factory.db_pool().clone(),
            orders.clone(),
            factory.gateway.clone(),
        ));

        Self {
            inventory: Arc::new(factory.inventory()),
            catalog: Arc::new(factory.catalog()),
            orders,
            checkout,
            returns: Arc::new(factory.returns()),
            addresses: Arc::new(factory.addresses()),
            cart: Arc::new(factory.cart()),
        }
    }
}
