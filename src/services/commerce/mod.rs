/// Storefront services: catalog, cart and checkout
pub mod cart_service;
pub mod catalog_service;
pub mod checkout_service;

// Re-export services for convenience
pub use cart_service::{CartLineView, CartService, CartSummary};
pub use catalog_service::{CatalogService, CreatePerfumeInput, ProductQuery, UpdatePerfumeInput};
pub use checkout_service::{CheckoutService, OrderLineInput, PlaceOrderInput, PlacedOrder};
