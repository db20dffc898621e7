pub mod commerce;
pub mod order;
pub mod order_item;

pub use order::{Address, OrderStatus, PaymentMethod, PaymentStatus};
pub use order_item::PerfumeSnapshot;
