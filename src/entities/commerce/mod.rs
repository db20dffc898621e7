/// Catalog and cart entities
pub mod cart_item;
pub mod perfume;

// Re-export entities
pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use perfume::{
    Concentration, FragranceFamily, Notes, PerfumeCategory, Entity as Perfume,
    Model as PerfumeModel,
};
