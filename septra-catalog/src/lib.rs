pub mod catalog;
pub mod sku;

pub use sku::{NewSku, Sku, SkuMetadata, SkuUpdate};
