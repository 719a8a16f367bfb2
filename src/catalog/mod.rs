pub mod model;
pub mod service;

pub use model::{CollectionType, FieldAttrs, FieldConfig, ValueType};
pub use service::CatalogService;
