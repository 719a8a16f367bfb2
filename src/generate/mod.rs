pub mod context;
pub mod engine;
pub mod service;

pub use context::{DbOverrideProvider, OverrideProvider};
pub use engine::{GenerateError, GeneratedValue, ValueEngine};
pub use service::GenerateService;
