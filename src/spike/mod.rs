pub mod model;
pub mod service;

pub use model::{ScheduleStatus, SpikeOverrideAttrs};
pub use service::SpikeService;
