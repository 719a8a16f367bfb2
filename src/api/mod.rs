pub mod dto;

pub use dto::{
    CollectionResponse, CollectionWithFields, FieldCreate, FieldResponse, FieldUpdate,
    GeneratedPayload, SpikeFieldOverride, SpikeFieldResponse, SpikeScheduleCreate,
    SpikeScheduleResponse, SpikeScheduleUpdate,
};
