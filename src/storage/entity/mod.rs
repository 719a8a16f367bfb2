pub mod collection;
pub mod field;
pub mod spike_schedule;
pub mod spike_schedule_field;

pub use collection::Entity as Collection;
pub use field::Entity as Field;
pub use spike_schedule::Entity as SpikeSchedule;
pub use spike_schedule_field::Entity as SpikeScheduleField;
