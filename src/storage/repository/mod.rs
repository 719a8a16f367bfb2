pub mod collection_repo;
pub mod field_repo;
pub mod spike_repo;

pub use collection_repo::CollectionRepository;
pub use field_repo::FieldRepository;
pub use spike_repo::SpikeRepository;
