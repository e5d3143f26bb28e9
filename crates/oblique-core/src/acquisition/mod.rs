pub mod index;
pub mod metadata;

pub use index::AcquisitionIndex;
pub use metadata::AcquisitionMetadata;
