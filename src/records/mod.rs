// Record store module
// Loads QA documents in any of the three workflow layouts and edits them in place.

pub mod convert;
pub mod document;
pub mod id;
pub mod model;
pub mod store;

pub use document::{Document, Group, Layout};
pub use id::QaId;
pub use model::{format_time_mm_ss, QaRecord};
pub use store::{GroupSummary, RecordStore, StoreOptions, StoreStatistics, VideoInfo};

#[cfg(test)]
mod tests;
