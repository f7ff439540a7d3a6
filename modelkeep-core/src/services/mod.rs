// src/services/mod.rs

pub mod record;   // Record + Submission
pub mod store;    // the ONLY filesystem writer for records
pub mod registry; // in-memory best per name, seeded from the store

// Public API
pub use record::{Record, Submission};
pub use registry::Registry;
pub use store::{DirStore, RecordStore, StoreError};
