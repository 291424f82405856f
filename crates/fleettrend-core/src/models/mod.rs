//! Data models for fleettrend

pub mod allocation;
pub mod month;

pub use allocation::{
    read_records_file, AllocationRecord, MonthlySnapshot, SnapshotEntry, SnapshotMetadata,
};
pub use month::MonthKey;
