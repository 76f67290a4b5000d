pub mod aggregations;
pub mod audit_sequence;
pub mod audit_steps;
pub mod cache;

pub use crate::domain::model::Record;
pub use crate::domain::ports::{CacheStore, PmsApi, Storage};
pub use crate::utils::error::Result;
