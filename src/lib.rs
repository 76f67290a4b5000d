pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::{cache::MemoryCache, http::HttpPmsClient, memory::InMemoryPms, storage::LocalStorage};
pub use app::{AuditOptions, AuditReport, NightAuditRunner, ViewRefresher, ViewSettings};
pub use config::PmsConfig;
pub use core::cache::CacheAside;
pub use utils::error::{PmsError, Result};

#[cfg(feature = "lambda")]
pub use adapters::storage::S3Storage;
