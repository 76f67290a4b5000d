// Adapters layer: concrete implementations of the domain ports (PMS API, cache, storage).

pub mod cache;
pub mod http;
pub mod memory;
pub mod storage;
