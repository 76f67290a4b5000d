// Application layer: night audit runner and materialized-views refresher.

pub mod demo;
pub mod night_audit;
pub mod views;

pub use night_audit::{AuditOptions, AuditReport, NightAuditRunner};
pub use views::{ViewOutput, ViewRefresher, ViewSettings};
