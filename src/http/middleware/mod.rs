//! Tower middleware.

pub mod audit;

pub use audit::{RequestAudit, RequestAuditLayer};
