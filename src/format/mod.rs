//! Record format subsystem.
//!
//! # Data Flow
//! ```text
//! captured facts (semantic fields)
//!     → schema.rs (semantic field → wire name, empty = suppressed)
//!     → render.rs (ordered attribute list, optional nesting by delimiter)
//!     → sink
//! ```
//!
//! # Design Decisions
//! - Schemas are immutable values shared by every request
//! - The concise variant is derived from a full schema, never hand-written
//! - Nesting happens once, after all attributes are collected

pub mod render;
pub mod schema;

pub use render::{group_attrs, RecordBuilder};
pub use schema::{Field, Schema, SchemaKind};
