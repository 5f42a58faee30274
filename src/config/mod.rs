//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → AuditConfig handed to RequestAuditLayer at construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no process-wide default
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Callbacks (body predicates, skip, extra attributes) are not
//!   configuration; they are attached on the layer

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{AppConfig, AuditConfig, ListenerConfig, LogFormat, ObservabilityConfig};
pub use validation::{validate_config, ValidationError};
