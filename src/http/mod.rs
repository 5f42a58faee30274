//! HTTP host binding.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum serve, request ids)
//!     → middleware/audit.rs (record, handle, body tap)
//!         → request.rs (snapshot at entry)
//!         → panic.rs (recovery boundary around the inner future)
//!         → application handler
//!     → response.rs (AuditedBody, emission at end of stream)
//!     → client
//! ```

pub mod curl;
pub mod middleware;
pub mod panic;
pub mod request;
pub mod response;
pub mod server;

pub use curl::{curl, curl_request};
pub use middleware::{RequestAudit, RequestAuditLayer};
pub use panic::{install_panic_hook, AbortHandler, Fault, Outcome, PanicGuard};
pub use request::RequestSnapshot;
pub use response::AuditedBody;
pub use server::{shutdown_signal, HttpServer};
