//! Record sink abstraction.

use crate::audit::{Attr, Level};

/// Destination of emitted audit records.
///
/// Implementations own serialization and delivery. Failures must be handled
/// inside the sink; they never reach the HTTP response.
pub trait AuditSink: Send + Sync {
    /// Whether a record at `level` would be written at all. Checked before
    /// any rendering work is done.
    fn enabled(&self, level: Level) -> bool;

    fn emit(&self, level: Level, message: &str, attrs: &[Attr]);
}
