//! JSON-lines sink.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::audit::{Attr, Level};
use crate::format::{Field, Schema};
use crate::observability::AuditSink;

/// Writes one JSON object per record.
///
/// Timestamp, level and message keys come from the schema, falling back to
/// `time`, `level` and `msg` when the schema suppresses them.
pub struct JsonLineSink<W> {
    writer: Mutex<W>,
    min_level: Level,
    schema: Schema,
}

impl<W: Write + Send> JsonLineSink<W> {
    pub fn new(writer: W, min_level: Level, schema: Schema) -> Self {
        Self {
            writer: Mutex::new(writer),
            min_level,
            schema,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn key(&self, field: Field, fallback: &'static str) -> String {
        match self.schema.field(field) {
            "" => fallback.to_string(),
            key => key.to_string(),
        }
    }

    fn encode(&self, level: Level, message: &str, attrs: &[Attr]) -> serde_json::Result<Vec<u8>> {
        let mut object = Map::with_capacity(attrs.len() + 3);
        object.insert(
            self.key(Field::Timestamp, "time"),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        object.insert(self.key(Field::Level, "level"), Value::from(level.as_str()));
        object.insert(self.key(Field::Message, "msg"), Value::from(message));
        for attr in attrs {
            object.insert(attr.key.clone(), attr.value.to_json());
        }

        let mut line = serde_json::to_vec(&Value::Object(object))?;
        line.push(b'\n');
        Ok(line)
    }
}

impl<W: Write + Send> AuditSink for JsonLineSink<W> {
    fn enabled(&self, level: Level) -> bool {
        level >= self.min_level
    }

    fn emit(&self, level: Level, message: &str, attrs: &[Attr]) {
        let line = match self.encode(level, message, attrs) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode audit record");
                return;
            }
        };

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writer.write_all(&line).and_then(|()| writer.flush()) {
            tracing::warn!(error = %e, "Failed to write audit record");
        }
    }
}
