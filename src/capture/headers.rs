//! Allow-list header selection.
//!
//! The allow-list is the only redaction mechanism here: a header that is not
//! listed is never rendered, and listing a secret header renders it.

use axum::http::HeaderMap;

use crate::audit::{Attr, AttrValue};

/// Select the allow-listed headers, in allow-list order.
///
/// A header with one value renders as a string, a header with several values
/// as a list. Absent headers are omitted. Keys keep the spelling used in the
/// allow-list.
pub fn header_attrs(headers: &HeaderMap, allow: &[String]) -> Vec<Attr> {
    let mut attrs = Vec::with_capacity(allow.len());
    for name in allow {
        let mut values: Vec<String> = headers
            .get_all(name.as_str())
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect();

        let value = match values.len() {
            0 => continue,
            1 => AttrValue::Str(values.remove(0)),
            _ => AttrValue::List(values),
        };
        attrs.push(Attr {
            key: name.clone(),
            value,
        });
    }
    attrs
}

/// First value of the `Content-Type` header, or an empty string.
pub fn content_type(headers: &HeaderMap) -> &str {
    headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}
