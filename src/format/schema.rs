//! Semantic field → wire field name mapping.
//!
//! The same captured facts are emitted as Elastic Common Schema, OpenTelemetry
//! or Google Cloud Logging shaped records by swapping the schema.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Semantic fields an audit record can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Timestamp,
    Level,
    Message,
    ErrorMessage,
    ErrorType,
    ErrorStackTrace,
    SourceFile,
    SourceLine,
    SourceFunction,
    RequestUrl,
    RequestMethod,
    RequestPath,
    RequestRemoteIp,
    RequestHost,
    RequestScheme,
    RequestProto,
    RequestHeaders,
    RequestBody,
    RequestBytes,
    RequestBytesUnread,
    RequestUserAgent,
    RequestReferer,
    ResponseHeaders,
    ResponseBody,
    ResponseStatus,
    ResponseDuration,
    ResponseBytes,
}

/// Mapping of semantic fields to format-specific names.
///
/// An empty name suppresses the field. When `group_delimiter` is set, names
/// containing it are nested at render time (`httpRequest:status` becomes
/// `{"httpRequest": {"status": ..}}`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub timestamp: Cow<'static, str>,
    pub level: Cow<'static, str>,
    pub message: Cow<'static, str>,
    pub error_message: Cow<'static, str>,
    pub error_type: Cow<'static, str>,
    pub error_stack_trace: Cow<'static, str>,

    pub source_file: Cow<'static, str>,
    pub source_line: Cow<'static, str>,
    pub source_function: Cow<'static, str>,

    // Query strings are deliberately not a field of their own.
    pub request_url: Cow<'static, str>,
    pub request_method: Cow<'static, str>,
    pub request_path: Cow<'static, str>,
    pub request_remote_ip: Cow<'static, str>,
    pub request_host: Cow<'static, str>,
    pub request_scheme: Cow<'static, str>,
    pub request_proto: Cow<'static, str>,
    pub request_headers: Cow<'static, str>,
    pub request_body: Cow<'static, str>,
    pub request_bytes: Cow<'static, str>,
    pub request_bytes_unread: Cow<'static, str>,
    pub request_user_agent: Cow<'static, str>,
    pub request_referer: Cow<'static, str>,

    pub response_headers: Cow<'static, str>,
    pub response_body: Cow<'static, str>,
    pub response_status: Cow<'static, str>,
    pub response_duration: Cow<'static, str>,
    pub response_bytes: Cow<'static, str>,

    pub group_delimiter: Option<Cow<'static, str>>,
}

const fn s(v: &'static str) -> Cow<'static, str> {
    Cow::Borrowed(v)
}

const EMPTY: Cow<'static, str> = Cow::Borrowed("");

impl Schema {
    /// Elastic Common Schema 9.0.
    pub const ECS: Schema = Schema {
        timestamp: s("@timestamp"),
        level: s("log.level"),
        message: s("message"),
        error_message: s("error.message"),
        error_type: s("error.type"),
        error_stack_trace: s("error.stack_trace"),
        source_file: s("log.origin.file.name"),
        source_line: s("log.origin.file.line"),
        source_function: s("log.origin.function"),
        request_url: s("url.full"),
        request_method: s("http.request.method"),
        request_path: s("url.path"),
        request_remote_ip: s("client.ip"),
        request_host: s("url.domain"),
        request_scheme: s("url.scheme"),
        request_proto: s("http.version"),
        request_headers: s("http.request.headers"),
        request_body: s("http.request.body.content"),
        request_bytes: s("http.request.body.bytes"),
        request_bytes_unread: s("http.request.body.unread.bytes"),
        request_user_agent: s("user_agent.original"),
        request_referer: s("http.request.referrer"),
        response_headers: s("http.response.headers"),
        response_body: s("http.response.body.content"),
        response_status: s("http.response.status_code"),
        response_duration: s("event.duration"),
        response_bytes: s("http.response.body.bytes"),
        group_delimiter: None,
    };

    /// OpenTelemetry semantic conventions 1.34.
    pub const OTEL: Schema = Schema {
        timestamp: s("timestamp"),
        level: s("severity_text"),
        message: s("body"),
        error_message: s("error.message"),
        error_type: s("error.type"),
        error_stack_trace: s("exception.stacktrace"),
        source_file: s("code.filepath"),
        source_line: s("code.lineno"),
        source_function: s("code.function"),
        request_url: s("url.full"),
        request_method: s("http.request.method"),
        request_path: s("url.path"),
        request_remote_ip: s("client.address"),
        request_host: s("server.address"),
        request_scheme: s("url.scheme"),
        request_proto: s("network.protocol.version"),
        request_headers: s("http.request.header"),
        request_body: s("http.request.body.content"),
        request_bytes: s("http.request.body.size"),
        request_bytes_unread: s("http.request.body.unread.size"),
        request_user_agent: s("user_agent.original"),
        request_referer: s("http.request.header.referer"),
        response_headers: s("http.response.header"),
        response_body: s("http.response.body.content"),
        response_status: s("http.response.status_code"),
        response_duration: s("http.server.request.duration"),
        response_bytes: s("http.response.body.size"),
        group_delimiter: None,
    };

    /// Google Cloud structured logging (`httpRequest` nested object).
    pub const GCP: Schema = Schema {
        timestamp: s("timestamp"),
        level: s("severity"),
        message: s("message"),
        error_message: s("error"),
        error_type: s("error_type"),
        error_stack_trace: s("stack_trace"),
        source_file: s("logging.googleapis.com/sourceLocation:file"),
        source_line: s("logging.googleapis.com/sourceLocation:line"),
        source_function: s("logging.googleapis.com/sourceLocation:function"),
        request_url: s("httpRequest:requestUrl"),
        request_method: s("httpRequest:requestMethod"),
        request_path: s("httpRequest:requestPath"),
        request_remote_ip: s("httpRequest:remoteIp"),
        request_host: s("httpRequest:host"),
        request_scheme: s("httpRequest:scheme"),
        request_proto: s("httpRequest:protocol"),
        request_headers: s("httpRequest:requestHeaders"),
        request_body: s("httpRequest:requestBody"),
        request_bytes: s("httpRequest:requestSize"),
        request_bytes_unread: s("httpRequest:requestUnreadSize"),
        request_user_agent: s("httpRequest:userAgent"),
        request_referer: s("httpRequest:referer"),
        response_headers: s("httpRequest:responseHeaders"),
        response_body: s("httpRequest:responseBody"),
        response_status: s("httpRequest:status"),
        response_duration: s("httpRequest:latency"),
        response_bytes: s("httpRequest:responseSize"),
        group_delimiter: Some(s(":")),
    };

    /// Wire name of a semantic field. Empty means "do not emit".
    pub fn field(&self, field: Field) -> &str {
        match field {
            Field::Timestamp => &self.timestamp,
            Field::Level => &self.level,
            Field::Message => &self.message,
            Field::ErrorMessage => &self.error_message,
            Field::ErrorType => &self.error_type,
            Field::ErrorStackTrace => &self.error_stack_trace,
            Field::SourceFile => &self.source_file,
            Field::SourceLine => &self.source_line,
            Field::SourceFunction => &self.source_function,
            Field::RequestUrl => &self.request_url,
            Field::RequestMethod => &self.request_method,
            Field::RequestPath => &self.request_path,
            Field::RequestRemoteIp => &self.request_remote_ip,
            Field::RequestHost => &self.request_host,
            Field::RequestScheme => &self.request_scheme,
            Field::RequestProto => &self.request_proto,
            Field::RequestHeaders => &self.request_headers,
            Field::RequestBody => &self.request_body,
            Field::RequestBytes => &self.request_bytes,
            Field::RequestBytesUnread => &self.request_bytes_unread,
            Field::RequestUserAgent => &self.request_user_agent,
            Field::RequestReferer => &self.request_referer,
            Field::ResponseHeaders => &self.response_headers,
            Field::ResponseBody => &self.response_body,
            Field::ResponseStatus => &self.response_status,
            Field::ResponseDuration => &self.response_duration,
            Field::ResponseBytes => &self.response_bytes,
        }
    }

    /// Reduced variant for local development: errors, stack traces,
    /// headers and bodies only.
    pub fn concise(&self) -> Schema {
        Schema {
            error_message: self.error_message.clone(),
            error_stack_trace: self.error_stack_trace.clone(),
            request_headers: self.request_headers.clone(),
            request_body: self.request_body.clone(),
            request_bytes_unread: self.request_bytes_unread.clone(),
            response_headers: self.response_headers.clone(),
            response_body: self.response_body.clone(),
            group_delimiter: self.group_delimiter.clone(),
            ..Schema::EMPTY
        }
    }

    /// A schema that emits nothing.
    const EMPTY: Schema = Schema {
        timestamp: EMPTY,
        level: EMPTY,
        message: EMPTY,
        error_message: EMPTY,
        error_type: EMPTY,
        error_stack_trace: EMPTY,
        source_file: EMPTY,
        source_line: EMPTY,
        source_function: EMPTY,
        request_url: EMPTY,
        request_method: EMPTY,
        request_path: EMPTY,
        request_remote_ip: EMPTY,
        request_host: EMPTY,
        request_scheme: EMPTY,
        request_proto: EMPTY,
        request_headers: EMPTY,
        request_body: EMPTY,
        request_bytes: EMPTY,
        request_bytes_unread: EMPTY,
        request_user_agent: EMPTY,
        request_referer: EMPTY,
        response_headers: EMPTY,
        response_body: EMPTY,
        response_status: EMPTY,
        response_duration: EMPTY,
        response_bytes: EMPTY,
        group_delimiter: None,
    };

    pub fn group_delimiter(&self) -> Option<&str> {
        self.group_delimiter.as_deref().filter(|d| !d.is_empty())
    }
}

impl Default for Schema {
    fn default() -> Self {
        Schema::ECS
    }
}

/// Schema preset selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaKind {
    #[default]
    Ecs,
    Otel,
    Gcp,
}

impl SchemaKind {
    pub fn schema(self) -> Schema {
        match self {
            SchemaKind::Ecs => Schema::ECS,
            SchemaKind::Otel => Schema::OTEL,
            SchemaKind::Gcp => Schema::GCP,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_lookup() {
        assert_eq!(Schema::ECS.field(Field::ResponseStatus), "http.response.status_code");
        assert_eq!(Schema::OTEL.field(Field::RequestRemoteIp), "client.address");
        assert_eq!(Schema::GCP.field(Field::ResponseStatus), "httpRequest:status");
        assert_eq!(Schema::GCP.group_delimiter(), Some(":"));
        assert_eq!(Schema::ECS.group_delimiter(), None);
    }

    #[test]
    fn test_concise_keeps_only_diagnostic_fields() {
        let concise = Schema::GCP.concise();
        assert_eq!(concise.field(Field::ErrorMessage), "error");
        assert_eq!(concise.field(Field::ErrorStackTrace), "stack_trace");
        assert_eq!(concise.field(Field::RequestBody), "httpRequest:requestBody");
        assert_eq!(concise.field(Field::ResponseHeaders), "httpRequest:responseHeaders");
        assert_eq!(concise.field(Field::RequestUrl), "");
        assert_eq!(concise.field(Field::ResponseStatus), "");
        assert_eq!(concise.field(Field::Timestamp), "");
        assert_eq!(concise.group_delimiter(), Some(":"));
    }

    #[test]
    fn test_concise_is_derived_not_copied() {
        let mut custom = Schema::ECS;
        custom.request_body = Cow::Owned("req.body".to_string());
        assert_eq!(custom.concise().field(Field::RequestBody), "req.body");
    }

    #[test]
    fn test_schema_kind() {
        #[derive(Deserialize)]
        struct W {
            schema: SchemaKind,
        }
        let w: W = toml::from_str("schema = \"gcp\"").unwrap();
        assert_eq!(w.schema.schema(), Schema::GCP);
    }
}
