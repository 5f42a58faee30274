//! Request facts captured at entry.
//!
//! # Responsibilities
//! - Snapshot method, URL, host, scheme, protocol, headers and length
//!   before the request is handed to the inner service
//! - Resolve the peer address from axum's `ConnectInfo`
//!
//! # Design Decisions
//! - The snapshot is immutable; handlers mutating the request afterwards
//!   do not change what is logged

use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, Method, Request, Uri};
use http_body::Body as HttpBody;

/// Immutable view of the incoming request.
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    pub method: Method,
    /// URI as received (origin-form for most server requests).
    pub uri: Uri,
    /// Reconstructed absolute URL.
    pub url: String,
    pub path: String,
    pub scheme: String,
    pub host: String,
    pub remote_ip: Option<IpAddr>,
    pub proto: String,
    pub headers: HeaderMap,
    pub content_length: Option<u64>,
}

impl RequestSnapshot {
    pub fn capture<B: HttpBody>(req: &Request<B>) -> Self {
        let uri = req.uri();
        let headers = req.headers();

        let scheme = uri.scheme_str().unwrap_or("http").to_string();
        let host = uri
            .authority()
            .map(|a| a.as_str().to_string())
            .or_else(|| {
                headers
                    .get(header::HOST)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            })
            .unwrap_or_default();
        let path_and_query = uri.path_and_query().map_or("/", |pq| pq.as_str());
        let url = format!("{scheme}://{host}{path_and_query}");

        let content_length = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .or_else(|| req.body().size_hint().exact());

        let remote_ip = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        Self {
            method: req.method().clone(),
            uri: uri.clone(),
            url,
            path: uri.path().to_string(),
            scheme,
            host,
            remote_ip,
            proto: format!("{:?}", req.version()),
            headers: headers.clone(),
            content_length,
        }
    }

    /// `User-Agent`, when present and non-empty.
    pub fn user_agent(&self) -> Option<&str> {
        self.header(header::USER_AGENT)
    }

    /// `Referer`, when present and non-empty.
    pub fn referer(&self) -> Option<&str> {
        self.header(header::REFERER)
    }

    fn header(&self, name: header::HeaderName) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
    }

    /// The `Connection` header asks for a protocol upgrade.
    pub fn is_upgrade(&self) -> bool {
        self.headers
            .get_all(header::CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
    }
}
