//! Shell reproduction of a captured request.

use crate::http::request::RequestSnapshot;

/// Render a single-line `curl` command.
///
/// `-X` is omitted for GET and POST, `--data-raw` is only added for POST and
/// every header value gets its own `-H`.
pub fn curl<'a, I>(method: &str, url: &str, headers: I, body: &str) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut out = String::from("curl");
    if method != "GET" && method != "POST" {
        out.push_str(" -X ");
        out.push_str(method);
    }
    out.push(' ');
    out.push_str(&single_quoted(url));
    if method == "POST" {
        out.push_str(" --data-raw ");
        out.push_str(&single_quoted(body));
    }
    for (name, value) in headers {
        out.push_str(" -H ");
        out.push_str(&single_quoted(&format!("{name}: {value}")));
    }
    out
}

/// `curl` command for a request snapshot, leaving out the `exclude`d
/// headers (matched case-insensitively). Non-UTF-8 header values are skipped.
pub fn curl_request(req: &RequestSnapshot, body: &str, exclude: &[&str]) -> String {
    let headers = req
        .headers
        .iter()
        .filter(|(name, _)| !exclude.iter().any(|e| name.as_str().eq_ignore_ascii_case(e)))
        .filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?)));
    curl(req.method.as_str(), &req.url, headers, body)
}

fn single_quoted(v: &str) -> String {
    format!("'{}'", v.replace('\'', r"'\''"))
}
