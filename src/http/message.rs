use crate::error::ProxyError;

/// Headers not forwarded across the proxy boundary in either direction
/// (§4.3). Matched case-insensitively; `Proxy-*` is matched by prefix.
const HOP_BY_HOP: &[&str] = &[
    "transfer-encoding",
    "content-encoding",
    "connection",
    "keep-alive",
];

/// Shared by both directions (response header filtering here, request
/// header filtering in `proxy::dispatcher`) so the hop-by-hop set can't
/// drift between them.
pub(crate) fn is_hop_by_hop(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    HOP_BY_HOP.contains(&lower.as_str()) || lower.starts_with("proxy-")
}

/// A fully buffered HTTP/1.1 request, already reduced to origin-form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    pub method: String,
    /// Origin-form target: path plus optional query, always starting `/`.
    pub target: String,
    /// Ordered `(name, value)` pairs, original casing preserved.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ParsedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Parses `raw[..header_end]` as a request line + headers, then takes
    /// `raw[header_end..]` verbatim as the body (already sized correctly by
    /// the Request Reader via `Content-Length`).
    ///
    /// Rejects `Transfer-Encoding: chunked` with a protocol error per the
    /// spec's open question (§9): this core does not dechunk.
    pub fn parse(raw: &[u8], header_end: usize) -> Result<Self, ProxyError> {
        let mut header_storage = [httparse::EMPTY_HEADER; 64];
        let mut req = httparse::Request::new(&mut header_storage);

        match req.parse(&raw[..header_end]) {
            Ok(httparse::Status::Complete(_)) => {}
            Ok(httparse::Status::Partial) => {
                return Err(ProxyError::ClientProtocolError(
                    "incomplete request line or headers".into(),
                ));
            }
            Err(e) => {
                return Err(ProxyError::ClientProtocolError(format!(
                    "malformed request: {e}"
                )));
            }
        }

        let method = req
            .method
            .ok_or_else(|| ProxyError::ClientProtocolError("missing method".into()))?
            .to_string();

        let raw_target = req
            .path
            .ok_or_else(|| ProxyError::ClientProtocolError("missing request target".into()))?;
        let target = to_origin_form(raw_target)?;

        let headers: Vec<(String, String)> = req
            .headers
            .iter()
            .filter(|h| h.name != httparse::EMPTY_HEADER.name)
            .map(|h| {
                (
                    h.name.to_string(),
                    String::from_utf8_lossy(h.value).trim().to_string(),
                )
            })
            .collect();

        if headers
            .iter()
            .any(|(k, v)| k.eq_ignore_ascii_case("transfer-encoding") && v.eq_ignore_ascii_case("chunked"))
        {
            return Err(ProxyError::ClientProtocolError(
                "chunked transfer-encoding is not supported".into(),
            ));
        }

        let body = raw[header_end..].to_vec();

        Ok(ParsedRequest {
            method,
            target,
            headers,
            body,
        })
    }
}

/// Reduces an absolute-form or origin-form request-target to origin-form
/// (path + optional query, always prefixed with `/`).
fn to_origin_form(target: &str) -> Result<String, ProxyError> {
    if target.starts_with('/') {
        return Ok(target.to_string());
    }

    if target.starts_with("http://") || target.starts_with("https://") {
        let url = reqwest::Url::parse(target)
            .map_err(|e| ProxyError::ClientProtocolError(format!("bad absolute-form target: {e}")))?;
        let mut origin = url.path().to_string();
        if origin.is_empty() {
            origin.push('/');
        }
        if let Some(query) = url.query() {
            origin.push('?');
            origin.push_str(query);
        }
        return Ok(origin);
    }

    Err(ProxyError::ClientProtocolError(format!(
        "unrecognized request-target form: {target}"
    )))
}

/// A response to send back to the client, built from an upstream's reply or
/// from an error path. Mirrors `ParsedRequest`'s shape.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn json_error(status: u16, message: &str) -> Self {
        let body = format!(r#"{{"error":{{"message":"{message}","type":"proxy_error"}}}}"#);
        let mut resp = Self::new(status, body.into_bytes());
        resp.headers
            .push(("Content-Type".to_string(), "application/json".to_string()));
        resp
    }

    /// Strips hop-by-hop headers and appends the given headers, retaining
    /// the caller's ordering. `Content-Length` is recomputed separately at
    /// serialization time and must not be included here.
    pub fn with_upstream_headers(mut self, headers: &[(String, String)]) -> Self {
        for (name, value) in headers {
            if is_hop_by_hop(name) || name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            self.headers.push((name.clone(), value.clone()));
        }
        self
    }

    /// Serializes the response as raw HTTP/1.1 bytes: status line, headers
    /// (with a freshly computed `Content-Length`), CRLF CRLF, body.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256 + self.body.len());
        let mut status_buf = itoa::Buffer::new();

        out.extend_from_slice(b"HTTP/1.1 ");
        out.extend_from_slice(status_buf.format(self.status).as_bytes());
        out.push(b' ');
        out.extend_from_slice(reason_phrase(self.status).as_bytes());
        out.extend_from_slice(b"\r\n");

        for (name, value) in &self.headers {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }

        let mut len_buf = itoa::Buffer::new();
        out.extend_from_slice(b"Content-Length: ");
        out.extend_from_slice(len_buf.format(self.body.len()).as_bytes());
        out.extend_from_slice(b"\r\n\r\n");

        out.extend_from_slice(&self.body);
        out
    }
}

/// Status-reason table (§4.6). Any code not listed serializes with an empty
/// reason phrase, which is acceptable per spec.
fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "",
    }
}
