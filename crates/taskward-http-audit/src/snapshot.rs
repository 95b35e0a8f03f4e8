//! Point-in-time copies of an HTTP exchange, and the audit metadata built
//! from them.

use crate::RedactionError;
use bytes::Bytes;
use http::header::{HeaderMap, HOST};
use http::{request, response, Method, StatusCode, Uri, Version};
use http_body::Body;
use http_body_util::BodyExt;
use serde_json::{Map, Value};
use taskward_audit_types::Metadata;

/// The parts of a request recorded in an audit event.
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RequestSnapshot {
    /// Snapshot request head parts and an already buffered body.
    pub fn from_parts(parts: &request::Parts, body: Bytes) -> Self {
        Self {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            version: parts.version,
            headers: parts.headers.clone(),
            body,
        }
    }

    /// `Host` header, falling back to the URI authority.
    pub fn host(&self) -> String {
        self.headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| self.uri.authority().map(|a| a.to_string()))
            .unwrap_or_default()
    }

    /// Host name from the URI, without port. Empty for origin-form requests.
    pub fn hostname(&self) -> &str {
        self.uri.host().unwrap_or_default()
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub(crate) fn metadata(&self, headers: &HeaderMap, body: &[u8]) -> Vec<Metadata> {
        let mut md = vec![
            Metadata::new("host", self.host()),
            Metadata::new("hostname", self.hostname()),
            Metadata::new("method", self.method.as_str()),
            Metadata::new("path", self.path()),
            Metadata::new("protocol", protocol(self.version)),
            Metadata::new("query", self.uri.query().unwrap_or_default()),
            // http::Uri never carries a fragment.
            Metadata::new("fragment", ""),
            Metadata::new("headers", header_values(headers)),
        ];
        push_body(&mut md, body);
        md
    }
}

/// The parts of a response recorded in an audit event.
#[derive(Debug, Clone)]
pub struct ResponseSnapshot {
    /// The request this response answers. Its body is not recorded again.
    pub request: RequestSnapshot,
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ResponseSnapshot {
    pub fn from_parts(request: RequestSnapshot, parts: &response::Parts, body: Bytes) -> Self {
        Self {
            request,
            status: parts.status,
            version: parts.version,
            headers: parts.headers.clone(),
            body,
        }
    }

    pub(crate) fn metadata(&self, headers: &HeaderMap, body: &[u8]) -> Vec<Metadata> {
        let request = &self.request;
        let mut md = vec![
            Metadata::new("protocol", protocol(self.version)),
            Metadata::new("requestHost", request.host()),
            Metadata::new("requestHostname", request.hostname()),
            Metadata::new("requestMethod", request.method.as_str()),
            Metadata::new("requestPath", request.path()),
            Metadata::new("requestProtocol", protocol(request.version)),
            Metadata::new("status", status_line(self.status)),
            Metadata::new("statusCode", self.status.as_u16()),
            Metadata::new("headers", header_values(headers)),
        ];
        push_body(&mut md, body);
        md
    }
}

/// Buffer a whole body, e.g. an outbound response before auditing it.
pub async fn read_body<B>(body: B) -> Result<Bytes, RedactionError>
where
    B: Body,
    B::Error: Into<crate::BoxError>,
{
    body.collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|err| RedactionError::BodyRead(err.into()))
}

// A zero-length body is recorded as no body at all.
fn push_body(md: &mut Vec<Metadata>, body: &[u8]) {
    if !body.is_empty() {
        md.push(Metadata::new("body", String::from_utf8_lossy(body).into_owned()));
    }
}

fn protocol(version: Version) -> String {
    format!("{version:?}")
}

fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_str(), reason),
        None => status.as_str().to_string(),
    }
}

fn header_values(headers: &HeaderMap) -> Value {
    let mut out = Map::new();
    for name in headers.keys() {
        let values = headers
            .get_all(name)
            .iter()
            .map(|v| Value::String(String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();
        out.insert(name.as_str().to_string(), Value::Array(values));
    }
    Value::Object(out)
}
