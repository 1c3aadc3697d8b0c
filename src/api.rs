//! HTTP request primitive consumed by the release workflow.
//!
//! The workflow only ever needs "send this request, give me the response", so
//! that is the whole surface of [`Transport`]. Status codes are never turned
//! into errors here; callers decide what a non-success status means.
use std::error::Error as StdError;
use std::fmt;
use std::time::Instant;
use url::Url;

/// Media type of resource documents exchanged with the API.
pub const HYPERMEDIA_MEDIA_TYPE: &str = "application/vnd.api+json";
/// Media type declared for archive uploads.
pub const ARCHIVE_MEDIA_TYPE: &str = "application/zip";

const USER_AGENT: &str = concat!("applura-cli/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outgoing request. Header names are stored lowercase.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl ApiRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// Set a header, replacing any previous value for the same name.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let name = name.to_ascii_lowercase();
        self.headers.retain(|(existing, _)| *existing != name);
        self.headers.push((name, value.into()));
    }

    #[cfg(test)]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Headers safe to print in diagnostics.
    pub fn redacted_headers(&self) -> Vec<(String, String)> {
        self.headers
            .iter()
            .map(|(name, value)| {
                if name == "authorization" {
                    (name.clone(), "<redacted>".to_string())
                } else {
                    (name.clone(), value.clone())
                }
            })
            .collect()
    }
}

/// A fully read response. `url` is the URL the response was served from and
/// is the base for any relative links in the body.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub url: Url,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        self.status < 300
    }

    /// Prefix match so parameters like `; charset=utf-8` are accepted.
    pub fn has_media_type(&self, media_type: &str) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|value| value.trim_start().starts_with(media_type))
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// The round trip itself failed (network, DNS, TLS, unreadable body).
#[derive(Debug, thiserror::Error)]
#[error("{method} {url} failed")]
pub struct TransportError {
    pub method: Method,
    pub url: Url,
    #[source]
    pub source: Box<dyn StdError + Send + Sync>,
}

impl TransportError {
    pub fn new(request: &ApiRequest, source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            method: request.method,
            url: request.url.clone(),
            source: source.into(),
        }
    }
}

pub trait Transport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        (**self).send(request)
    }
}

/// Blocking HTTPS transport backed by `ureq`.
///
/// Redirects are not followed: every URL the client uses comes from a link the
/// server advertised, so the effective URL of a response is its request URL.
pub struct HttpTransport {
    agent: ureq::Agent,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    pub fn new() -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .max_redirects(0)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let mut builder = ureq::http::Request::builder()
            .method(request.method.as_str())
            .uri(request.url.as_str())
            .header("user-agent", USER_AGENT);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let body: Option<&[u8]> = match (&request.body, request.method) {
            (Some(body), _) => Some(body.as_slice()),
            (None, Method::Get) => None,
            // Empty POST/PUT: content-length 0, never chunked.
            (None, _) => Some(&[][..]),
        };

        let start = Instant::now();
        let sent = match body {
            Some(body) => {
                let http_request = builder
                    .body(body)
                    .map_err(|err| TransportError::new(request, err))?;
                self.agent.run(http_request)
            }
            None => {
                let http_request = builder
                    .body(())
                    .map_err(|err| TransportError::new(request, err))?;
                self.agent.run(http_request)
            }
        };
        let mut response = sent.map_err(|err| TransportError::new(request, err))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(ureq::http::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .body_mut()
            .read_to_vec()
            .map_err(|err| TransportError::new(request, err))?;

        tracing::debug!(
            method = %request.method,
            url = %request.url,
            status,
            elapsed_ms = start.elapsed().as_millis(),
            response_bytes = body.len(),
            "api request complete"
        );

        Ok(ApiResponse {
            status,
            url: request.url.clone(),
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    fn request() -> ApiRequest {
        ApiRequest::new(
            Method::Put,
            Url::parse("https://uploads.example.test/x").expect("parse url"),
        )
    }

    #[test]
    fn set_header_replaces_case_insensitively() {
        let mut req = request().with_header("Content-Type", "text/plain");
        req.set_header("content-type", ARCHIVE_MEDIA_TYPE);
        assert_eq!(req.headers.len(), 1);
        assert_eq!(req.header("CONTENT-TYPE"), Some(ARCHIVE_MEDIA_TYPE));
    }

    #[test]
    fn authorization_is_redacted() {
        let req = request()
            .with_header("Authorization", "Basic c2VjcmV0")
            .with_header("content-length", "3");
        let headers = req.redacted_headers();
        assert!(headers.contains(&("authorization".to_string(), "<redacted>".to_string())));
        assert!(headers.contains(&("content-length".to_string(), "3".to_string())));
    }

    #[test]
    fn media_type_matches_with_parameters() {
        let mut response = ApiResponse {
            status: 200,
            url: Url::parse("https://api.example.test/").expect("parse url"),
            content_type: Some("application/vnd.api+json; charset=utf-8".to_string()),
            body: Vec::new(),
        };
        assert!(response.has_media_type(HYPERMEDIA_MEDIA_TYPE));
        response.content_type = Some("application/json".to_string());
        assert!(!response.has_media_type(HYPERMEDIA_MEDIA_TYPE));
        response.content_type = None;
        assert!(!response.has_media_type(HYPERMEDIA_MEDIA_TYPE));
    }

    #[test]
    fn success_is_below_300() {
        let mut response = ApiResponse {
            status: 201,
            url: Url::parse("https://api.example.test/").expect("parse url"),
            content_type: None,
            body: Vec::new(),
        };
        assert!(response.is_success());
        response.status = 300;
        assert!(!response.is_success());
    }

    /// Serve one canned response on a loopback port; the handle yields the raw request.
    fn serve_once(response: &'static str) -> (Url, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        let addr = listener.local_addr().expect("local addr");
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let raw = read_request(&mut stream);
            stream
                .write_all(response.as_bytes())
                .expect("write response");
            raw
        });
        let url = Url::parse(&format!("http://{addr}/up")).expect("parse url");
        (url, handle)
    }

    fn read_request(stream: &mut TcpStream) -> String {
        let mut raw = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = stream.read(&mut buf).expect("read request");
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);
            let Some(end) = raw.windows(4).position(|window| window == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&raw[..end]).to_ascii_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if raw.len() >= end + 4 + length {
                break;
            }
        }
        String::from_utf8_lossy(&raw).into_owned()
    }

    /// Matching header lines, lowercased.
    fn header_lines(raw: &str, name: &str) -> Vec<String> {
        let prefix = format!("{name}:");
        raw.lines()
            .map(str::to_ascii_lowercase)
            .filter(|line| line.starts_with(&prefix))
            .collect()
    }

    #[test]
    fn upload_sends_declared_length_and_media_type() {
        let (url, server) =
            serve_once("HTTP/1.1 201 Created\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        let request = ApiRequest::new(Method::Put, url)
            .with_header("content-type", ARCHIVE_MEDIA_TYPE)
            .with_header("content-length", "3")
            .with_body(b"abc".to_vec());
        let response = HttpTransport::new().send(&request).expect("send upload");
        assert_eq!(response.status, 201);

        let raw = server.join().expect("server thread");
        assert!(raw.starts_with("PUT /up HTTP/1.1\r\n"), "{raw}");
        assert_eq!(header_lines(&raw, "content-length"), vec!["content-length: 3"]);
        assert_eq!(
            header_lines(&raw, "content-type"),
            vec!["content-type: application/zip"]
        );
        assert!(header_lines(&raw, "transfer-encoding").is_empty(), "{raw}");
        assert!(raw.ends_with("\r\n\r\nabc"), "{raw}");
    }

    #[test]
    fn empty_post_sends_zero_length() {
        let (url, server) =
            serve_once("HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n");
        let request = ApiRequest::new(Method::Post, url);
        let response = HttpTransport::new().send(&request).expect("send post");
        assert_eq!(response.status, 204);

        let raw = server.join().expect("server thread");
        assert!(raw.starts_with("POST /up HTTP/1.1\r\n"), "{raw}");
        assert_eq!(header_lines(&raw, "content-length"), vec!["content-length: 0"]);
        assert!(header_lines(&raw, "transfer-encoding").is_empty(), "{raw}");
    }

    #[test]
    fn redirects_are_returned_not_followed() {
        let (url, server) = serve_once(
            "HTTP/1.1 302 Found\r\nLocation: http://127.0.0.1:1/elsewhere\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        let request = ApiRequest::new(Method::Get, url.clone());
        let response = HttpTransport::new().send(&request).expect("send get");
        assert_eq!(response.status, 302);
        assert_eq!(response.url, url);
        assert!(!response.is_success());
        server.join().expect("server thread");
    }

    #[test]
    fn error_statuses_are_responses() {
        let (url, server) = serve_once(
            "HTTP/1.1 422 Unprocessable Entity\r\nContent-Type: application/vnd.api+json\r\nContent-Length: 11\r\nConnection: close\r\n\r\n{\"errors\":1",
        );
        let request = ApiRequest::new(Method::Post, url);
        let response = HttpTransport::new().send(&request).expect("send post");
        assert_eq!(response.status, 422);
        assert!(response.has_media_type(HYPERMEDIA_MEDIA_TYPE));
        assert_eq!(response.body_text(), "{\"errors\":1");
        server.join().expect("server thread");
    }
}
