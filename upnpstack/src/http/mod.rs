//! HTTP plumbing shared by the engine.
//!
//! Outbound requests (description/SCPD fetches, SOAP calls, GENA `NOTIFY`)
//! go through the [`HttpClient`] trait; [`UreqHttpClient`] is the blocking
//! implementation used at runtime. Inbound requests are delivered by the
//! embedding HTTP server as [`UpnpRequest`] and answered with [`UpnpResponse`].

mod ureq_client;

use std::net::IpAddr;

use thiserror::Error;

pub use ureq_client::UreqHttpClient;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HttpError {
    #[error("Invalid request for {0}: {1}")]
    InvalidRequest(String, String),

    #[error("HTTP transport error for {0}: {1}")]
    Transport(String, String),

    #[error("{0} answered with HTTP status {1}")]
    Status(String, u16),
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Outbound HTTP request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            method: method.to_string(),
            url: url.to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn get(url: &str) -> Self {
        Self::new("GET", url)
    }

    pub fn post(url: &str, body: impl Into<Vec<u8>>) -> Self {
        Self::new("POST", url).body(body)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// Response to an [`HttpRequest`], whatever its status.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// Blocking HTTP client.
pub trait HttpClient: Send + Sync {
    fn request(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;

    /// GET `url` and return the body of a 2xx response.
    fn fetch(&self, url: &str) -> Result<Vec<u8>, HttpError> {
        let response = self.request(HttpRequest::get(url))?;
        if !response.is_success() {
            return Err(HttpError::Status(url.to_string(), response.status));
        }
        Ok(response.body)
    }
}

/// Inbound request handed over by the embedding HTTP server.
#[derive(Debug, Clone, PartialEq)]
pub struct UpnpRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub remote_ip: IpAddr,
}

impl UpnpRequest {
    pub fn new(method: &str, path: &str, remote_ip: IpAddr) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            headers: Vec::new(),
            body: Vec::new(),
            remote_ip,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// Answer to an [`UpnpRequest`].
#[derive(Debug, Clone, PartialEq)]
pub struct UpnpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl UpnpResponse {
    /// Empty response with the given status.
    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn xml(status: u16, body: String) -> Self {
        Self {
            status,
            headers: vec![(
                "Content-Type".to_string(),
                r#"text/xml; charset="utf-8""#.to_string(),
            )],
            body: body.into_bytes(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}
