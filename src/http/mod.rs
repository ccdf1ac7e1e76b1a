//! HTTP request/response values shared by the transport, the cache
//! coordinator and the story API client.

pub mod api_types;
pub mod client;
#[cfg(test)]
pub mod mock;
pub mod transport;

pub use reqwest::Method;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

pub use transport::{ReqwestTransport, Transport};

/// An outgoing request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
  pub method: Method,
  pub url: Url,
  pub headers: Vec<(String, String)>,
  pub body: Body,
}

#[derive(Debug, Clone, Default)]
pub enum Body {
  #[default]
  Empty,
  Bytes(Vec<u8>),
  Multipart(Vec<FormPart>),
}

/// One field of a multipart form.
#[derive(Debug, Clone)]
pub struct FormPart {
  pub name: String,
  pub value: PartValue,
}

#[derive(Debug, Clone)]
pub enum PartValue {
  Text(String),
  File {
    filename: String,
    mime: String,
    bytes: Vec<u8>,
  },
}

impl HttpRequest {
  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      headers: Vec::new(),
      body: Body::Empty,
    }
  }

  pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  pub fn bearer(self, token: &str) -> Self {
    self.header("Authorization", format!("Bearer {}", token))
  }

  pub fn json<T: Serialize>(self, value: &T) -> serde_json::Result<Self> {
    let bytes = serde_json::to_vec(value)?;
    Ok(Self {
      body: Body::Bytes(bytes),
      ..self.header("Content-Type", "application/json")
    })
  }

  pub fn multipart(self, parts: Vec<FormPart>) -> Self {
    Self {
      body: Body::Multipart(parts),
      ..self
    }
  }

  pub fn is_get(&self) -> bool {
    self.method == Method::GET
  }
}

/// A fully buffered response. Stored as-is in cache generations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponse {
  pub status: u16,
  #[serde(default)]
  pub headers: BTreeMap<String, String>,
  #[serde(default)]
  pub body: Vec<u8>,
}

impl HttpResponse {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: BTreeMap::new(),
      body: body.into(),
    }
  }

  /// JSON response with a `Content-Type` header.
  pub fn json_value(status: u16, value: &serde_json::Value) -> Self {
    let mut response = Self::new(status, value.to_string());
    response
      .headers
      .insert("content-type".to_string(), "application/json".to_string());
    response
  }

  /// 2xx status
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn content_type(&self) -> Option<&str> {
    self.headers.get("content-type").map(String::as_str)
  }

  pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
    serde_json::from_slice(&self.body)
  }

  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_json_request_sets_content_type() {
    let url = Url::parse("https://example.com/login").unwrap();
    let request = HttpRequest::new(Method::POST, url)
      .json(&serde_json::json!({ "email": "a@b.c" }))
      .unwrap();

    assert!(request
      .headers
      .iter()
      .any(|(k, v)| k == "Content-Type" && v == "application/json"));
    assert!(matches!(request.body, Body::Bytes(ref b) if b.starts_with(b"{")));
  }

  #[test]
  fn test_response_is_ok_range() {
    assert!(HttpResponse::new(200, "").is_ok());
    assert!(HttpResponse::new(204, "").is_ok());
    assert!(!HttpResponse::new(304, "").is_ok());
    assert!(!HttpResponse::new(500, "").is_ok());
  }
}
