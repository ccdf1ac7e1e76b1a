//! Network transport abstraction.
//!
//! Everything that performs a live fetch goes through [`Transport`], so the
//! cache coordinator can wrap the real network and tests can script it.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use super::{Body, HttpRequest, HttpResponse, PartValue};
use crate::error::FetchError;

#[async_trait]
pub trait Transport: Send + Sync {
  /// Perform the request. Any HTTP status is a successful fetch; only
  /// transport failures are errors.
  async fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError>;
}

/// Live network transport backed by reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
  client: reqwest::Client,
}

impl ReqwestTransport {
  pub fn new(timeout: Duration) -> Result<Self, FetchError> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Self { client })
  }

  fn build(&self, request: &HttpRequest) -> Result<reqwest::RequestBuilder, FetchError> {
    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone());

    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }

    builder = match &request.body {
      Body::Empty => builder,
      Body::Bytes(bytes) => builder.body(bytes.clone()),
      Body::Multipart(parts) => {
        let mut form = reqwest::multipart::Form::new();
        for part in parts {
          form = match &part.value {
            PartValue::Text(text) => form.text(part.name.clone(), text.clone()),
            PartValue::File {
              filename,
              mime,
              bytes,
            } => {
              let file = reqwest::multipart::Part::bytes(bytes.clone())
                .file_name(filename.clone())
                .mime_str(mime)
                .map_err(|e| FetchError::InvalidRequest(format!("Bad mime type {}: {}", mime, e)))?;
              form.part(part.name.clone(), file)
            }
          };
        }
        builder.multipart(form)
      }
    };

    Ok(builder)
  }
}

#[async_trait]
impl Transport for ReqwestTransport {
  async fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError> {
    let response = self.build(request)?.send().await?;
    let status = response.status().as_u16();

    let headers: BTreeMap<String, String> = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_lowercase(), v.to_string()))
      })
      .collect();

    let body = response.bytes().await?.to_vec();
    debug!(method = %request.method, url = %request.url, status, "Fetched");

    Ok(HttpResponse {
      status,
      headers,
      body,
    })
  }
}
