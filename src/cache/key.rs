//! Request keys for stored responses.

use sha2::{Digest, Sha256};

use crate::http::HttpRequest;

/// Identifies a stored response: method plus URL without fragment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestKey {
  method: String,
  url: String,
}

impl RequestKey {
  pub fn for_request(request: &HttpRequest) -> Self {
    let mut url = request.url.clone();
    url.set_fragment(None);
    Self {
      method: request.method.as_str().to_uppercase(),
      url: url.into(),
    }
  }

  /// Stable fixed-length hash used as the storage key
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }

  pub fn description(&self) -> String {
    format!("{} {}", self.method, self.url)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::http::Method;
  use url::Url;

  fn key(method: Method, url: &str) -> RequestKey {
    RequestKey::for_request(&HttpRequest::new(method, Url::parse(url).unwrap()))
  }

  #[test]
  fn test_fragment_is_ignored() {
    assert_eq!(
      key(Method::GET, "https://shop.example/index.html#top").cache_hash(),
      key(Method::GET, "https://shop.example/index.html").cache_hash()
    );
  }

  #[test]
  fn test_query_and_method_distinguish_keys() {
    let base = key(Method::GET, "https://api.example/v1/stories?location=0");
    assert_ne!(
      base.cache_hash(),
      key(Method::GET, "https://api.example/v1/stories?location=1").cache_hash()
    );
    assert_ne!(
      base.cache_hash(),
      key(Method::POST, "https://api.example/v1/stories?location=0").cache_hash()
    );
    assert_eq!(base.cache_hash().len(), 64);
  }
}
