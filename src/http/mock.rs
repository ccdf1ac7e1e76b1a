//! Scripted in-process transport for tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{HttpRequest, HttpResponse, Transport};
use crate::error::FetchError;

/// Answers by exact URL. Unknown URLs fail like an unreachable network.
#[derive(Default)]
pub struct ScriptedTransport {
  routes: Mutex<HashMap<String, Result<HttpResponse, FetchError>>>,
  requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn respond(&self, url: &str, response: HttpResponse) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), Ok(response));
  }

  pub fn fail(&self, url: &str) {
    self.routes.lock().unwrap().insert(
      url.to_string(),
      Err(FetchError::network(format!("{} unreachable", url))),
    );
  }

  /// Make every scripted route fail.
  pub fn go_offline(&self) {
    let mut routes = self.routes.lock().unwrap();
    for (url, route) in routes.iter_mut() {
      *route = Err(FetchError::network(format!("{} unreachable", url)));
    }
  }

  pub fn calls(&self) -> usize {
    self.requests.lock().unwrap().len()
  }

  pub fn calls_to(&self, url: &str) -> usize {
    self
      .requests
      .lock()
      .unwrap()
      .iter()
      .filter(|r| r.url.as_str() == url)
      .count()
  }

  pub fn last_request(&self) -> Option<HttpRequest> {
    self.requests.lock().unwrap().last().cloned()
  }
}

#[async_trait]
impl Transport for ScriptedTransport {
  async fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError> {
    self.requests.lock().unwrap().push(request.clone());
    self
      .routes
      .lock()
      .unwrap()
      .get(request.url.as_str())
      .cloned()
      .unwrap_or_else(|| Err(FetchError::network("no route")))
  }
}
