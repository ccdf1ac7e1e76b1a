use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

use crate::error::{ApiError, FetchError};
use crate::http::api_types::{
  ApiMessage, LoginRequest, LoginResponse, LoginResult, NewStory, RegisterRequest,
  StoriesResponse,
};
use crate::http::{FormPart, HttpRequest, Method, PartValue, Transport};

const STORIES: &str = "/stories";
const LOGIN: &str = "/login";
const REGISTER: &str = "/register";

/// Story API client.
///
/// Requests go through whatever [`Transport`] it was built with; in the
/// application that is the cache coordinator, so reads are served offline.
#[derive(Clone)]
pub struct StoryApiClient {
  transport: Arc<dyn Transport>,
  base_url: String,
}

impl StoryApiClient {
  pub fn new(base_url: &str, transport: Arc<dyn Transport>) -> Result<Self> {
    Url::parse(base_url).map_err(|e| eyre!("Invalid API base URL {}: {}", base_url, e))?;

    Ok(Self {
      transport,
      base_url: base_url.trim_end_matches('/').to_string(),
    })
  }

  fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
    let raw = format!("{}{}", self.base_url, path);
    Url::parse(&raw)
      .map_err(|e| FetchError::InvalidRequest(format!("Bad URL {}: {}", raw, e)).into())
  }

  /// Send a request and decode the JSON body, turning non-2xx statuses into
  /// [`ApiError::Api`] with the body's `message`.
  async fn send<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<T, ApiError> {
    let response = self.transport.fetch(&request).await?;

    if !response.is_ok() {
      let message = response
        .json::<Value>()
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(String::from))
        .unwrap_or_else(|| "Request failed".to_string());
      return Err(ApiError::api(response.status, message));
    }

    Ok(response.json()?)
  }

  /// List stories. `with_location` restricts to stories carrying coordinates.
  pub async fn get_stories(
    &self,
    token: &str,
    with_location: bool,
  ) -> Result<StoriesResponse, ApiError> {
    let path = format!("{}?location={}", STORIES, u8::from(with_location));
    let request = HttpRequest::get(self.endpoint(&path)?).bearer(token);
    self.send(request).await
  }

  /// Publish a new story as multipart form data.
  pub async fn add_story(&self, token: &str, story: &NewStory) -> Result<ApiMessage, ApiError> {
    let mut parts = vec![
      FormPart {
        name: "description".to_string(),
        value: PartValue::Text(story.description.clone()),
      },
      FormPart {
        name: "photo".to_string(),
        value: PartValue::File {
          filename: story.photo_filename.clone(),
          mime: story.photo_mime.clone(),
          bytes: story.photo.clone(),
        },
      },
    ];
    if let (Some(lat), Some(lon)) = (story.lat, story.lon) {
      parts.push(FormPart {
        name: "lat".to_string(),
        value: PartValue::Text(lat.to_string()),
      });
      parts.push(FormPart {
        name: "lon".to_string(),
        value: PartValue::Text(lon.to_string()),
      });
    }

    let request = HttpRequest::new(Method::POST, self.endpoint(STORIES)?)
      .bearer(token)
      .multipart(parts);
    self.send(request).await
  }

  pub async fn login(&self, email: &str, password: &str) -> Result<LoginResult, ApiError> {
    let request = HttpRequest::new(Method::POST, self.endpoint(LOGIN)?)
      .json(&LoginRequest { email, password })?;
    let response: LoginResponse = self.send(request).await?;
    Ok(response.login_result)
  }

  pub async fn register(
    &self,
    name: &str,
    email: &str,
    password: &str,
  ) -> Result<ApiMessage, ApiError> {
    let request = HttpRequest::new(Method::POST, self.endpoint(REGISTER)?).json(&RegisterRequest {
      name,
      email,
      password,
    })?;
    self.send(request).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::http::mock::ScriptedTransport;
  use crate::http::{Body, HttpResponse};

  const BASE: &str = "https://story-api.example/v1";

  fn client(net: &Arc<ScriptedTransport>) -> StoryApiClient {
    StoryApiClient::new(BASE, net.clone()).unwrap()
  }

  #[tokio::test]
  async fn test_get_stories_sends_bearer_and_location() {
    let net = ScriptedTransport::new();
    net.respond(
      "https://story-api.example/v1/stories?location=1",
      HttpResponse::json_value(
        200,
        &serde_json::json!({ "error": false, "message": "ok", "listStory": [] }),
      ),
    );

    let stories = client(&net).get_stories("tok", true).await.unwrap();
    assert!(!stories.error);

    let request = net.last_request().unwrap();
    assert!(request
      .headers
      .iter()
      .any(|(k, v)| k == "Authorization" && v == "Bearer tok"));
  }

  #[tokio::test]
  async fn test_error_status_uses_body_message() {
    let net = ScriptedTransport::new();
    net.respond(
      "https://story-api.example/v1/login",
      HttpResponse::json_value(
        401,
        &serde_json::json!({ "error": true, "message": "Invalid password" }),
      ),
    );

    let err = client(&net).login("a@b.c", "nope").await.unwrap_err();
    match err {
      ApiError::Api { status, message } => {
        assert_eq!(status, 401);
        assert_eq!(message, "Invalid password");
      }
      other => panic!("unexpected error: {other:?}"),
    }
  }

  #[tokio::test]
  async fn test_error_status_without_json_body() {
    let net = ScriptedTransport::new();
    net.respond(
      "https://story-api.example/v1/register",
      HttpResponse::new(502, "Bad Gateway"),
    );

    let err = client(&net).register("n", "e", "p").await.unwrap_err();
    assert!(matches!(err, ApiError::Api { status: 502, ref message } if message == "Request failed"));
  }

  #[tokio::test]
  async fn test_login_returns_result() {
    let net = ScriptedTransport::new();
    net.respond(
      "https://story-api.example/v1/login",
      HttpResponse::json_value(
        200,
        &serde_json::json!({
          "error": false,
          "message": "success",
          "loginResult": { "userId": "user-1", "name": "Dina", "token": "t0k" }
        }),
      ),
    );

    let result = client(&net).login("a@b.c", "secret").await.unwrap();
    assert_eq!(result.token, "t0k");
    assert_eq!(result.user_id, "user-1");
  }

  #[tokio::test]
  async fn test_add_story_sends_multipart() {
    let net = ScriptedTransport::new();
    net.respond(
      "https://story-api.example/v1/stories",
      HttpResponse::json_value(201, &serde_json::json!({ "error": false, "message": "created" })),
    );

    let story = NewStory {
      description: "Fresh bread".to_string(),
      photo_filename: "bread.jpg".to_string(),
      photo_mime: "image/jpeg".to_string(),
      photo: vec![0xff, 0xd8],
      lat: Some(1.5),
      lon: Some(2.5),
    };
    let result = client(&net).add_story("tok", &story).await.unwrap();
    assert_eq!(result.message, "created");

    let request = net.last_request().unwrap();
    assert_eq!(request.method, Method::POST);
    match request.body {
      Body::Multipart(parts) => {
        let names: Vec<_> = parts.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["description", "photo", "lat", "lon"]);
      }
      other => panic!("expected multipart body, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn test_network_failure_surfaces_fetch_error() {
    let net = ScriptedTransport::new();
    let err = client(&net).get_stories("tok", false).await.unwrap_err();
    assert!(matches!(err, ApiError::Fetch(FetchError::NetworkFailure(_))));
  }
}
