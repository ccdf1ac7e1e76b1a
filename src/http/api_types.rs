//! Serde types matching the story API responses.

use serde::{Deserialize, Serialize};

use crate::favorites::ProductInput;

/// Envelope shared by every endpoint: `{ error, message, ... }`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiMessage {
  #[serde(default)]
  pub error: bool,
  #[serde(default)]
  pub message: String,
}

// ============================================================================
// Stories
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
  pub id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub photo_url: String,
  #[serde(default)]
  pub created_at: String,
  pub lat: Option<f64>,
  pub lon: Option<f64>,
}

impl From<&Story> for ProductInput {
  fn from(story: &Story) -> Self {
    ProductInput {
      id: story.id.clone(),
      name: story.name.clone(),
      description: story.description.clone(),
      photo_url: story.photo_url.clone(),
    }
  }
}

/// `GET /stories` response. The offline placeholder has the same shape with
/// `error: true` and an empty list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoriesResponse {
  #[serde(default)]
  pub error: bool,
  #[serde(default)]
  pub message: String,
  #[serde(default)]
  pub list_story: Vec<Story>,
}

/// Fields of a new story submission.
#[derive(Debug, Clone)]
pub struct NewStory {
  pub description: String,
  pub photo_filename: String,
  pub photo_mime: String,
  pub photo: Vec<u8>,
  pub lat: Option<f64>,
  pub lon: Option<f64>,
}

// ============================================================================
// Auth
// ============================================================================

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
  pub email: &'a str,
  pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct RegisterRequest<'a> {
  pub name: &'a str,
  pub email: &'a str,
  pub password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResult {
  pub user_id: String,
  pub name: String,
  pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
  #[serde(default)]
  pub error: bool,
  #[serde(default)]
  pub message: String,
  pub login_result: LoginResult,
}
