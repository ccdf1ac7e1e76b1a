//! Push payload decoding and notification defaults.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::PushError;

pub const DEFAULT_TITLE: &str = "E-Commerce App";
pub const DEFAULT_BODY: &str = "You have a new notification";
pub const PLAIN_TEXT_BODY: &str = "New notification";
pub const DEFAULT_ICON: &str = "/icons/icon-192x192.png";
pub const DEFAULT_BADGE: &str = "/icons/icon-72x72.png";
pub const DEFAULT_URL: &str = "/";
pub const DEFAULT_TAG: &str = "general";

/// Push message body. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushPayload {
  pub title: Option<String>,
  pub body: Option<String>,
  pub icon: Option<String>,
  pub image: Option<String>,
  pub data: Option<NotificationData>,
  pub actions: Option<Vec<NotificationAction>>,
  pub tag: Option<String>,
  pub renotify: Option<bool>,
  pub require_interaction: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationData {
  pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
}

impl NotificationAction {
  fn new(action: &str, title: &str) -> Self {
    Self {
      action: action.to_string(),
      title: title.to_string(),
    }
  }
}

/// A notification ready to display, with every default applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub image: Option<String>,
  /// Target opened on click
  pub url: String,
  pub actions: Vec<NotificationAction>,
  pub tag: String,
  pub renotify: bool,
  pub require_interaction: bool,
}

impl PushPayload {
  pub fn parse(raw: &[u8]) -> Result<Self, PushError> {
    Ok(serde_json::from_slice(raw)?)
  }

  /// Payload used when the message is not JSON: the raw text becomes the body.
  fn plain_text(raw: &[u8]) -> Self {
    let text = String::from_utf8_lossy(raw).into_owned();
    Self {
      body: Some(if text.is_empty() {
        PLAIN_TEXT_BODY.to_string()
      } else {
        text
      }),
      ..Self::default()
    }
  }

  /// Apply defaults. `app_name` is the fallback title.
  pub fn into_notification(self, app_name: &str) -> Notification {
    Notification {
      title: self.title.unwrap_or_else(|| app_name.to_string()),
      body: self.body.unwrap_or_else(|| DEFAULT_BODY.to_string()),
      icon: self.icon.unwrap_or_else(|| DEFAULT_ICON.to_string()),
      badge: DEFAULT_BADGE.to_string(),
      image: self.image,
      url: self
        .data
        .and_then(|d| d.url)
        .unwrap_or_else(|| DEFAULT_URL.to_string()),
      actions: self.actions.unwrap_or_else(|| {
        vec![
          NotificationAction::new("view", "View"),
          NotificationAction::new("dismiss", "Dismiss"),
        ]
      }),
      tag: self.tag.unwrap_or_else(|| DEFAULT_TAG.to_string()),
      renotify: self.renotify.unwrap_or(false),
      require_interaction: self.require_interaction.unwrap_or(false),
    }
  }
}

/// Build the notification for a push message.
///
/// `None` when the message carries no data. A body that does not decode as a
/// JSON object degrades to a plain-text notification.
pub fn notification_from_push(data: Option<&[u8]>, app_name: &str) -> Option<Notification> {
  let raw = data?;
  let payload = PushPayload::parse(raw).unwrap_or_else(|e| {
    warn!(error = %e, "Push payload is not JSON, showing as text");
    PushPayload::plain_text(raw)
  });
  Some(payload.into_notification(app_name))
}
