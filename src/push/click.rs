//! Notification display and click routing.

use async_trait::async_trait;
use color_eyre::Result;
use std::sync::Mutex;
use tracing::{debug, info};

use super::notification::Notification;

/// Surface that shows notifications to the user.
#[async_trait]
pub trait NotificationCenter: Send + Sync {
  async fn show(&self, notification: &Notification) -> Result<()>;
  async fn close(&self, notification: &Notification) -> Result<()>;
}

/// An open application window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowClient {
  pub id: usize,
  pub url: String,
}

/// The set of application windows the coordinator can reach.
#[async_trait]
pub trait WindowClients: Send + Sync {
  async fn match_all(&self) -> Result<Vec<WindowClient>>;
  async fn focus(&self, client: &WindowClient) -> Result<()>;
  async fn open_window(&self, url: &str) -> Result<WindowClient>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
  Focused(WindowClient),
  Opened(WindowClient),
}

/// Close the notification, then focus a window already showing its target or
/// open a new one at `{origin}/#{url}`.
pub async fn handle_notification_click(
  notification: &Notification,
  origin: &str,
  center: &dyn NotificationCenter,
  windows: &dyn WindowClients,
) -> Result<ClickOutcome> {
  center.close(notification).await?;

  let target = notification.url.as_str();
  let existing = windows
    .match_all()
    .await?
    .into_iter()
    .find(|w| w.url.contains(target));

  if let Some(window) = existing {
    debug!(window = %window.url, "Focusing existing window");
    windows.focus(&window).await?;
    return Ok(ClickOutcome::Focused(window));
  }

  let url = format!("{}/#{}", origin.trim_end_matches('/'), target);
  info!(url = %url, "Opening window for notification");
  let window = windows.open_window(&url).await?;
  Ok(ClickOutcome::Opened(window))
}

/// Notification center that prints to stdout.
pub struct ConsoleNotifications;

#[async_trait]
impl NotificationCenter for ConsoleNotifications {
  async fn show(&self, n: &Notification) -> Result<()> {
    println!("[{}] {}", n.tag, n.title);
    println!("  {}", n.body);
    if let Some(image) = &n.image {
      println!("  image: {}", image);
    }
    let actions: Vec<&str> = n.actions.iter().map(|a| a.title.as_str()).collect();
    println!("  actions: {}", actions.join(" | "));
    println!("  opens: {}", n.url);
    Ok(())
  }

  async fn close(&self, n: &Notification) -> Result<()> {
    debug!(tag = %n.tag, "Notification closed");
    Ok(())
  }
}

/// In-memory window list, used by the `push --click` command and tests.
#[derive(Default)]
pub struct WindowList {
  windows: Mutex<Vec<WindowClient>>,
}

impl WindowList {
  pub fn new<I: IntoIterator<Item = String>>(urls: I) -> Self {
    let windows = urls
      .into_iter()
      .enumerate()
      .map(|(id, url)| WindowClient { id, url })
      .collect();
    Self {
      windows: Mutex::new(windows),
    }
  }
}

#[cfg(test)]
impl WindowList {
  fn len(&self) -> usize {
    self.windows.lock().unwrap_or_else(|e| e.into_inner()).len()
  }
}

#[async_trait]
impl WindowClients for WindowList {
  async fn match_all(&self) -> Result<Vec<WindowClient>> {
    Ok(self.windows.lock().unwrap_or_else(|e| e.into_inner()).clone())
  }

  async fn focus(&self, client: &WindowClient) -> Result<()> {
    debug!(window = client.id, "Window focused");
    Ok(())
  }

  async fn open_window(&self, url: &str) -> Result<WindowClient> {
    let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
    let window = WindowClient {
      id: windows.len(),
      url: url.to_string(),
    };
    windows.push(window.clone());
    Ok(window)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::push::notification_from_push;
  use std::sync::atomic::{AtomicUsize, Ordering};

  #[derive(Default)]
  struct CountingCenter {
    closed: AtomicUsize,
  }

  #[async_trait]
  impl NotificationCenter for CountingCenter {
    async fn show(&self, _n: &Notification) -> Result<()> {
      Ok(())
    }

    async fn close(&self, _n: &Notification) -> Result<()> {
      self.closed.fetch_add(1, Ordering::SeqCst);
      Ok(())
    }
  }

  fn notification(url: &str) -> Notification {
    let raw = format!(r#"{{"data":{{"url":"{}"}}}}"#, url);
    notification_from_push(Some(raw.as_bytes()), "Shop").unwrap()
  }

  #[tokio::test]
  async fn test_click_focuses_matching_window() {
    let center = CountingCenter::default();
    let windows = WindowList::new(vec![
      "https://shop.example/#/".to_string(),
      "https://shop.example/#/products".to_string(),
    ]);

    let outcome = handle_notification_click(
      &notification("/products"),
      "https://shop.example",
      &center,
      &windows,
    )
    .await
    .unwrap();

    assert!(matches!(outcome, ClickOutcome::Focused(ref w) if w.id == 1));
    assert_eq!(windows.len(), 2);
    assert_eq!(center.closed.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_click_opens_window_when_none_match() {
    let center = CountingCenter::default();
    let windows = WindowList::new(vec!["https://other.example/".to_string()]);

    let outcome = handle_notification_click(
      &notification("/favorites"),
      "https://shop.example/",
      &center,
      &windows,
    )
    .await
    .unwrap();

    match outcome {
      ClickOutcome::Opened(w) => assert_eq!(w.url, "https://shop.example/#/favorites"),
      other => panic!("expected a new window, got {:?}", other),
    }
    assert_eq!(windows.len(), 2);
  }

  #[tokio::test]
  async fn test_click_with_no_windows_opens_exactly_one() {
    let center = CountingCenter::default();
    let windows = WindowList::default();

    handle_notification_click(&notification("/"), "https://shop.example", &center, &windows)
      .await
      .unwrap();

    assert_eq!(windows.len(), 1);
  }
}
