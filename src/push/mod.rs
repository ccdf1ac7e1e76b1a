//! Push message handling: decoding payloads into notifications and routing
//! notification clicks to an application window.

mod click;
mod notification;

pub use click::{
  handle_notification_click, ClickOutcome, ConsoleNotifications, NotificationCenter, WindowList,
};
pub use notification::{notification_from_push, DEFAULT_TITLE};
