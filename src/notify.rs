// Notification port

use log::{info, warn};

/// How many delivered notifications `LogNotifier` remembers
const DELIVERED_HISTORY: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationPermission {
    Granted,
    Denied,
    /// The user has not been asked yet
    Default,
}

pub trait Notifier {
    fn permission(&self) -> NotificationPermission;

    /// Ask the user for permission. Only prompts while the permission is `Default`.
    fn request_permission(&mut self) -> NotificationPermission;

    /// Deliver a notification. Callers check `permission()` first.
    fn notify(&mut self, title: &str, body: &str);
}

/// Notifier that writes notifications to the log
pub struct LogNotifier {
    permission: NotificationPermission,
    delivered: Vec<(String, String)>,
}

impl LogNotifier {
    pub fn new(permission: NotificationPermission) -> Self {
        Self {
            permission,
            delivered: Vec::new(),
        }
    }

    /// The most recent delivered notifications as (title, body), oldest first
    pub fn delivered(&self) -> &[(String, String)] {
        &self.delivered
    }
}

impl Default for LogNotifier {
    fn default() -> Self {
        Self::new(NotificationPermission::Default)
    }
}

impl Notifier for LogNotifier {
    fn permission(&self) -> NotificationPermission {
        self.permission
    }

    fn request_permission(&mut self) -> NotificationPermission {
        if self.permission == NotificationPermission::Default {
            self.permission = NotificationPermission::Granted;
        }
        self.permission
    }

    fn notify(&mut self, title: &str, body: &str) {
        if self.permission != NotificationPermission::Granted {
            warn!("Dropping notification \"{}\", permission not granted", title);
            return;
        }
        info!("{}: {}", title, body);
        if self.delivered.len() == DELIVERED_HISTORY {
            self.delivered.remove(0);
        }
        self.delivered.push((title.to_string(), body.to_string()));
    }
}
