mod hub;
mod types;

pub use hub::{NotificationSubscriber, ObserverHub};
pub use types::{DownloadNotification, NotificationKind, ProgressUpdate};
