pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::NotificationError;
pub use store::NotificationStore;
pub use types::{NewNotification, Notification, NotificationKind};
