// Notification hub - best-effort fan-out of workflow events to observers

pub mod events;
pub mod hub;

pub use events::HubEvent;
pub use hub::{NotificationHub, ObserverId, Subscription};
