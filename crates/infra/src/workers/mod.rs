//! Background consumers of the notification bus.

pub mod notification_worker;

pub use notification_worker::{NotificationWorker, WorkerHandle};
