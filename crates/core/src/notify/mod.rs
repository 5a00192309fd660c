//! Fan-out of job snapshots to interested observers.

mod hub;

pub use hub::{NotificationHub, BROADCAST_CAPACITY, SUBSCRIBER_BUFFER};
