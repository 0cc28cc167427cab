//! Fan-out of rendered updates to subscribed connections

pub mod fanout;
pub mod publisher;

pub use fanout::{Broadcaster, Delivery};
pub use publisher::EventPublisher;
