//! GENA eventing: subscriptions, sequence numbers and moderated delivery.
//!
//! A subscription is scoped by a key naming the evented service (its USN).
//! Its SID is derived from the callback URLs, so a client retrying the same
//! `SUBSCRIBE` gets the same SID back.
//!
//! Moderation works on two thresholds carried by each [`GenaEvent`]:
//! `moderated_interval` is the minimum delay between two deliveries to a
//! subscriber, `moderated_delta` the number of changes to accumulate before
//! delivering. Changes accumulate across rejected events and the count resets
//! on each delivery.

pub mod errors;
mod manager;
mod subscription;

pub use errors::GenaError;
pub use manager::{Delivery, Gena, GenaEvent, property_set};
pub use subscription::{
    SEQ_NUMBER_MAX, Subscription, derive_sid, parse_callbacks, parse_timeout_header,
};
