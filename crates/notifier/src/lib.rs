//! Notification dispatcher.
//!
//! Polls the notification queue, delivers each pending event over a
//! [`channel::DeliveryChannel`] and reports the outcome back to the queue,
//! which owns the retry policy.

pub mod channel;
pub mod dispatcher;
pub mod queue;
