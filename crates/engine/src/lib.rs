//! Order and notification persistence for the ecomm back end.
//!
//! - [`order::OrderService`] owns the order status state machine.
//! - [`notification::NotificationStore`] owns the notification queue and its
//!   retry policy.

pub mod notification;
pub mod order;
