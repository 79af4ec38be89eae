//! HTTP surface for orders and the internal notification queue.

pub mod middleware;
pub mod routes;
pub mod state;
