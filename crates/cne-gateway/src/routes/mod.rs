//! HTTP route handlers.

pub mod events;
pub mod health;
pub mod publishers;
mod records;
pub mod subscriptions;
