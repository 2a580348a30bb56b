//! Quotecast — a daily-quote subscription bot.
//!
//! Subscribers pick a category and a delivery hour through inline menus;
//! a per-subscriber delivery job then sends one quote a day and collects
//! structured feedback on it. Conversation state is held per subscriber in
//! the [`session`] store and driven through the explicit transition table
//! in [`dialogue`].

pub mod config;
pub mod dialogue;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod transport;

pub use error::{Error, Result};
