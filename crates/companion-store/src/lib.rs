//! # companion-store
//!
//! Flat JSON persistence for the companion bot: one document per user plus
//! global documents for the API key pool, task campaigns, reminders, the
//! license cache and backup settings.

pub mod duration;
pub mod keys;
pub mod reminder;
pub mod store;
pub mod task;
pub mod user;

pub use duration::GrantDuration;
pub use store::{Notice, Store};
pub use user::UserRecord;
