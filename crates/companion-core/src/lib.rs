//! # companion-core
//!
//! Core types, traits, configuration, and error handling for the companion bot.

pub mod config;
pub mod context;
pub mod error;
pub mod message;
pub mod service;
pub mod traits;
