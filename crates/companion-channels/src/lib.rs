//! # companion-channels
//!
//! Messaging transports for the companion bot.

pub mod whatsapp;

pub use whatsapp::WhatsAppChannel;
