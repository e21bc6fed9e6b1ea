//! # Lightwatch Channels
//! Messaging platform implementations of [`lightwatch_core::Messenger`].

pub mod telegram;

pub use telegram::TelegramMessenger;
