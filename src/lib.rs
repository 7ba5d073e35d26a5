//! botwarden: health probe and process supervisor for Telegram bot containers

pub mod cli;
pub mod config;
pub mod daemon;
pub mod health;
pub mod notify;
pub mod probe;
pub mod supervisor;
pub mod utils;
