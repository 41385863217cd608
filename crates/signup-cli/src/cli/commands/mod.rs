//! CLI command handlers.

pub mod apple;
pub mod config;
pub mod google;
pub mod register;
