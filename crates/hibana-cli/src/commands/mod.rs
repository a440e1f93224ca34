//! CLI commands module.

pub mod balance;
pub mod chat;
pub mod compare;
pub mod completions;
pub mod images;
pub mod models;
