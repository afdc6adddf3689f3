//! CLI subcommands. Each `run` reports failures as a printable message.

pub mod ask;
pub mod chat;
pub mod config;
pub mod keys;
