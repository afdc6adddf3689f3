//! A kid-safe voice tutor that forwards questions to OpenAI or Gemini.
//!
//! [`llm`] holds the provider adapter, [`session`] the conversation state
//! machine, and [`commands`] the terminal front-end built on both.

pub mod commands;
pub mod config;
pub mod credentials;
pub mod llm;
pub mod logging;
pub mod session;

/// Version string with build metadata, shown by `--version`.
pub const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\ncommit: ",
    env!("KT_GIT_SHA"),
    "\nbuilt: ",
    env!("KT_BUILD_TS")
);
