//! # docqa-cli
//!
//! Command-line front end for [`docqa_rag`]: index local files, ask
//! questions, delete documents and inspect the effective configuration.

pub mod cli;
pub mod loader;
pub mod settings;

pub use cli::{Cli, Commands, execute};
pub use settings::Settings;
