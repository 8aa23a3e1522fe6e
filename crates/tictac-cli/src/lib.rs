//! Tic-tac-toe gateway
//!
//! WebSocket front end and local inspection commands for the session runtime.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod gateway;
pub mod protocol;

pub use config::AppConfig;
pub use error::{CliError, Result};
pub use gateway::Gateway;
