pub mod config;
pub mod error;
pub mod mcp;
pub mod slack;
pub mod tools;
pub mod utils;

pub use config::{Config, Credentials};
pub use error::{ConfigError, McpError, McpResult};
pub use slack::{SlackClient, SlackError};
