pub mod client;
pub mod error;
pub mod types;

pub use client::{ListChannelsOptions, SlackClient};
pub use error::{SlackError, SlackResult};
