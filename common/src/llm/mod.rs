// Commit message generation and resolution

pub mod client;
pub mod resolver;

pub use client::{MessageGenerator, OpenAiClient};
pub use resolver::{plan, resolve_message, MessagePlan, MessageSource, ResolvedMessage};
