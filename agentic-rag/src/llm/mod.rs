//! Model client abstraction.
//!
//! The orchestration layers only see `LlmClient`. Concrete clients own their
//! transport, retry rate-limited calls internally and surface everything else
//! as a distinguished `LlmError`.

pub mod backoff;
pub mod openai_client;

use async_trait::async_trait;

use crate::error::LlmError;
use crate::protocol::{LlmResponse, Message};

pub use backoff::{Backoff, RetryPolicy};
pub use openai_client::{OpenAiClient, OpenAiClientConfig};

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send the conversation and return the assistant's reply.
    async fn invoke(&self, messages: &[Message]) -> Result<LlmResponse, LlmError>;
}
