//! agentic-rag: routes natural-language queries through LLM-selected tasks
//! and retrievers, with self-correcting code, SQL and tool-call loops.

pub mod cli;
pub mod code_agent;
pub mod controller;
pub mod error;
pub mod execution_loop;
pub mod launch;
pub mod llm;
pub mod paths;
pub mod prompts;
pub mod protocol;
pub mod retrievers;
pub mod sandbox;
pub mod settings;
pub mod sql_safety;
pub mod stores;
pub mod tasks;
pub mod tool_parsing;
pub mod tool_registry;

pub use controller::{Controller, ControllerResponse};
pub use error::{AgentError, ConfigError, LlmError, SandboxError, StoreError, ToolError};

#[cfg(test)]
mod tests;
