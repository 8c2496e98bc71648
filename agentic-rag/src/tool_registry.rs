//! Tool Registry - name-keyed capabilities offered to the controller
//!
//! The registry is built fresh for every query from the selected tasks and
//! retrievers. Each entry carries an explicit argument schema; arguments are
//! checked against it before the capability runs.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{AgentError, ToolError};
use crate::protocol::TokenUsage;
use crate::retrievers::Retriever;
use crate::tasks::Task;

pub type ToolArgs = Map<String, Value>;

// ========== Descriptors ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Retriever,
    Task,
}

/// Semantic type of one argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgType {
    String,
    Integer,
    Number,
    Boolean,
}

impl ArgType {
    fn expected(&self) -> &'static str {
        match self {
            ArgType::String => "a string",
            ArgType::Integer => "an integer",
            ArgType::Number => "a number",
            ArgType::Boolean => "a boolean",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            ArgType::String => value.is_string(),
            ArgType::Integer => value.is_i64() || value.is_u64(),
            ArgType::Number => value.is_number(),
            ArgType::Boolean => value.is_boolean(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArgumentSpec {
    pub name: &'static str,
    pub arg_type: ArgType,
    pub description: &'static str,
    pub required: bool,
}

impl ArgumentSpec {
    pub const fn required(name: &'static str, arg_type: ArgType, description: &'static str) -> Self {
        Self {
            name,
            arg_type,
            description,
            required: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub kind: ToolKind,
    pub description: String,
    pub arguments: Vec<ArgumentSpec>,
}

impl ToolDescriptor {
    /// Description as shown to the controller model.
    pub fn display_description(&self) -> String {
        let label = match self.kind {
            ToolKind::Retriever => "retriever tool",
            ToolKind::Task => "agent tool",
        };
        format!("Type: `{}`\n{}", label, self.description)
    }

    /// Check `args` against the declared schema. Unknown extra keys are ignored.
    pub fn validate_args(&self, args: &ToolArgs) -> Result<(), ToolError> {
        for spec in &self.arguments {
            match args.get(spec.name) {
                None | Some(Value::Null) if spec.required => {
                    return Err(ToolError::MissingArgument(spec.name.to_string()))
                }
                None | Some(Value::Null) => {}
                Some(value) if !spec.arg_type.accepts(value) => {
                    return Err(ToolError::InvalidArgument {
                        name: spec.name.to_string(),
                        expected: spec.arg_type.expected(),
                    })
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    fn metadata(&self) -> String {
        let mut out = format!("**{}**: {}\n  Parameters:", self.name, self.display_description());
        for arg in &self.arguments {
            out.push_str(&format!("\n    - `{}`: {}", arg.name, arg.description));
        }
        out
    }
}

/// What a capability hands back to the controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolOutput {
    pub content: String,
    /// Files produced while running (charts)
    pub artifacts: Vec<String>,
    /// Model usage spent inside the capability
    pub usage: TokenUsage,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_artifacts(mut self, artifacts: Vec<String>) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }
}

/// Read a string argument that `validate_args` has already checked.
pub fn str_arg<'a>(args: &'a ToolArgs, name: &str) -> Result<&'a str, ToolError> {
    match args.get(name) {
        Some(Value::String(s)) => Ok(s),
        Some(Value::Null) | None => Err(ToolError::MissingArgument(name.to_string())),
        Some(_) => Err(ToolError::InvalidArgument {
            name: name.to_string(),
            expected: "a string",
        }),
    }
}

// ========== Registry ==========

/// A registered capability; tasks and retrievers are the closed set.
pub struct RegisteredTool<'a> {
    pub descriptor: ToolDescriptor,
    capability: CapabilityRef<'a>,
}

enum CapabilityRef<'a> {
    Task(&'a Task),
    Retriever(&'a Retriever),
}

impl<'a> RegisteredTool<'a> {
    /// Validate `args` and run the capability.
    pub async fn invoke(&self, args: &ToolArgs) -> Result<ToolOutput, ToolError> {
        self.descriptor.validate_args(args)?;
        match self.capability {
            CapabilityRef::Task(task) => task.invoke(args).await,
            CapabilityRef::Retriever(retriever) => retriever.invoke(args).await,
        }
    }
}

/// Query-scoped registry. Borrows the capabilities owned by the controller.
pub struct ToolRegistry<'a> {
    tools: Vec<RegisteredTool<'a>>,
    index: HashMap<String, usize>,
}

impl Default for ToolRegistry<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> ToolRegistry<'a> {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn register_task(&mut self, task: &'a Task) -> Result<(), AgentError> {
        self.insert(task.descriptor(), CapabilityRef::Task(task))
    }

    pub fn register_retriever(&mut self, retriever: &'a Retriever) -> Result<(), AgentError> {
        self.insert(retriever.descriptor(), CapabilityRef::Retriever(retriever))
    }

    fn insert(
        &mut self,
        descriptor: ToolDescriptor,
        capability: CapabilityRef<'a>,
    ) -> Result<(), AgentError> {
        if self.index.contains_key(&descriptor.name) {
            return Err(AgentError::DuplicateCapability(descriptor.name));
        }
        self.index.insert(descriptor.name.clone(), self.tools.len());
        self.tools.push(RegisteredTool {
            descriptor,
            capability,
        });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTool<'a>> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// Metadata block embedded in the controller's system message.
    pub fn metadata(&self) -> String {
        self.tools
            .iter()
            .map(|t| t.descriptor.metadata())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
