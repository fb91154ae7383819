//! Chat prompt configuration objects.
//!
//! Prompts are caller-owned value objects: the optimization core never
//! mutates one in place. Every transformation clones and returns a fresh
//! instance.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::errors::ArgumentError;

/// Role of a single chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One message in a chat prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// A named prompt configuration: messages plus the model settings that
/// the search space may tune.
///
/// `model_kwargs` is the model-parameters bag; sampled values land either
/// on the top-level `model` field or at a nested path inside this bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatPrompt {
    /// Prompt name, used as the routing key in multi-prompt optimization.
    pub name: String,

    /// Ordered chat messages.
    pub messages: Vec<ChatMessage>,

    /// Model identifier (e.g. "gpt-4o-mini"). `None` defers to the
    /// evaluation collaborator's default.
    pub model: Option<String>,

    /// Free-form model parameters (temperature, top_p, nested provider
    /// settings, ...).
    pub model_kwargs: Map<String, Value>,
}

impl ChatPrompt {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            messages: Vec::new(),
            model: None,
            model_kwargs: Map::new(),
        }
    }

    pub fn with_message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_model_kwargs(mut self, model_kwargs: Map<String, Value>) -> Self {
        self.model_kwargs = model_kwargs;
        self
    }

    /// Copy of this prompt with a different model field.
    pub fn replace_model(&self, model: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.model = Some(model.into());
        next
    }

    /// Copy of this prompt with a different model-parameters bag.
    pub fn replace_model_kwargs(&self, model_kwargs: Map<String, Value>) -> Self {
        let mut next = self.clone();
        next.model_kwargs = model_kwargs;
        next
    }
}

/// The prompt argument accepted by the public optimization entry points:
/// either a single prompt or a name-keyed mapping of prompts.
///
/// Results are returned in the same shape as the input (single in,
/// single out; mapping in, mapping out).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PromptInput {
    Single(ChatPrompt),
    Named(BTreeMap<String, ChatPrompt>),
}

impl PromptInput {
    /// Validate the argument shape before any evaluation runs.
    pub fn validate(&self) -> Result<(), ArgumentError> {
        match self {
            Self::Single(prompt) => {
                if prompt.name.trim().is_empty() {
                    return Err(ArgumentError::BlankPromptName);
                }
            }
            Self::Named(prompts) => {
                if prompts.is_empty() {
                    return Err(ArgumentError::EmptyPromptSet);
                }
                if prompts.keys().any(|name| name.trim().is_empty()) {
                    return Err(ArgumentError::BlankPromptName);
                }
            }
        }
        Ok(())
    }

    pub fn is_single(&self) -> bool {
        matches!(self, Self::Single(_))
    }

    /// Name-keyed view used internally; a single prompt is keyed by its
    /// own name.
    pub fn to_named(&self) -> BTreeMap<String, ChatPrompt> {
        match self {
            Self::Single(prompt) => {
                let mut named = BTreeMap::new();
                named.insert(prompt.name.clone(), prompt.clone());
                named
            }
            Self::Named(prompts) => prompts.clone(),
        }
    }

    /// Repackage a name-keyed result into the shape of this input.
    pub fn reshape(&self, named: BTreeMap<String, ChatPrompt>) -> PromptInput {
        match self {
            Self::Single(prompt) => {
                let single = named
                    .get(&prompt.name)
                    .cloned()
                    .unwrap_or_else(|| prompt.clone());
                Self::Single(single)
            }
            Self::Named(_) => Self::Named(named),
        }
    }
}

impl From<ChatPrompt> for PromptInput {
    fn from(prompt: ChatPrompt) -> Self {
        Self::Single(prompt)
    }
}

impl From<BTreeMap<String, ChatPrompt>> for PromptInput {
    fn from(prompts: BTreeMap<String, ChatPrompt>) -> Self {
        Self::Named(prompts)
    }
}
