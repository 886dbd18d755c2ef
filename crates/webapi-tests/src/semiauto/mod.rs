//! Semi-automated testing: human-in-the-loop prompts.
//!
//! Some checks cannot be automated ("did a notification appear?"). A case
//! asks the operator through a [`Prompter`]; in a real run the prompt is
//! pushed over a WebSocket to the operator page served by the
//! [`CoordinationServer`], which lives inside a [`TestEnvironment`].

mod broker;
mod environment;
mod server;

pub use broker::{PendingPrompt, PromptBroker, PromptReply};
pub use environment::{
    EnvironmentConfig, EnvironmentSlot, Phase, TestEnvironment, DEFAULT_HOST,
    DEFAULT_JOIN_TIMEOUT_MS, DEFAULT_PORT,
};
pub use server::{ClientMessage, CoordinationServer, ServerMessage};

use crate::result::{WebApiError, WebApiResult};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// What the operator is asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptKind {
    /// Perform an action, then press OK (or Cancel)
    Instruct,
    /// Answer a yes / no question
    Confirm,
}

/// A message shown to the operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    /// Prompt kind
    pub kind: PromptKind,
    /// Text shown to the operator
    pub message: String,
}

impl Prompt {
    /// An instruction
    #[must_use]
    pub fn instruct(message: impl Into<String>) -> Self {
        Self {
            kind: PromptKind::Instruct,
            message: message.into(),
        }
    }

    /// A yes / no question
    #[must_use]
    pub fn confirm(message: impl Into<String>) -> Self {
        Self {
            kind: PromptKind::Confirm,
            message: message.into(),
        }
    }
}

/// Something that can put a prompt in front of the operator
pub trait Prompter {
    /// Show a prompt; `true` means OK / yes
    fn ask(&mut self, prompt: &Prompt) -> WebApiResult<bool>;

    /// Ask the operator to do something; a cancel fails the case
    fn instruct(&mut self, message: &str) -> WebApiResult<()> {
        if self.ask(&Prompt::instruct(message))? {
            Ok(())
        } else {
            Err(WebApiError::assertion(format!(
                "Failed on instruction: {message}"
            )))
        }
    }

    /// Ask a question; a "no" fails the case
    fn confirm(&mut self, message: &str) -> WebApiResult<()> {
        if self.ask(&Prompt::confirm(message))? {
            Ok(())
        } else {
            Err(WebApiError::assertion(message))
        }
    }
}

/// Prompter that replays canned answers
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<bool>,
    asked: Vec<Prompt>,
}

impl ScriptedPrompter {
    /// Prompter answering in order
    #[must_use]
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            asked: Vec::new(),
        }
    }

    /// Prompter accepting everything
    #[must_use]
    pub fn accepting(count: usize) -> Self {
        Self::new(std::iter::repeat(true).take(count))
    }

    /// Prompts shown so far
    #[must_use]
    pub fn asked(&self) -> &[Prompt] {
        &self.asked
    }
}

impl Prompter for ScriptedPrompter {
    fn ask(&mut self, prompt: &Prompt) -> WebApiResult<bool> {
        self.asked.push(prompt.clone());
        self.answers
            .pop_front()
            .ok_or_else(|| WebApiError::prompt(format!("no scripted answer for {:?}", prompt.message)))
    }
}

/// Prompter backed by the coordination server
#[derive(Debug, Clone)]
pub struct ServerPrompter {
    broker: Arc<PromptBroker>,
    deadline: Option<Duration>,
}

impl ServerPrompter {
    /// Prompter over a broker; `deadline` bounds each answer
    #[must_use]
    pub fn new(broker: Arc<PromptBroker>, deadline: Option<Duration>) -> Self {
        Self { broker, deadline }
    }
}

impl Prompter for ServerPrompter {
    fn ask(&mut self, prompt: &Prompt) -> WebApiResult<bool> {
        info!(kind = ?prompt.kind, message = %prompt.message, "waiting for operator");
        let accepted = self.broker.ask(prompt, self.deadline)?;
        info!(accepted, "operator answered");
        Ok(accepted)
    }
}
