//! Context Assembler: ledger to prompt turns.
//!
//! Role mapping is fixed: `user` maps to request, a completed `assistant`
//! message maps to response. A failed or pending assistant row has no prompt
//! role; it is a diagnostic for humans, not model output, so role mapping
//! yields no turn for it. Every turn that role mapping produces reaches the
//! window policy, and only the window policy drops turns. The pending user
//! turn is always the final turn and appears exactly once, whether or not it
//! has already been persisted.

use parley_types::chat::{ChatMessage, MessageRole, MessageStatus};
use parley_types::llm::{GenerationRequest, PromptTurn};
use uuid::Uuid;

use super::window::{FullHistory, WindowPolicy};

/// The user turn a generation call answers.
#[derive(Debug, Clone)]
pub struct PendingTurn {
    /// Ledger id when the turn is already persisted.
    pub message_id: Option<Uuid>,
    pub content: String,
}

impl PendingTurn {
    pub fn persisted(message: &ChatMessage) -> Self {
        Self {
            message_id: Some(message.id),
            content: message.content.clone(),
        }
    }

    pub fn unsaved(content: impl Into<String>) -> Self {
        Self {
            message_id: None,
            content: content.into(),
        }
    }
}

#[derive(Debug)]
pub struct ContextAssembler {
    policy: Box<dyn WindowPolicy>,
    system_prompt: Option<String>,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(Box::new(FullHistory), None)
    }
}

impl ContextAssembler {
    pub fn new(policy: Box<dyn WindowPolicy>, system_prompt: Option<String>) -> Self {
        Self {
            policy,
            system_prompt: system_prompt.filter(|s| !s.trim().is_empty()),
        }
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Ordered prompt turns for `pending`, given the conversation ledger.
    ///
    /// When the pending turn is persisted, the ledger is cut at its entry so
    /// that neither the turn itself nor anything appended after it (by
    /// concurrent exchanges) leaks into this window.
    pub fn assemble(&self, history: &[ChatMessage], pending: &PendingTurn) -> Vec<PromptTurn> {
        let prior = match pending.message_id {
            Some(id) => history
                .iter()
                .position(|m| m.id == id)
                .map_or(history, |idx| &history[..idx]),
            None => history,
        };

        let mut turns: Vec<PromptTurn> = prior.iter().filter_map(to_turn).collect();
        turns.push(PromptTurn::user(pending.content.clone()));
        self.policy.apply(turns)
    }

    /// Assemble and wrap in a request, adding the system prompt if any.
    pub fn build_request(&self, history: &[ChatMessage], pending: &PendingTurn) -> GenerationRequest {
        GenerationRequest {
            turns: self.assemble(history, pending),
            system: self.system_prompt.clone(),
        }
    }
}

/// Role mapping. `None` for assistant rows that never became model output.
fn to_turn(message: &ChatMessage) -> Option<PromptTurn> {
    match message.role {
        MessageRole::User => Some(PromptTurn::user(message.content.clone())),
        MessageRole::Assistant if message.status == MessageStatus::Completed => {
            Some(PromptTurn::model(message.content.clone()))
        }
        MessageRole::Assistant => None,
    }
}
