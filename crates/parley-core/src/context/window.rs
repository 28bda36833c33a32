//! Window policies: strategies that bound the turns sent to the generator.
//!
//! A policy receives the full, ordered candidate turns (the pending request
//! turn is always last) and returns a suffix of them. Policies never reorder
//! and never touch the final turn.

use std::fmt::Debug;

use parley_types::config::ContextConfig;
use parley_types::llm::{PromptTurn, TurnRole};

/// Strategy for bounding the context window.
pub trait WindowPolicy: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    fn apply(&self, turns: Vec<PromptTurn>) -> Vec<PromptTurn>;
}

/// Replay the whole history. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullHistory;

impl WindowPolicy for FullHistory {
    fn name(&self) -> &'static str {
        "full_history"
    }

    fn apply(&self, turns: Vec<PromptTurn>) -> Vec<PromptTurn> {
        turns
    }
}

/// Keep at most `max_turns` turns, counted from the end.
#[derive(Debug, Clone, Copy)]
pub struct LastTurns {
    pub max_turns: usize,
}

impl WindowPolicy for LastTurns {
    fn name(&self) -> &'static str {
        "last_turns"
    }

    fn apply(&self, turns: Vec<PromptTurn>) -> Vec<PromptTurn> {
        let keep = self.max_turns.max(1);
        if turns.len() <= keep {
            return turns;
        }
        let start = turns.len() - keep;
        trim_leading_model_turns(turns.into_iter().skip(start).collect())
    }
}

/// Keep the newest turns whose estimated size fits `max_tokens`.
///
/// Token counts are estimated at ~4 chars per token. The final turn is kept
/// even when it alone exceeds the budget.
#[derive(Debug, Clone, Copy)]
pub struct TokenBudgetWindow {
    pub max_tokens: u32,
}

impl TokenBudgetWindow {
    pub fn estimate_tokens(turn: &PromptTurn) -> u32 {
        let chars = turn.content.chars().count();
        (chars.div_ceil(4)).max(1) as u32
    }
}

impl WindowPolicy for TokenBudgetWindow {
    fn name(&self) -> &'static str {
        "token_budget"
    }

    fn apply(&self, turns: Vec<PromptTurn>) -> Vec<PromptTurn> {
        let mut used: u32 = 0;
        let mut start = turns.len();
        for (idx, turn) in turns.iter().enumerate().rev() {
            let cost = Self::estimate_tokens(turn);
            if start != turns.len() && used.saturating_add(cost) > self.max_tokens {
                break;
            }
            used = used.saturating_add(cost);
            start = idx;
        }
        if start == 0 {
            return turns;
        }
        trim_leading_model_turns(turns.into_iter().skip(start).collect())
    }
}

/// Several policies applied in order, each narrowing the previous result.
#[derive(Debug, Default)]
pub struct Layered {
    layers: Vec<Box<dyn WindowPolicy>>,
}

impl Layered {
    pub fn new(layers: Vec<Box<dyn WindowPolicy>>) -> Self {
        Self { layers }
    }
}

impl WindowPolicy for Layered {
    fn name(&self) -> &'static str {
        "layered"
    }

    fn apply(&self, turns: Vec<PromptTurn>) -> Vec<PromptTurn> {
        self.layers
            .iter()
            .fold(turns, |turns, layer| layer.apply(turns))
    }
}

/// A truncated window must open with a request turn.
fn trim_leading_model_turns(mut turns: Vec<PromptTurn>) -> Vec<PromptTurn> {
    let first_user = turns
        .iter()
        .position(|t| t.role == TurnRole::User)
        .unwrap_or(turns.len().saturating_sub(1));
    turns.drain(..first_user);
    turns
}

/// Build the policy described by the `[context]` config section.
pub fn window_policy_from_config(config: &ContextConfig) -> Box<dyn WindowPolicy> {
    let mut layers: Vec<Box<dyn WindowPolicy>> = Vec::new();
    if let Some(max_turns) = config.max_turns {
        layers.push(Box::new(LastTurns { max_turns }));
    }
    if let Some(max_tokens) = config.max_tokens {
        layers.push(Box::new(TokenBudgetWindow { max_tokens }));
    }
    match layers.len() {
        0 => Box::new(FullHistory),
        1 => layers.remove(0),
        _ => Box::new(Layered::new(layers)),
    }
}
