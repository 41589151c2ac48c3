//! Interview state machine — stage pointer, collected facts, section drafts.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::stages::{
    BranchRule, GRANT_PROPOSAL_STAGES, ProposalSection, StageDescriptor, ValidationRule,
    grant_proposal_branches,
};
use crate::error::WizardError;

const MAX_TRANSITIONS: usize = 200;

/// How the stage pointer moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Advance,
    Retreat,
}

/// A recorded stage change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTransition {
    pub from: usize,
    pub to: usize,
    pub kind: TransitionKind,
    pub timestamp: DateTime<Utc>,
}

/// Interview progress for one user.
///
/// `stage_index` is the only thing navigation changes. Facts and drafts are
/// cleared only by [`StageMachine::reset`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WizardState {
    pub stage_index: usize,
    pub facts: BTreeMap<String, String>,
    pub section_drafts: BTreeMap<String, String>,
    #[serde(default)]
    pub transitions: Vec<StageTransition>,
}

impl WizardState {
    pub fn fact(&self, key: &str) -> Option<&str> {
        self.facts.get(key).map(String::as_str)
    }

    pub fn draft(&self, section: ProposalSection) -> Option<&str> {
        self.section_drafts.get(section.key()).map(String::as_str)
    }

    fn record(&mut self, from: usize, to: usize, kind: TransitionKind) {
        self.transitions.push(StageTransition {
            from,
            to,
            kind,
            timestamp: Utc::now(),
        });
        if self.transitions.len() > MAX_TRANSITIONS {
            let drain_count = self.transitions.len() - MAX_TRANSITIONS;
            self.transitions.drain(..drain_count);
        }
    }
}

/// Values submitted with an `advance`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageInput {
    pub facts: BTreeMap<String, String>,
    pub section_drafts: BTreeMap<String, String>,
}

impl StageInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fact(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.facts
            .insert(key.into(), value.into().trim().to_string());
        self
    }

    pub fn with_draft(mut self, section: ProposalSection, text: impl Into<String>) -> Self {
        self.section_drafts
            .insert(section.key().to_string(), text.into().trim().to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty() && self.section_drafts.is_empty()
    }
}

/// Sequences a fixed list of stages with validation gates and a branch table.
#[derive(Debug, Clone)]
pub struct StageMachine {
    stages: &'static [StageDescriptor],
    branches: Vec<BranchRule>,
}

impl StageMachine {
    /// Build a machine, checking that every branch names known stages.
    pub fn new(
        stages: &'static [StageDescriptor],
        branches: Vec<BranchRule>,
    ) -> Result<Self, WizardError> {
        if stages.is_empty() {
            return Err(WizardError::InvalidDefinition("no stages".to_string()));
        }
        for (i, stage) in stages.iter().enumerate() {
            if stages[..i].iter().any(|s| s.id == stage.id) {
                return Err(WizardError::InvalidDefinition(format!(
                    "duplicate stage id '{}'",
                    stage.id
                )));
            }
        }
        for rule in &branches {
            for id in [rule.from, rule.to] {
                if !stages.iter().any(|s| s.id == id) {
                    return Err(WizardError::InvalidDefinition(format!(
                        "branch refers to unknown stage '{id}'"
                    )));
                }
            }
        }
        Ok(Self { stages, branches })
    }

    /// The grant proposal interview with its default branch table.
    pub fn grant_proposal() -> Result<Self, WizardError> {
        Self::new(GRANT_PROPOSAL_STAGES, grant_proposal_branches())
    }

    pub fn stages(&self) -> &[StageDescriptor] {
        self.stages
    }

    fn last_index(&self) -> usize {
        self.stages.len() - 1
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.id == id)
    }

    pub fn current_stage(&self, state: &WizardState) -> &StageDescriptor {
        &self.stages[state.stage_index.min(self.last_index())]
    }

    pub fn is_terminal(&self, state: &WizardState) -> bool {
        state.stage_index >= self.last_index()
    }

    /// Successor of `stage_index` given the collected facts.
    ///
    /// A matching branch rule wins; otherwise the next index, clamped to the
    /// terminal stage.
    pub fn next(&self, stage_index: usize, facts: &BTreeMap<String, String>) -> usize {
        let current = stage_index.min(self.last_index());
        let id = self.stages[current].id;
        self.branches
            .iter()
            .filter(|rule| rule.from == id)
            .find(|rule| facts.get(rule.field).map(String::as_str) == Some(rule.value))
            .and_then(|rule| self.index_of(rule.to))
            .unwrap_or_else(|| (current + 1).min(self.last_index()))
    }

    /// Merge `input` and move to the successor stage if the current stage's
    /// rules pass. On failure the returned error names the stage and nothing
    /// changes. On the terminal stage this returns the state unchanged.
    pub fn advance(
        &self,
        state: &WizardState,
        input: StageInput,
    ) -> Result<WizardState, WizardError> {
        if self.is_terminal(state) {
            return Ok(state.clone());
        }

        let stage = self.current_stage(state);
        let mut candidate = state.clone();
        candidate.facts.extend(input.facts);
        candidate.section_drafts.extend(input.section_drafts);

        for rule in stage.rules {
            check_rule(rule, &candidate).map_err(|reason| {
                debug!(stage = stage.id, %reason, "Stage validation failed");
                WizardError::ValidationFailed {
                    stage: stage.id.to_string(),
                    reason,
                }
            })?;
        }

        let from = state.stage_index;
        let to = self.next(from, &candidate.facts);
        candidate.stage_index = to;
        candidate.record(from, to, TransitionKind::Advance);
        info!(from = stage.id, to = self.stages[to].id, "Stage advanced");
        Ok(candidate)
    }

    /// Step back one stage, clamped at the first. Facts and drafts are kept.
    pub fn retreat(&self, state: &WizardState) -> WizardState {
        let mut next = state.clone();
        let from = state.stage_index.min(self.last_index());
        if from == 0 {
            return next;
        }
        next.stage_index = from - 1;
        next.record(from, from - 1, TransitionKind::Retreat);
        debug!(from = self.stages[from].id, to = self.stages[from - 1].id, "Stage retreated");
        next
    }

    /// Store a section draft without moving the stage pointer.
    pub fn save_draft(
        &self,
        state: &WizardState,
        section: ProposalSection,
        text: &str,
    ) -> Result<WizardState, WizardError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(WizardError::ValidationFailed {
                stage: self.current_stage(state).id.to_string(),
                reason: format!("{section} draft is empty"),
            });
        }
        let mut next = state.clone();
        next.section_drafts
            .insert(section.key().to_string(), text.to_string());
        debug!(section = section.key(), chars = text.len(), "Draft saved");
        Ok(next)
    }

    /// Start over: first stage, no facts, no drafts.
    pub fn reset(&self) -> WizardState {
        info!("Wizard reset");
        WizardState::default()
    }
}

fn check_rule(rule: &ValidationRule, state: &WizardState) -> Result<(), String> {
    match rule {
        ValidationRule::Required(field) => match state.fact(field) {
            Some(value) if !value.trim().is_empty() => Ok(()),
            _ => Err(format!("{field} is required")),
        },
        ValidationRule::RequiredWhen {
            field,
            when: (when_field, when_value),
        } => {
            if state.fact(when_field) != Some(*when_value) {
                return Ok(());
            }
            check_rule(&ValidationRule::Required(*field), state)
                .map_err(|reason| format!("{reason} when {when_field} is {when_value}"))
        }
        ValidationRule::OneOf { field, options } => match state.fact(field) {
            Some(value) if options.iter().any(|o| *o == value) => Ok(()),
            Some(value) => Err(format!(
                "{field} must be one of {}, got '{value}'",
                options.join(", ")
            )),
            None => Err(format!("{field} must be one of {}", options.join(", "))),
        },
        ValidationRule::AtLeastOneDraft => {
            if state.section_drafts.values().any(|d| !d.trim().is_empty()) {
                Ok(())
            } else {
                Err("save at least one proposal section first".to_string())
            }
        }
    }
}
