//! Guided grant proposal interview.
//!
//! A fixed list of stages, each gated by validation rules, with one
//! data-dependent branch after the project status question. Facts collected
//! here prime the drafting prompts sent through the chat session.

pub mod prompts;
pub mod stages;
pub mod state;

pub use stages::{ProjectStatus, ProposalSection, StageDescriptor};
pub use state::{StageInput, StageMachine, WizardState};
