//! Stage definitions for the grant proposal interview.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WizardError;

/// A check a stage's input must pass before the wizard moves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationRule {
    /// The fact must be present and non-blank.
    Required(&'static str),
    /// Like `Required`, but only while fact `when.0` equals `when.1`.
    RequiredWhen {
        field: &'static str,
        when: (&'static str, &'static str),
    },
    /// The fact must be one of the listed values.
    OneOf {
        field: &'static str,
        options: &'static [&'static str],
    },
    /// At least one proposal section draft must be saved.
    AtLeastOneDraft,
}

/// One step of the interview.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDescriptor {
    pub id: &'static str,
    pub title: &'static str,
    /// Question shown to the user.
    pub prompt: &'static str,
    /// Facts this stage collects.
    pub fields: &'static [&'static str],
    pub rules: &'static [ValidationRule],
}

/// Data-dependent edge: leaving `from` goes to `to` when `field == value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRule {
    pub from: &'static str,
    pub field: &'static str,
    pub value: &'static str,
    pub to: &'static str,
}

/// Where the user is with their project idea.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    HasIdea,
    Brainstorm,
}

impl ProjectStatus {
    pub const OPTIONS: &'static [&'static str] = &["has_idea", "brainstorm"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HasIdea => "has_idea",
            Self::Brainstorm => "brainstorm",
        }
    }
}

/// Sections of a grant proposal the user can draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalSection {
    ExecutiveSummary,
    ProblemStatement,
    Objectives,
    Methodology,
    Budget,
    ImpactStory,
    Sustainability,
}

impl ProposalSection {
    pub const ALL: [ProposalSection; 7] = [
        Self::ExecutiveSummary,
        Self::ProblemStatement,
        Self::Objectives,
        Self::Methodology,
        Self::Budget,
        Self::ImpactStory,
        Self::Sustainability,
    ];

    /// Key under which drafts are stored.
    pub fn key(&self) -> &'static str {
        match self {
            Self::ExecutiveSummary => "executive_summary",
            Self::ProblemStatement => "problem_statement",
            Self::Objectives => "objectives",
            Self::Methodology => "methodology",
            Self::Budget => "budget",
            Self::ImpactStory => "impact_story",
            Self::Sustainability => "sustainability",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::ExecutiveSummary => "Executive Summary",
            Self::ProblemStatement => "Problem Statement",
            Self::Objectives => "Objectives",
            Self::Methodology => "Methodology",
            Self::Budget => "Budget",
            Self::ImpactStory => "Impact Story",
            Self::Sustainability => "Sustainability",
        }
    }

    /// What a good draft of this section covers.
    pub fn guidance(&self) -> &'static str {
        match self {
            Self::ExecutiveSummary => {
                "One page at most: who we are, the need, what we will do, what it costs, and the change it creates."
            }
            Self::ProblemStatement => {
                "Describe the need with evidence, who is affected, and why now. Mark any statistic that needs a source."
            }
            Self::Objectives => {
                "List 3-5 specific, measurable, time-bound objectives tied to the problem."
            }
            Self::Methodology => {
                "Explain activities, timeline, staffing, and how each activity serves an objective."
            }
            Self::Budget => {
                "Itemize personnel, direct costs, and overhead with a justification for each line. Totals must add up."
            }
            Self::ImpactStory => {
                "Tell a short, concrete story of one beneficiary, then connect it to measurable outcomes."
            }
            Self::Sustainability => {
                "Explain how the work continues after the grant: other funding, partnerships, earned income."
            }
        }
    }
}

impl std::fmt::Display for ProposalSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title())
    }
}

impl FromStr for ProposalSection {
    type Err = WizardError;

    /// Accepts the storage key or the title, in any case, with spaces,
    /// dashes or underscores.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();
        Self::ALL
            .into_iter()
            .find(|section| section.key() == normalized)
            .ok_or_else(|| WizardError::ValidationFailed {
                stage: "drafting".to_string(),
                reason: format!(
                    "unknown section '{}', expected one of: {}",
                    s.trim(),
                    Self::ALL.map(|s| s.key()).join(", ")
                ),
            })
    }
}

pub static GRANT_PROPOSAL_STAGES: &[StageDescriptor] = &[
    StageDescriptor {
        id: "profile",
        title: "About you",
        prompt: "What's your name?",
        fields: &["name"],
        rules: &[ValidationRule::Required("name")],
    },
    StageDescriptor {
        id: "organization",
        title: "Your organization",
        prompt: "Which organization are you writing for, and what is its mission?",
        fields: &["organization", "mission"],
        rules: &[ValidationRule::Required("mission")],
    },
    StageDescriptor {
        id: "project_status",
        title: "Project status",
        prompt: "Do you already have a project idea (has_idea), or should we brainstorm one (brainstorm)?",
        fields: &["project_status"],
        rules: &[ValidationRule::OneOf {
            field: "project_status",
            options: ProjectStatus::OPTIONS,
        }],
    },
    StageDescriptor {
        id: "brainstorm",
        title: "Brainstorm",
        prompt: "Use /brainstorm for ideas, then tell me the idea you want to pursue.",
        fields: &["idea"],
        rules: &[ValidationRule::RequiredWhen {
            field: "idea",
            when: ("project_status", "brainstorm"),
        }],
    },
    StageDescriptor {
        id: "project",
        title: "Project details",
        prompt: "What is the project called? Add the funder, amount requested, and timeline if you know them.",
        fields: &["project_title", "funder", "amount", "timeline"],
        rules: &[ValidationRule::Required("project_title")],
    },
    StageDescriptor {
        id: "drafting",
        title: "Drafting",
        prompt: "Draft sections with /draft <section> and keep the ones you like with /save <section>.",
        fields: &[],
        rules: &[ValidationRule::AtLeastOneDraft],
    },
    StageDescriptor {
        id: "review",
        title: "Review",
        prompt: "Your saved sections are ready to review. Keep refining them in chat.",
        fields: &[],
        rules: &[],
    },
];

/// Default routing out of the project status stage.
pub fn grant_proposal_branches() -> Vec<BranchRule> {
    vec![
        BranchRule {
            from: "project_status",
            field: "project_status",
            value: ProjectStatus::Brainstorm.as_str(),
            to: "brainstorm",
        },
        BranchRule {
            from: "project_status",
            field: "project_status",
            value: ProjectStatus::HasIdea.as_str(),
            to: "project",
        },
    ]
}
