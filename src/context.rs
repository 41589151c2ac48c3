//! Seed context for new chat sessions.
//!
//! The provider has no system role, so the instructions and any uploaded
//! document are injected as leading user/assistant pairs. The seed block is
//! always 2 turns without a document and 4 with one.

use crate::session::transcript::Role;

/// Acknowledgment paired with the instructions turn.
pub const INSTRUCTIONS_ACK: &str = "Understood. I will follow these instructions.";

/// Acknowledgment paired with the document turn.
pub const DOCUMENT_ACK: &str = "Acknowledged PDF content.";

/// Built-in instructions used when no instructions file can be read.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are Grantbuddy, an advanced AI assistant specializing in proposal writing, budgeting, \
and impact storytelling for non-profits and community organizations.

Guidelines:
- Ask for missing background (organization, funder, amount, timeline) before drafting.
- Write in clear, funder-facing language; avoid jargon unless the user uses it.
- Keep budgets internally consistent and show totals.
- Tell impact stories with concrete beneficiaries, numbers, and outcomes.
- Never invent statistics; mark anything that needs verification.";

/// Build the ordered seed turns for a new session.
pub fn seed_turns(system_prompt: &str, document_text: Option<&str>) -> Vec<(Role, String)> {
    let mut seed = vec![
        (Role::System, format!("System: {system_prompt}")),
        (Role::Assistant, INSTRUCTIONS_ACK.to_string()),
    ];

    if let Some(document) = document_text {
        seed.push((
            Role::User,
            format!("PDF content for reference:\n\n{document}"),
        ));
        seed.push((Role::Assistant, DOCUMENT_ACK.to_string()));
    }

    seed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_turns_without_document() {
        let seed = seed_turns("Be kind.", None);
        assert_eq!(seed.len(), 2);
        assert_eq!(seed[0], (Role::System, "System: Be kind.".to_string()));
        assert_eq!(seed[1], (Role::Assistant, INSTRUCTIONS_ACK.to_string()));
    }

    #[test]
    fn four_turns_with_document() {
        let seed = seed_turns("Be kind.", Some("Annual report 2023"));
        assert_eq!(seed.len(), 4);
        assert_eq!(seed[2].0, Role::User);
        assert!(seed[2].1.ends_with("Annual report 2023"));
        assert_eq!(seed[3], (Role::Assistant, DOCUMENT_ACK.to_string()));
    }

    #[test]
    fn seed_is_deterministic() {
        assert_eq!(seed_turns("p", Some("d")), seed_turns("p", Some("d")));
        assert_eq!(seed_turns("p", None), seed_turns("p", None));
    }

    #[test]
    fn empty_document_still_counts_as_document() {
        // Callers decide whether an empty upload is a document; the builder
        // only looks at presence.
        assert_eq!(seed_turns("p", Some("")).len(), 4);
    }
}
