//! Chat prompts primed with what the interview has collected.

use super::stages::ProposalSection;
use super::state::WizardState;

/// Human-readable labels for known fact keys.
fn label(key: &str) -> String {
    match key {
        "name" => "Writer".to_string(),
        "organization" => "Organization".to_string(),
        "mission" => "Mission".to_string(),
        "project_status" => "Project status".to_string(),
        "idea" => "Project idea".to_string(),
        "project_title" => "Project title".to_string(),
        "funder" => "Funder".to_string(),
        "amount" => "Amount requested".to_string(),
        "timeline" => "Timeline".to_string(),
        other => other.replace('_', " "),
    }
}

/// Render the collected facts as a bullet list, or `None` if there are none.
pub fn facts_section(state: &WizardState) -> Option<String> {
    let lines: Vec<String> = state
        .facts
        .iter()
        .filter(|(_, value)| !value.trim().is_empty())
        .map(|(key, value)| format!("- {}: {}", label(key), value.trim()))
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(format!("What I know so far:\n{}", lines.join("\n")))
    }
}

fn with_facts(state: &WizardState, request: String) -> String {
    match facts_section(state) {
        Some(facts) => format!("{facts}\n\n{request}"),
        None => request,
    }
}

/// Ask for project ideas that fit the organization.
pub fn brainstorm_prompt(state: &WizardState) -> String {
    let request = "\
Suggest 3 grant-fundable project ideas that fit this organization's mission. \
For each, give a one-line title, the community need it addresses, and the kind of funder \
likely to support it. Keep each idea to 3 sentences."
        .to_string();
    with_facts(state, request)
}

/// Ask for a draft (or a revision) of one proposal section.
pub fn section_prompt(state: &WizardState, section: ProposalSection) -> String {
    let mut request = format!(
        "Draft the {} section of the grant proposal.\n{}",
        section.title(),
        section.guidance()
    );
    if let Some(previous) = state.draft(section) {
        request.push_str(&format!(
            "\n\nRevise and improve this saved version:\n---\n{previous}\n---"
        ));
    }
    with_facts(state, request)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> WizardState {
        let mut state = WizardState::default();
        state.facts.insert("name".into(), "Amina".into());
        state
            .facts
            .insert("mission".into(), "Educate girls in Kano".into());
        state
    }

    #[test]
    fn facts_render_with_labels() {
        let facts = facts_section(&state()).unwrap();
        assert!(facts.contains("- Writer: Amina"));
        assert!(facts.contains("- Mission: Educate girls in Kano"));
    }

    #[test]
    fn no_facts_no_section() {
        assert!(facts_section(&WizardState::default()).is_none());
        assert!(!brainstorm_prompt(&WizardState::default()).contains("What I know"));
    }

    #[test]
    fn section_prompt_includes_saved_draft() {
        let mut state = state();
        let first = section_prompt(&state, ProposalSection::Budget);
        assert!(first.contains("Draft the Budget section"));
        assert!(!first.contains("Revise"));

        state
            .section_drafts
            .insert("budget".into(), "Total: $50,000".into());
        let revision = section_prompt(&state, ProposalSection::Budget);
        assert!(revision.contains("Revise and improve"));
        assert!(revision.contains("Total: $50,000"));
    }

    #[test]
    fn brainstorm_prompt_carries_mission() {
        let prompt = brainstorm_prompt(&state());
        assert!(prompt.contains("Educate girls in Kano"));
        assert!(prompt.contains("3 grant-fundable project ideas"));
    }
}
