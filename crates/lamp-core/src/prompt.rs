//! Prompt assembly: numbered context block plus a two-turn instruction template.

use std::fmt::Write as _;

use lamp_llm::provider::Message;
use serde::{Deserialize, Serialize};

use crate::types::RetrievedCandidate;

const SHARED_GUIDANCE: &str = "Answer in terms the average person with no technical background can easily understand. \
Provide the number of the source document when relevant.";

const CONTEXT_HEADER: &str = "Context\n{context}\n---\nNow here is the question you need to answer.\n\n";

/// Built-in instruction templates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptPreset {
    #[default]
    QuestionAnswering,
    FutureResearch,
    Implications,
    ComparativeAnalysis,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    pub system: String,
    /// Must contain `{context}` and `{question}`.
    pub user: String,
}

impl PromptTemplate {
    #[must_use]
    pub fn preset(preset: PromptPreset) -> Self {
        let (task, question, fallback) = match preset {
            PromptPreset::QuestionAnswering => (
                "give a comprehensive answer to the question. \
                 Respond only to the question asked, response should be concise and relevant to the question.",
                "Question: {question}",
                "answer the question",
            ),
            PromptPreset::FutureResearch => (
                "suggest potential future research directions. \
                 Identify gaps in the current research and propose areas where additional studies could be beneficial.",
                "Question: Based on the above context, what are potential areas for future research related to {question}?",
                "suggest future research directions",
            ),
            PromptPreset::Implications => (
                "discuss the broader implications and potential real-world applications of the research findings.",
                "Question: Based on the above context, what are the broader implications and potential \
                 real-world applications of the research findings related to {question}?",
                "discuss the implications",
            ),
            PromptPreset::ComparativeAnalysis => (
                "compare the research findings with related studies or existing knowledge. \
                 Highlight similarities, differences, and any new insights provided by the current research.",
                "Question: Based on the above context, how do the research findings compare with related \
                 studies or existing knowledge related to {question}?",
                "compare the research findings",
            ),
        };
        Self {
            system: format!(
                "Using the information contained in the context, {task} {SHARED_GUIDANCE} \
                 If this cannot be deduced from the context, tell the user that there is nothing \
                 within the context that can be used to {fallback}."
            ),
            user: format!("{CONTEXT_HEADER}{question}"),
        }
    }

    /// Preset with optional per-turn overrides.
    #[must_use]
    pub fn with_overrides(preset: PromptPreset, system: Option<&str>, user: Option<&str>) -> Self {
        let mut template = Self::preset(preset);
        if let Some(system) = system {
            system.clone_into(&mut template.system);
        }
        if let Some(user) = user {
            user.clone_into(&mut template.user);
        }
        template
    }

    /// Fill the template with the numbered candidates and the question.
    ///
    /// Candidate order is the document numbering the model sees, so answers
    /// citing "Document 2" refer to the second candidate.
    #[must_use]
    pub fn assemble(&self, question: &str, candidates: &[RetrievedCandidate]) -> Vec<Message> {
        let context = build_context(candidates);
        let user = fill_placeholders(&self.user, &context, question);
        vec![Message::system(self.system.clone()), Message::user(user)]
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::preset(PromptPreset::default())
    }
}

/// Substitute `{context}` and `{question}` in a single left-to-right pass over
/// the template, so placeholder text inside either value is left untouched.
fn fill_placeholders(template: &str, context: &str, question: &str) -> String {
    const CONTEXT: &str = "{context}";
    const QUESTION: &str = "{question}";

    let mut out = String::with_capacity(template.len() + context.len() + question.len());
    let mut rest = template;
    while let Some(pos) = rest.find('{') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if let Some(after) = tail.strip_prefix(CONTEXT) {
            out.push_str(context);
            rest = after;
        } else if let Some(after) = tail.strip_prefix(QUESTION) {
            out.push_str(question);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

#[must_use]
pub fn build_context(candidates: &[RetrievedCandidate]) -> String {
    let mut context = String::from("\nExtracted documents:\n");
    for (i, candidate) in candidates.iter().enumerate() {
        let _ = write!(context, "Document {}:::\n{}\n", i + 1, candidate.content);
    }
    context
}

#[cfg(test)]
mod tests {
    use lamp_llm::provider::Role;

    use super::*;

    fn candidate(content: &str) -> RetrievedCandidate {
        RetrievedCandidate {
            content: content.into(),
            source: "s".into(),
            score: 0.5,
        }
    }

    #[test]
    fn context_numbers_documents_in_order() {
        let context = build_context(&[candidate("first"), candidate("second")]);
        assert_eq!(
            context,
            "\nExtracted documents:\nDocument 1:::\nfirst\nDocument 2:::\nsecond\n"
        );
    }

    #[test]
    fn assemble_produces_system_then_user() {
        let messages = PromptTemplate::default().assemble("Why?", &[candidate("Because.")]);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::User);
        assert!(messages[1].content.contains("Document 1:::\nBecause."));
        assert!(messages[1].content.ends_with("Question: Why?"));
        assert!(!messages[1].content.contains("{context}"));
    }

    #[test]
    fn every_preset_has_both_placeholders() {
        for preset in [
            PromptPreset::QuestionAnswering,
            PromptPreset::FutureResearch,
            PromptPreset::Implications,
            PromptPreset::ComparativeAnalysis,
        ] {
            let t = PromptTemplate::preset(preset);
            assert!(t.user.contains("{context}"), "{preset:?}");
            assert!(t.user.contains("{question}"), "{preset:?}");
            assert!(t.system.starts_with("Using the information contained in the context"));
        }
    }

    #[test]
    fn placeholder_text_in_documents_is_not_expanded() {
        let messages = PromptTemplate::default().assemble("q", &[candidate("literal {question}")]);
        assert!(messages[1].content.contains("literal {question}"));
    }

    #[test]
    fn question_first_template_keeps_placeholders_apart() {
        let t = PromptTemplate::with_overrides(
            PromptPreset::QuestionAnswering,
            None,
            Some("Q: {question}\nContext: {context}"),
        );
        let messages = t.assemble("what is {context}?", &[candidate("DOC")]);
        assert_eq!(
            messages[1].content,
            "Q: what is {context}?\nContext: \nExtracted documents:\nDocument 1:::\nDOC\n"
        );
    }

    #[test]
    fn unknown_braces_pass_through() {
        assert_eq!(fill_placeholders("{x} {question} {", "c", "q"), "{x} q {");
    }

    #[test]
    fn overrides_replace_turns() {
        let t = PromptTemplate::with_overrides(
            PromptPreset::Implications,
            Some("sys"),
            Some("{context} => {question}"),
        );
        let messages = t.assemble("q", &[]);
        assert_eq!(messages[0].content, "sys");
        assert_eq!(messages[1].content, "\nExtracted documents:\n => q");
    }

    #[test]
    fn preset_names_deserialize() {
        let p: PromptPreset = serde_json::from_str("\"comparative_analysis\"").unwrap();
        assert_eq!(p, PromptPreset::ComparativeAnalysis);
    }
}
