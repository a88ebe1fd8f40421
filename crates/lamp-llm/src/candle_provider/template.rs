use crate::provider::{Message, Role};

/// Prompt formats understood by the local generation backend.
///
/// The rendered prompt always ends with the assistant turn opener so the
/// model continues as the assistant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChatTemplate {
    #[default]
    Zephyr,
    Llama3,
    ChatML,
    Mistral,
    Phi3,
    Raw,
}

impl ChatTemplate {
    #[must_use]
    pub fn parse_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "zephyr" => Self::Zephyr,
            "llama3" | "llama" => Self::Llama3,
            "chatml" | "chat-ml" => Self::ChatML,
            "mistral" => Self::Mistral,
            "phi3" | "phi" => Self::Phi3,
            _ => Self::Raw,
        }
    }

    #[must_use]
    pub fn format(&self, messages: &[Message]) -> String {
        match self {
            Self::Zephyr => tagged(
                messages,
                |role| format!("<|{}|>\n", role_tag(role)),
                "</s>\n",
                "<|assistant|>\n",
            ),
            Self::Llama3 => {
                let mut out = String::from("<|begin_of_text|>");
                out.push_str(&tagged(
                    messages,
                    |role| format!("<|start_header_id|>{}<|end_header_id|>\n\n", role_tag(role)),
                    "<|eot_id|>",
                    "<|start_header_id|>assistant<|end_header_id|>\n\n",
                ));
                out
            }
            Self::ChatML => tagged(
                messages,
                |role| format!("<|im_start|>{}\n", role_tag(role)),
                "<|im_end|>\n",
                "<|im_start|>assistant\n",
            ),
            Self::Phi3 => tagged(
                messages,
                |role| format!("<|{}|>\n", role_tag(role)),
                "<|end|>\n",
                "<|assistant|>\n",
            ),
            Self::Mistral => format_mistral(messages),
            Self::Raw => messages
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

fn role_tag(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn tagged(
    messages: &[Message],
    open: impl Fn(Role) -> String,
    close: &str,
    assistant_open: &str,
) -> String {
    let mut out = String::new();
    for msg in messages {
        out.push_str(&open(msg.role));
        out.push_str(&msg.content);
        out.push_str(close);
    }
    out.push_str(assistant_open);
    out
}

// Mistral has no system role; system text is folded into the next user turn.
fn format_mistral(messages: &[Message]) -> String {
    let mut out = String::new();
    let mut pending_system = String::new();

    for msg in messages {
        match msg.role {
            Role::System => {
                if !pending_system.is_empty() {
                    pending_system.push('\n');
                }
                pending_system.push_str(&msg.content);
            }
            Role::User => {
                out.push_str("[INST] ");
                if !pending_system.is_empty() {
                    out.push_str(&pending_system);
                    out.push_str("\n\n");
                    pending_system.clear();
                }
                out.push_str(&msg.content);
                out.push_str(" [/INST]");
            }
            Role::Assistant => {
                out.push_str(&msg.content);
                out.push_str("</s>");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation() -> Vec<Message> {
        vec![
            Message::system("Answer from the documents."),
            Message::user("What lowers glucose?"),
        ]
    }

    #[test]
    fn zephyr_is_default() {
        assert_eq!(ChatTemplate::default(), ChatTemplate::Zephyr);
    }

    #[test]
    fn zephyr_template() {
        let out = ChatTemplate::Zephyr.format(&conversation());
        assert_eq!(
            out,
            "<|system|>\nAnswer from the documents.</s>\n<|user|>\nWhat lowers glucose?</s>\n<|assistant|>\n"
        );
    }

    #[test]
    fn llama3_template() {
        let out = ChatTemplate::Llama3.format(&conversation());
        assert!(out.starts_with("<|begin_of_text|><|start_header_id|>system<|end_header_id|>\n\n"));
        assert!(out.contains("What lowers glucose?<|eot_id|>"));
        assert!(out.ends_with("<|start_header_id|>assistant<|end_header_id|>\n\n"));
    }

    #[test]
    fn chatml_template() {
        let out = ChatTemplate::ChatML.format(&conversation());
        assert!(out.contains("<|im_start|>user\nWhat lowers glucose?<|im_end|>\n"));
        assert!(out.ends_with("<|im_start|>assistant\n"));
    }

    #[test]
    fn mistral_folds_system_into_user_turn() {
        let out = ChatTemplate::Mistral.format(&conversation());
        assert_eq!(out, "[INST] Answer from the documents.\n\nWhat lowers glucose? [/INST]");
    }

    #[test]
    fn phi3_template() {
        let out = ChatTemplate::Phi3.format(&conversation());
        assert!(out.contains("<|system|>\nAnswer from the documents.<|end|>\n"));
        assert!(out.ends_with("<|assistant|>\n"));
    }

    #[test]
    fn raw_joins_contents() {
        let out = ChatTemplate::Raw.format(&conversation());
        assert_eq!(out, "Answer from the documents.\nWhat lowers glucose?");
    }

    #[test]
    fn parse_names() {
        assert_eq!(ChatTemplate::parse_str("Zephyr"), ChatTemplate::Zephyr);
        assert_eq!(ChatTemplate::parse_str("llama"), ChatTemplate::Llama3);
        assert_eq!(ChatTemplate::parse_str("chat-ml"), ChatTemplate::ChatML);
        assert_eq!(ChatTemplate::parse_str("phi"), ChatTemplate::Phi3);
        assert_eq!(ChatTemplate::parse_str("whatever"), ChatTemplate::Raw);
    }
}
