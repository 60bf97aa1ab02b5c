use crate::agent::Message;

pub const CONTEXT_PREAMBLE: &str = "Here is the context of new notebook cells that were added:\n";
pub const CONTEXT_ACK: &str = "I understand the new notebook context. How can I help?";

/// Prompt plus the history to send with it. `messages` is `None` when there
/// is nothing to add to a fresh conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct Composed {
    pub prompt: String,
    pub messages: Option<Vec<Message>>,
}

impl Composed {
    pub fn passthrough(prompt: &str, prior: Option<Vec<Message>>) -> Self {
        Self {
            prompt: prompt.to_string(),
            messages: prior,
        }
    }
}

/// Append the notebook window to the prior conversation as a context turn and
/// a fixed acknowledgement.
pub fn compose(prompt: &str, prior: Option<Vec<Message>>, window: &[String]) -> Composed {
    let prior = prior.filter(|p| !p.is_empty());
    if window.is_empty() && prior.is_none() {
        return Composed::passthrough(prompt, None);
    }

    let mut messages = prior.unwrap_or_default();
    if !window.is_empty() {
        messages.push(Message::user(format!("{CONTEXT_PREAMBLE}{}", window.join("\n\n"))));
        messages.push(Message::text(CONTEXT_ACK));
    }

    Composed {
        prompt: prompt.to_string(),
        messages: Some(messages),
    }
}
