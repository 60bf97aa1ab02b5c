use crate::JuiceError;
use serde::{Deserialize, Serialize};

/// One turn of a conversation: what was sent to the model, or what it answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "parts", rename_all = "snake_case")]
pub enum Message {
    Request(Vec<RequestPart>),
    Response(Vec<ResponsePart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "part_kind", rename_all = "snake_case")]
pub enum RequestPart {
    SystemPrompt { content: String },
    UserPrompt { content: String },
    ToolReturn { tool_call_id: String, tool_name: String, content: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "part_kind", rename_all = "snake_case")]
pub enum ResponsePart {
    Text { content: String },
    ToolCall { tool_call_id: String, tool_name: String, args: String },
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Message::Request(vec![RequestPart::UserPrompt { content: content.into() }])
    }

    pub fn system(content: impl Into<String>) -> Self {
        Message::Request(vec![RequestPart::SystemPrompt { content: content.into() }])
    }

    pub fn text(content: impl Into<String>) -> Self {
        Message::Response(vec![ResponsePart::Text { content: content.into() }])
    }

    /// Concatenated text parts of a response; empty for requests.
    pub fn response_text(&self) -> String {
        match self {
            Message::Request(_) => String::new(),
            Message::Response(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ResponsePart::Text { content } => Some(content.as_str()),
                    ResponsePart::ToolCall { .. } => None,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NewCellType {
    Code,
    Markdown,
}

impl std::fmt::Display for NewCellType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NewCellType::Code => f.write_str("code"),
            NewCellType::Markdown => f.write_str("markdown"),
        }
    }
}

/// A cell the agent asked the host to create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCell {
    pub cell_type: NewCellType,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Final text answer.
    pub output: String,
    /// Every message of the run, prior history included.
    pub messages: Vec<Message>,
    #[serde(default)]
    pub new_cells: Vec<NewCell>,
}

/// Anything that can seed the next run with a prior conversation.
pub trait MessageHistory {
    fn extract_prior_messages(&self) -> Option<Vec<Message>>;
}

impl MessageHistory for RunResult {
    fn extract_prior_messages(&self) -> Option<Vec<Message>> {
        Some(self.messages.clone())
    }
}

impl MessageHistory for Vec<Message> {
    fn extract_prior_messages(&self) -> Option<Vec<Message>> {
        Some(self.clone())
    }
}

/// A conversational agent. One blocking call per prompt.
pub trait Agent {
    fn run(&self, prompt: &str, history: Option<&[Message]>) -> Result<RunResult, JuiceError>;
}

impl<A: Agent + ?Sized> Agent for Box<A> {
    fn run(&self, prompt: &str, history: Option<&[Message]>) -> Result<RunResult, JuiceError> {
        (**self).run(prompt, history)
    }
}

pub fn system_prompt() -> String {
    format!(
        "You are a helpful assistant that operates in a Jupyter notebook.\n\
         Your regular text responses are rendered as cell output.\n\
         You can create new cells, edit existing cells, and run code.\n\
         You can also use tools to help you with your tasks.\n\
         Today's date is {}.",
        today()
    )
}

fn today() -> String {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;
    let (y, m, d) = days_to_ymd(secs / 86400);
    format!("{y:04}-{m:02}-{d:02}")
}

fn days_to_ymd(days: i64) -> (i64, u32, u32) {
    // http://howardhinnant.github.io/date_algorithms.html
    let z = days + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u32;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    (y, m, d)
}

/// Start of a run: prior history, or a fresh conversation opened with the
/// system prompt. The user's prompt is appended last.
pub fn opening_messages(prompt: &str, history: Option<&[Message]>) -> Vec<Message> {
    let mut messages = match history {
        Some(h) if !h.is_empty() => h.to_vec(),
        _ => vec![Message::system(system_prompt())],
    };
    messages.push(Message::user(prompt));
    messages
}

/// Offline agent that answers with the prompt it received.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoAgent;

impl Agent for EchoAgent {
    fn run(&self, prompt: &str, history: Option<&[Message]>) -> Result<RunResult, JuiceError> {
        let prior = history.map_or(0, <[Message]>::len);
        let output = format!("echo: {prompt} ({prior} prior messages)");
        let mut messages = opening_messages(prompt, history);
        messages.push(Message::text(output.clone()));
        Ok(RunResult {
            output,
            messages,
            new_cells: Vec::new(),
        })
    }
}
