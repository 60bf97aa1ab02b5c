use crate::agent::{
    opening_messages, Agent, Message, NewCell, NewCellType, RequestPart, ResponsePart, RunResult,
};
use crate::config::AgentConfig;
use crate::JuiceError;
use serde::Deserialize;
use serde_json::{json, Value};

/// Model replies that still request tools after this many round trips fail the run.
const MAX_ROUND_TRIPS: usize = 8;

const CREATE_CELL: &str = "create_cell";

/// Sends one chat-completions request body and returns the decoded response.
pub trait Transport {
    fn post(&self, body: &Value) -> Result<Value, JuiceError>;
}

pub struct HttpTransport {
    endpoint: String,
    api_key: Option<String>,
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(config: &AgentConfig) -> Self {
        let agent = ureq::Agent::new_with_config(
            ureq::config::Config::builder()
                .timeout_global(Some(std::time::Duration::from_secs(config.timeout_secs)))
                .build(),
        );
        let api_key = std::env::var(&config.api_key_env).ok().filter(|k| !k.is_empty());
        if api_key.is_none() {
            log::debug!("{} not set, sending requests without authorization", config.api_key_env);
        }
        Self {
            endpoint: config.endpoint.clone(),
            api_key,
            agent,
        }
    }
}

impl Transport for HttpTransport {
    fn post(&self, body: &Value) -> Result<Value, JuiceError> {
        let mut req = self.agent.post(self.endpoint.as_str());
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }
        let resp: Value = req
            .send_json(body)
            .map_err(|e| JuiceError::Agent(format!("chat request: {e}")))?
            .body_mut()
            .read_json()
            .map_err(|e| JuiceError::Agent(format!("chat response: {e}")))?;
        Ok(resp)
    }
}

/// Agent backed by an OpenAI-compatible chat completions endpoint, with the
/// `create_cell` tool available to the model.
pub struct ChatCompletionsAgent<T: Transport = HttpTransport> {
    model: String,
    transport: T,
}

impl ChatCompletionsAgent<HttpTransport> {
    pub fn new(model: impl Into<String>, config: &AgentConfig) -> Self {
        Self::with_transport(model, HttpTransport::new(config))
    }
}

impl<T: Transport> ChatCompletionsAgent<T> {
    pub fn with_transport(model: impl Into<String>, transport: T) -> Self {
        Self {
            model: model.into(),
            transport,
        }
    }

    fn request_body(&self, messages: &[Message]) -> Value {
        json!({
            "model": self.model,
            "messages": wire_messages(messages),
            "tools": [create_cell_tool()],
        })
    }
}

impl<T: Transport> Agent for ChatCompletionsAgent<T> {
    fn run(&self, prompt: &str, history: Option<&[Message]>) -> Result<RunResult, JuiceError> {
        let mut messages = opening_messages(prompt, history);
        let mut new_cells = Vec::new();

        for _ in 0..MAX_ROUND_TRIPS {
            let resp = self.transport.post(&self.request_body(&messages))?;
            let reply = parse_reply(&resp)?;
            let calls: Vec<(String, String, String)> = match &reply {
                Message::Response(parts) => parts
                    .iter()
                    .filter_map(|p| match p {
                        ResponsePart::ToolCall { tool_call_id, tool_name, args } => {
                            Some((tool_call_id.clone(), tool_name.clone(), args.clone()))
                        }
                        ResponsePart::Text { .. } => None,
                    })
                    .collect(),
                Message::Request(_) => Vec::new(),
            };
            messages.push(reply);

            if calls.is_empty() {
                let output = messages.last().map(Message::response_text).unwrap_or_default();
                return Ok(RunResult {
                    output,
                    messages,
                    new_cells,
                });
            }

            let returns = calls
                .into_iter()
                .map(|(tool_call_id, tool_name, args)| {
                    let content = call_tool(&tool_name, &args, &mut new_cells);
                    RequestPart::ToolReturn {
                        tool_call_id,
                        tool_name,
                        content,
                    }
                })
                .collect();
            messages.push(Message::Request(returns));
        }

        Err(JuiceError::Agent(format!(
            "model still calling tools after {MAX_ROUND_TRIPS} round trips"
        )))
    }
}

#[derive(Deserialize)]
struct CreateCellArgs {
    content: String,
    #[serde(default = "default_cell_type")]
    cell_type: NewCellType,
}

fn default_cell_type() -> NewCellType {
    NewCellType::Code
}

/// Run a tool call and return the text reported back to the model.
fn call_tool(name: &str, args: &str, new_cells: &mut Vec<NewCell>) -> String {
    if name != CREATE_CELL {
        return format!("Unknown tool: {name}");
    }
    match serde_json::from_str::<CreateCellArgs>(args) {
        Ok(a) => {
            let reply = format!("Created new {} cell with content: {}", a.cell_type, a.content);
            new_cells.push(NewCell {
                cell_type: a.cell_type,
                content: a.content,
            });
            reply
        }
        Err(e) => format!("Invalid arguments for {CREATE_CELL}: {e}"),
    }
}

fn create_cell_tool() -> Value {
    json!({
        "type": "function",
        "function": {
            "name": CREATE_CELL,
            "description": "Create a new cell in the notebook with the specified content.",
            "parameters": {
                "type": "object",
                "properties": {
                    "content": {
                        "type": "string",
                        "description": "The content to put in the new cell"
                    },
                    "cell_type": {
                        "type": "string",
                        "enum": ["code", "markdown"],
                        "description": "Type of cell to create"
                    }
                },
                "required": ["content"]
            }
        }
    })
}

/// Conversation in chat-completions wire format. A request message may expand
/// to several wire messages; a response collapses to one assistant message.
pub fn wire_messages(messages: &[Message]) -> Vec<Value> {
    let mut out = Vec::new();
    for msg in messages {
        match msg {
            Message::Request(parts) => {
                for part in parts {
                    out.push(match part {
                        RequestPart::SystemPrompt { content } => {
                            json!({"role": "system", "content": content})
                        }
                        RequestPart::UserPrompt { content } => {
                            json!({"role": "user", "content": content})
                        }
                        RequestPart::ToolReturn {
                            tool_call_id,
                            content,
                            ..
                        } => json!({
                            "role": "tool",
                            "tool_call_id": tool_call_id,
                            "content": content
                        }),
                    });
                }
            }
            Message::Response(parts) => {
                let text = msg.response_text();
                let tool_calls: Vec<Value> = parts
                    .iter()
                    .filter_map(|p| match p {
                        ResponsePart::ToolCall {
                            tool_call_id,
                            tool_name,
                            args,
                        } => Some(json!({
                            "id": tool_call_id,
                            "type": "function",
                            "function": {"name": tool_name, "arguments": args},
                        })),
                        ResponsePart::Text { .. } => None,
                    })
                    .collect();
                let mut wire = json!({"role": "assistant", "content": text});
                if !tool_calls.is_empty() {
                    if text.is_empty() {
                        wire["content"] = Value::Null;
                    }
                    wire["tool_calls"] = Value::Array(tool_calls);
                }
                out.push(wire);
            }
        }
    }
    out
}

/// First choice of a chat-completions response as a response message.
pub fn parse_reply(resp: &Value) -> Result<Message, JuiceError> {
    let message = resp
        .pointer("/choices/0/message")
        .ok_or_else(|| JuiceError::Agent("no message in chat completion response".into()))?;

    let mut parts = Vec::new();
    if let Some(text) = message.get("content").and_then(Value::as_str)
        && !text.is_empty()
    {
        parts.push(ResponsePart::Text {
            content: text.to_string(),
        });
    }
    if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            let function = call.get("function");
            parts.push(ResponsePart::ToolCall {
                tool_call_id: call
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                tool_name: function
                    .and_then(|f| f.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                args: function
                    .and_then(|f| f.get("arguments"))
                    .and_then(Value::as_str)
                    .unwrap_or("{}")
                    .to_string(),
            });
        }
    }
    Ok(Message::Response(parts))
}
