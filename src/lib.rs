pub mod agent;
pub mod chat;
pub mod cli;
pub mod compose;
pub mod config;
pub mod history;
pub mod locate;
pub mod notebook;
pub mod session;

#[derive(Debug)]
pub enum JuiceError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Config(String),
    Agent(String),
}

impl std::fmt::Display for JuiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JuiceError::Io(e) => write!(f, "io: {e}"),
            JuiceError::Json(e) => write!(f, "json: {e}"),
            JuiceError::Config(msg) => write!(f, "config: {msg}"),
            JuiceError::Agent(msg) => write!(f, "agent: {msg}"),
        }
    }
}

impl std::error::Error for JuiceError {}

impl From<std::io::Error> for JuiceError {
    fn from(e: std::io::Error) -> Self {
        JuiceError::Io(e)
    }
}

impl From<serde_json::Error> for JuiceError {
    fn from(e: serde_json::Error) -> Self {
        JuiceError::Json(e)
    }
}
