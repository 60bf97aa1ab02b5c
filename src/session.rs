use crate::agent::{Agent, EchoAgent, Message, MessageHistory, NewCell, NewCellType, RunResult};
use crate::chat::ChatCompletionsAgent;
use crate::compose::{compose, Composed};
use crate::config::JuiceConfig;
use crate::history::{self, HistoryOptions};
use crate::locate::{DirStore, Locator, NotebookStore};
use crate::JuiceError;
use serde::Serialize;
use std::path::PathBuf;

/// Build the agent named by `config.model`.
///
/// `echo` is the offline agent. `provider:model` and bare `model` both talk to
/// the configured chat-completions endpoint.
pub fn resolve_agent(config: &JuiceConfig) -> Result<Box<dyn Agent>, JuiceError> {
    let id = config.model.trim();
    if id == "echo" {
        return Ok(Box::new(EchoAgent));
    }
    let name = match id.split_once(':') {
        Some((_, name)) => name.trim(),
        None => id,
    };
    if name.is_empty() {
        return Err(JuiceError::Config(format!("model {id:?} names no model")));
    }
    Ok(Box::new(ChatCompletionsAgent::new(name, &config.agent)))
}

/// Prompt text of a prompt cell: everything after the directive line, trimmed.
/// Cells that do not start with the directive are taken whole.
pub fn prompt_body<'a>(cell_source: &'a str, trigger: &str) -> &'a str {
    let text = cell_source.trim_start();
    if !text.starts_with(trigger) {
        return cell_source.trim();
    }
    match text.split_once('\n') {
        Some((_, rest)) => rest.trim(),
        None => "",
    }
}

/// Notebook lookup state plus the options that shape the history window.
pub struct NotebookContext<S: NotebookStore = DirStore> {
    locator: Locator<S>,
    options: HistoryOptions,
}

impl<S: NotebookStore> NotebookContext<S> {
    pub fn new(store: S, options: HistoryOptions) -> Self {
        Self {
            locator: Locator::new(store),
            options,
        }
    }

    pub fn locator(&self) -> &Locator<S> {
        &self.locator
    }

    /// Notebook file holding `current_source`, if any.
    pub fn notebook_path(
        &mut self,
        current_source: &str,
    ) -> Result<Option<PathBuf>, JuiceError> {
        Ok(self.locator.locate(current_source)?.map(|c| c.path.clone()))
    }

    /// History window for the executing cell. Empty when the notebook or the
    /// cell cannot be found.
    pub fn history(&mut self, current_source: &str) -> Result<Vec<String>, JuiceError> {
        let options = &self.options;
        Ok(match self.locator.locate(current_source)? {
            Some(nb) => history::window(&nb.document, current_source, options),
            None => Vec::new(),
        })
    }

    /// Prompt plus the history to send with it. Never fails: without a cell
    /// context, or if the notebook lookup breaks, the inputs pass through.
    pub fn compose(
        &mut self,
        current_source: Option<&str>,
        prompt: &str,
        prior: Option<Vec<Message>>,
    ) -> Composed {
        let Some(source) = current_source else {
            return Composed::passthrough(prompt, prior);
        };
        match self.history(source) {
            Ok(window) => compose(prompt, prior, &window),
            Err(e) => {
                log::warn!("notebook history unavailable: {e}");
                Composed::passthrough(prompt, prior)
            }
        }
    }

    /// Compose, then make one blocking call into `agent`. Agent errors are
    /// returned as-is.
    pub fn invoke(
        &mut self,
        agent: &dyn Agent,
        current_source: Option<&str>,
        prompt: &str,
        prior: Option<Vec<Message>>,
    ) -> Result<RunResult, JuiceError> {
        let composed = self.compose(current_source, prompt, prior);
        agent.run(&composed.prompt, composed.messages.as_deref())
    }
}

/// What a prompt cell shows once it has run.
#[derive(Debug, Clone, Serialize)]
pub struct CellOutput {
    pub output: String,
    pub new_cells: Vec<NewCell>,
    pub is_error: bool,
}

impl std::fmt::Display for CellOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.output)?;
        for cell in &self.new_cells {
            let lang = match cell.cell_type {
                NewCellType::Code => "python",
                NewCellType::Markdown => "markdown",
            };
            write!(f, "\n\n```{lang}\n{}\n```", cell.content)?;
        }
        Ok(())
    }
}

/// One notebook session: the located-notebook cache, the agent in use, and
/// the result of the last prompt cell.
pub struct Session<S: NotebookStore = DirStore> {
    context: NotebookContext<S>,
    agent: Box<dyn Agent>,
    last_result: Option<RunResult>,
}

impl Session<DirStore> {
    pub fn open(dir: impl Into<PathBuf>, config: &JuiceConfig) -> Result<Self, JuiceError> {
        let agent = resolve_agent(config)?;
        Ok(Session::with_parts(DirStore::new(dir), config.history_options(), agent))
    }
}

impl<S: NotebookStore> Session<S> {
    pub fn with_parts(store: S, options: HistoryOptions, agent: Box<dyn Agent>) -> Self {
        Self {
            context: NotebookContext::new(store, options),
            agent,
            last_result: None,
        }
    }

    pub fn context(&mut self) -> &mut NotebookContext<S> {
        &mut self.context
    }

    /// Swap the agent used by subsequent prompt cells.
    pub fn set_agent(&mut self, agent: Box<dyn Agent>) {
        self.agent = agent;
    }

    pub fn last_result(&self) -> Option<&RunResult> {
        self.last_result.as_ref()
    }

    /// Run a prompt cell, continuing from `prior` instead of the stored result.
    pub fn execute_cell_with(
        &mut self,
        cell_source: &str,
        prior: Option<&dyn MessageHistory>,
    ) -> Result<&RunResult, JuiceError> {
        let prior = prior.and_then(|p| p.extract_prior_messages());
        self.run(cell_source, prior)
    }

    /// Run a prompt cell, continuing the conversation of the previous one.
    /// A failed run leaves the previous result in place.
    pub fn execute_cell(&mut self, cell_source: &str) -> Result<&RunResult, JuiceError> {
        let prior = self
            .last_result
            .as_ref()
            .and_then(|r| r.extract_prior_messages());
        self.run(cell_source, prior)
    }

    fn run(
        &mut self,
        cell_source: &str,
        prior: Option<Vec<Message>>,
    ) -> Result<&RunResult, JuiceError> {
        let prompt = prompt_body(cell_source, &self.context.options.trigger).to_string();
        let result = self
            .context
            .invoke(self.agent.as_ref(), Some(cell_source), &prompt, prior)?;
        let stored: &RunResult = self.last_result.insert(result);
        Ok(stored)
    }

    /// Entry point for a prompt cell. Errors come back as display text.
    pub fn run_prompt_cell(&mut self, cell_source: &str) -> CellOutput {
        match self.execute_cell(cell_source) {
            Ok(result) => CellOutput {
                output: result.output.clone(),
                new_cells: result.new_cells.clone(),
                is_error: false,
            },
            Err(e) => CellOutput {
                output: format!("Error processing prompt: {e}"),
                new_cells: Vec::new(),
                is_error: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::{CONTEXT_ACK, CONTEXT_PREAMBLE};
    use crate::locate::tests::{notebook_json, CountingStore};
    use std::path::Path;

    struct FailingStore;

    impl NotebookStore for FailingStore {
        fn list(&self) -> Result<Vec<PathBuf>, JuiceError> {
            Err(JuiceError::Io(std::io::Error::other("kernel gone")))
        }

        fn read(&self, _path: &Path) -> Result<String, JuiceError> {
            unreachable!()
        }
    }

    struct BrokenAgent;

    impl Agent for BrokenAgent {
        fn run(
            &self,
            _prompt: &str,
            _history: Option<&[Message]>,
        ) -> Result<RunResult, JuiceError> {
            Err(JuiceError::Agent("rate limited".into()))
        }
    }

    fn echo_session(cells: &[&str]) -> Session<CountingStore> {
        let store = CountingStore::with(&[("nb.ipynb", notebook_json(cells).as_str())]);
        Session::with_parts(store, HistoryOptions::default(), Box::new(EchoAgent))
    }

    #[test]
    fn prompt_body_strips_directive() {
        assert_eq!(prompt_body("%%prompt\n  explain this \n", "%%prompt"), "explain this");
        assert_eq!(prompt_body("%%prompt --verbose\nhi", "%%prompt"), "hi");
        assert_eq!(prompt_body("%%prompt", "%%prompt"), "");
        assert_eq!(prompt_body("  plain question ", "%%prompt"), "plain question");
    }

    #[test]
    fn resolve_agent_by_model_id() {
        let mut config = JuiceConfig::default();
        assert!(resolve_agent(&config).is_ok());
        config.model = "echo".into();
        assert!(resolve_agent(&config).is_ok());
        config.model = "openai:".into();
        assert!(matches!(resolve_agent(&config), Err(JuiceError::Config(_))));
    }

    #[test]
    fn compose_with_empty_window_adds_nothing() {
        let mut session = echo_session(&["%%prompt\nfirst"]);
        let composed = session.context().compose(Some("%%prompt\nfirst"), "x", None);
        assert_eq!(composed, Composed::passthrough("x", None));
    }

    #[test]
    fn compose_without_cell_context_passes_through() {
        let mut session = echo_session(&["a"]);
        let prior = vec![Message::user("q")];
        let composed = session.context().compose(None, "x", Some(prior.clone()));
        assert_eq!(composed.messages, Some(prior));
        assert_eq!(session.context().locator().store().accesses(), 0);
    }

    #[test]
    fn compose_degrades_when_lookup_fails() {
        let mut ctx = NotebookContext::new(FailingStore, HistoryOptions::default());
        let prior = vec![Message::user("q"), Message::text("a")];
        let composed = ctx.compose(Some("cell"), "x", Some(prior.clone()));
        assert_eq!(composed, Composed::passthrough("x", Some(prior)));
        assert!(ctx.history("cell").is_err());
    }

    #[test]
    fn compose_appends_context_after_prior() {
        let mut session = echo_session(&["import os", "x = 1", "%%prompt\nq"]);
        let prior = vec![Message::user("old"), Message::text("older answer")];
        let composed = session
            .context()
            .compose(Some("%%prompt\nq"), "q", Some(prior.clone()));
        let msgs = composed.messages.unwrap();
        assert_eq!(msgs.len(), 4);
        assert_eq!(&msgs[..2], prior.as_slice());
        match &msgs[2] {
            Message::Request(parts) => match &parts[0] {
                crate::agent::RequestPart::UserPrompt { content } => {
                    assert!(content.starts_with(CONTEXT_PREAMBLE));
                    assert!(content.contains("Cell[0]:\nSource:\nimport os\n\nCell[1]:"));
                }
                other => panic!("unexpected part {other:?}"),
            },
            other => panic!("unexpected message {other:?}"),
        }
        assert_eq!(msgs[3], Message::text(CONTEXT_ACK));
    }

    #[test]
    fn prompt_cells_continue_the_conversation() {
        let cells = ["a = 1", "b = 2", "%%prompt\nhi", "c = 3", "%%prompt\nagain"];
        let mut session = echo_session(&cells);

        let first = session.run_prompt_cell("%%prompt\nhi");
        assert!(!first.is_error);
        assert_eq!(first.output, "echo: hi (2 prior messages)");
        assert_eq!(session.last_result().unwrap().messages.len(), 4);

        let second = session.run_prompt_cell("%%prompt\nagain");
        assert_eq!(second.output, "echo: again (6 prior messages)");
        // Both cells live in the cached notebook, so only the first run scanned.
        assert_eq!(session.context().locator().store().lists.get(), 1);
    }

    #[test]
    fn explicit_prior_overrides_stored_result() {
        let mut session = echo_session(&["%%prompt\nhi"]);
        session.run_prompt_cell("%%prompt\nhi");
        let prior: Vec<Message> = Vec::new();
        let result = session.execute_cell_with("%%prompt\nhi", Some(&prior)).unwrap();
        assert_eq!(result.output, "echo: hi (0 prior messages)");
    }

    #[test]
    fn agent_errors_render_as_text() {
        let mut session = echo_session(&["%%prompt\nhi"]);
        session.run_prompt_cell("%%prompt\nhi");
        session.set_agent(Box::new(BrokenAgent));

        let out = session.run_prompt_cell("%%prompt\nhi");
        assert!(out.is_error);
        assert_eq!(out.output, "Error processing prompt: agent: rate limited");
        assert!(session.last_result().is_some());
    }

    #[test]
    fn cell_output_lists_new_cells() {
        let out = CellOutput {
            output: "Here you go".into(),
            new_cells: vec![NewCell {
                cell_type: NewCellType::Code,
                content: "print(1)".into(),
            }],
            is_error: false,
        };
        assert_eq!(out.to_string(), "Here you go\n\n```python\nprint(1)\n```");
    }
}
