use crate::notebook::Document;
use regex::Regex;
use std::sync::LazyLock;

pub const DEFAULT_TRIGGER: &str = "%%prompt";
pub const DEFAULT_MAX_LOOKBACK: usize = 10;

static EXCLUDE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#\|[ \t]*exclude").expect("static regex"));

/// Where the window starts when no earlier prompt cell bounds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookback {
    /// Everything from the first cell.
    Unbounded,
    /// At most this many cells before the current one.
    Bounded(usize),
}

impl Default for Lookback {
    fn default() -> Self {
        Lookback::Bounded(DEFAULT_MAX_LOOKBACK)
    }
}

#[derive(Debug, Clone)]
pub struct HistoryOptions {
    pub trigger: String,
    pub lookback: Lookback,
    pub include_outputs: bool,
}

impl Default for HistoryOptions {
    fn default() -> Self {
        Self {
            trigger: DEFAULT_TRIGGER.into(),
            lookback: Lookback::default(),
            include_outputs: false,
        }
    }
}

impl HistoryOptions {
    fn is_trigger(&self, source: &str) -> bool {
        source.trim().starts_with(self.trigger.as_str())
    }
}

pub fn is_excluded(source: &str) -> bool {
    EXCLUDE_MARKER.is_match(source.trim())
}

/// Positions of the executing cell and of the last prompt cell before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Positions {
    pub current: usize,
    pub last_prompt: Option<usize>,
}

/// First code cell equal to `current_source`, plus the most recent code cell
/// before it that starts with the trigger. `None` if the cell is absent.
pub fn find_positions(
    doc: &Document,
    current_source: &str,
    opts: &HistoryOptions,
) -> Option<Positions> {
    let mut last_prompt = None;
    for (idx, cell) in doc.cells.iter().enumerate() {
        if !cell.is_code() {
            continue;
        }
        if cell.source == current_source {
            return Some(Positions { current: idx, last_prompt });
        }
        if opts.is_trigger(&cell.source) {
            last_prompt = Some(idx);
        }
    }
    None
}

pub fn start_index(pos: Positions, lookback: Lookback) -> usize {
    match (pos.last_prompt, lookback) {
        (Some(p), _) => p + 1,
        (None, Lookback::Unbounded) => 0,
        (None, Lookback::Bounded(n)) => pos.current.saturating_sub(n),
    }
}

fn render(idx: usize, source: &str, outputs: Option<String>) -> String {
    match outputs {
        Some(out) => format!("Cell[{idx}]:\nSource:\n{source}\nOutputs:\n{out}"),
        None => format!("Cell[{idx}]:\nSource:\n{source}"),
    }
}

/// Rendered summaries of the cells between the last prompt cell (or the
/// lookback fallback) and the executing cell, in notebook order.
///
/// With `Lookback::Unbounded` and no earlier prompt cell this is the whole
/// prefix of the notebook.
pub fn window(doc: &Document, current_source: &str, opts: &HistoryOptions) -> Vec<String> {
    let Some(pos) = find_positions(doc, current_source, opts) else {
        return Vec::new();
    };
    let start = start_index(pos, opts.lookback);

    doc.cells[start..pos.current]
        .iter()
        .enumerate()
        .filter(|(_, cell)| !(opts.is_trigger(&cell.source) || is_excluded(&cell.source)))
        .map(|(offset, cell)| {
            let outputs = opts.include_outputs.then(|| cell.outputs_text());
            render(start + offset, &cell.source, outputs)
        })
        .collect()
}
