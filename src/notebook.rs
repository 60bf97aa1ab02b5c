use crate::JuiceError;
use serde::{Deserialize, Deserializer};

/// An `.ipynb` document. Only the cell list matters here; `metadata`,
/// `nbformat` and friends are ignored.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Document {
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Cell {
    pub cell_type: CellType,
    /// Normalized source. Notebooks store it either as one string or as a list
    /// of line fragments that already carry their own newlines.
    #[serde(default, deserialize_with = "string_or_fragments")]
    pub source: String,
    #[serde(default)]
    pub outputs: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
    Code,
    Markdown,
    #[serde(other)]
    Other,
}

fn string_or_fragments<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawSource {
        Text(String),
        Fragments(Vec<String>),
    }

    Ok(match RawSource::deserialize(deserializer)? {
        RawSource::Text(s) => s,
        RawSource::Fragments(parts) => parts.concat(),
    })
}

impl Document {
    pub fn parse(json: &str) -> Result<Self, JuiceError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_cells(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    /// True if some code cell's source is exactly `source`.
    pub fn contains_code_cell(&self, source: &str) -> bool {
        self.cells.iter().any(|c| c.is_code() && c.source == source)
    }
}

impl Cell {
    pub fn code(source: impl Into<String>) -> Self {
        Self {
            cell_type: CellType::Code,
            source: source.into(),
            outputs: None,
        }
    }

    pub fn markdown(source: impl Into<String>) -> Self {
        Self {
            cell_type: CellType::Markdown,
            source: source.into(),
            outputs: None,
        }
    }

    pub fn with_outputs(mut self, outputs: serde_json::Value) -> Self {
        self.outputs = Some(outputs);
        self
    }

    pub fn is_code(&self) -> bool {
        self.cell_type == CellType::Code
    }

    /// Outputs as text: JSON strings verbatim, other values as compact JSON,
    /// `None` when the cell carries no outputs.
    pub fn outputs_text(&self) -> String {
        match &self.outputs {
            None | Some(serde_json::Value::Null) => "None".into(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}
