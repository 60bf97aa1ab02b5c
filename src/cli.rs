use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "juice", version, about = "Prompt cells for Jupyter notebooks")]
pub struct Cli {
    /// Directory holding the notebooks (defaults to the current directory)
    #[arg(long, env = "JUICE_DIR", global = true)]
    pub dir: Option<PathBuf>,

    /// Model id, e.g. openai:gpt-4o or echo (overrides config and JUICE_MODEL)
    #[arg(long, global = true)]
    pub model: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run one prompt cell and print the reply
    Prompt(CellArgs),
    /// Show the notebook history that would be sent with a cell
    History(CellArgs),
    /// Run prompt cells from stdin, one JSON object per line, sharing one session
    Session,
}

#[derive(Parser)]
pub struct CellArgs {
    /// File holding the cell source exactly as saved in the notebook (default: stdin)
    #[arg(long)]
    pub cell: Option<PathBuf>,
}
