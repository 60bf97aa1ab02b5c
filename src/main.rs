use clap::Parser;
use juice::cli::{CellArgs, Cli, Command};
use juice::config::{load_config, validate_config, JuiceConfig};
use juice::session::{CellOutput, Session};
use juice::JuiceError;
use serde::Deserialize;
use std::io::{BufRead, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Deserialize)]
struct CellRequest {
    cell: String,
}

/// Cell source from `--cell` or stdin, minus the single trailing newline that
/// editors and shells add.
fn read_cell(args: &CellArgs) -> Result<String, JuiceError> {
    let mut source = match &args.cell {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    if source.ends_with('\n') {
        source.pop();
        if source.ends_with('\r') {
            source.pop();
        }
    }
    Ok(source)
}

fn handle_history(
    dir: PathBuf,
    config: &JuiceConfig,
    args: &CellArgs,
) -> Result<ExitCode, JuiceError> {
    let cell = read_cell(args)?;
    let mut session = Session::open(&dir, config)?;
    let context = session.context();
    match context.notebook_path(&cell)? {
        Some(path) => eprintln!("juice: cell found in {}", path.display()),
        None => {
            eprintln!("juice: no notebook in {} contains this cell", dir.display());
            return Ok(ExitCode::SUCCESS);
        }
    }
    let window = context.history(&cell)?;
    eprintln!("juice: {} cells of history", window.len());
    if !window.is_empty() {
        println!("{}", window.join("\n\n"));
    }
    Ok(ExitCode::SUCCESS)
}

fn handle_prompt(
    dir: PathBuf,
    config: &JuiceConfig,
    args: &CellArgs,
) -> Result<ExitCode, JuiceError> {
    let cell = read_cell(args)?;
    let mut session = Session::open(dir, config)?;
    let out = session.run_prompt_cell(&cell);
    println!("{out}");
    Ok(if out.is_error { ExitCode::from(1) } else { ExitCode::SUCCESS })
}

fn handle_session(dir: PathBuf, config: &JuiceConfig) -> Result<ExitCode, JuiceError> {
    let mut session = Session::open(dir, config)?;
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout().lock();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let out = match serde_json::from_str::<CellRequest>(&line) {
            Ok(req) => session.run_prompt_cell(&req.cell),
            Err(e) => CellOutput {
                output: format!("Error processing prompt: {}", JuiceError::from(e)),
                new_cells: Vec::new(),
                is_error: true,
            },
        };
        writeln!(stdout, "{}", serde_json::to_string(&out)?)?;
        stdout.flush()?;
    }
    Ok(ExitCode::SUCCESS)
}

fn run() -> Result<ExitCode, JuiceError> {
    let cli = Cli::parse();
    let mut config = load_config()?;
    if let Some(model) = cli.model {
        config.model = model;
        validate_config(&config)?;
    }
    let dir = match cli.dir {
        Some(d) => d,
        None => std::env::current_dir()?,
    };

    match cli.command {
        Command::Prompt(args) => handle_prompt(dir, &config, &args),
        Command::History(args) => handle_history(dir, &config, &args),
        Command::Session => handle_session(dir, &config),
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("JUICE_LOG", "warn"))
        .format_timestamp(None)
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("juice: {e}");
            ExitCode::from(1)
        }
    }
}
