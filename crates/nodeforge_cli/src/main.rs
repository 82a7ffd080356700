// SPDX-License-Identifier: MIT OR Apache-2.0
//! `nodeforge` - headless driver for graph documents.
//!
//! Loads a RON document, optionally replays a JSON-lines command script
//! against it through the editor's command bus, then prints the evaluation
//! order of the root graph.
//!
//! ```text
//! nodeforge <DOCUMENT> [SCRIPT] [--config <CONFIG>] [--write]
//! ```
//!
//! Script lines look like `{"command": "node.add", "payload": {"type": "Add"}}`.
//! Blank lines and lines starting with `#` are skipped.

use clap::Parser;
use nodeforge_graph::{ConfigError, DocumentError, EditorConfig, GraphDocument, GraphEditor};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Errors that abort the run
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Script line {line}: {source}")]
    Script { line: usize, source: serde_json::Error },
}

/// One line of a command script
#[derive(Debug, Deserialize)]
struct ScriptLine {
    command: String,
    #[serde(default)]
    payload: Value,
}

/// Load a graph document, replay a command script and print the
/// evaluation order
#[derive(Parser, Debug)]
#[command(name = "nodeforge")]
#[command(version, about, long_about = None)]
struct Args {
    /// Graph document (RON)
    document: PathBuf,

    /// Command script, one JSON object per line
    script: Option<PathBuf>,

    /// Editor configuration (RON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the edited document back to its path
    #[arg(long)]
    write: bool,
}

fn read(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse a script into `(line number, command)` pairs
fn parse_script(text: &str) -> Result<Vec<(usize, ScriptLine)>, CliError> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(line, text)| {
            serde_json::from_str(text)
                .map(|cmd| (line, cmd))
                .map_err(|source| CliError::Script { line, source })
        })
        .collect()
}

/// Replay a script. Failed commands are logged and skipped.
fn replay(editor: &mut GraphEditor, script: Vec<(usize, ScriptLine)>) -> usize {
    let mut failures = 0;
    for (line, cmd) in script {
        match editor.dispatch(&cmd.command, cmd.payload) {
            Ok(result) if !result.is_null() => tracing::info!(line, command = %cmd.command, %result, "ok"),
            Ok(_) => tracing::info!(line, command = %cmd.command, "ok"),
            Err(error) => {
                failures += 1;
                tracing::error!(line, command = %cmd.command, %error, "command failed");
            }
        }
    }
    failures
}

/// Render the root evaluation order, marking where a cycle begins
fn describe_order(editor: &GraphEditor) -> String {
    let order = editor.evaluation_order();
    let graph = editor.graph();
    let mut out = format!("{} ({} nodes)\n", graph.name, order.len());
    for (i, handle) in order.nodes.iter().enumerate() {
        if i == order.sorted && order.has_cycle() {
            out.push_str("  -- cycle --\n");
        }
        if let Some(node) = graph.node(*handle) {
            out.push_str(&format!("  {:>3}. {} [{}] {}\n", i + 1, node.name, node.node_type, node.uuid));
        }
    }
    out
}

fn run(args: Args) -> Result<(), CliError> {
    let config = match &args.config {
        Some(path) => EditorConfig::from_ron(&read(path)?)?,
        None => EditorConfig::default(),
    };
    config.validate()?;

    let document = GraphDocument::from_ron(&read(&args.document)?)?;
    let mut editor = GraphEditor::new(config);
    editor.load_document(&document)?;
    tracing::info!(
        path = %args.document.display(),
        nodes = editor.graph().node_count(),
        connections = editor.graph().connection_count(),
        "document loaded"
    );

    if let Some(path) = &args.script {
        let script = parse_script(&read(path)?)?;
        let failures = replay(&mut editor, script);
        if failures > 0 {
            tracing::warn!(failures, "script finished with failed commands");
        }
    }

    print!("{}", describe_order(&editor));

    if args.write {
        let text = editor.to_document().to_ron()?;
        std::fs::write(&args.document, text).map_err(|source| CliError::Io {
            path: args.document.clone(),
            source,
        })?;
        tracing::info!(path = %args.document.display(), "document written");
    }
    Ok(())
}

fn main() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("nodeforge_graph=info,nodeforge=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}
