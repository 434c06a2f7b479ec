//! Parley CLI entry point.
//!
//! Not a TUI: this is a line-oriented stdin/stdout loop plus the
//! non-blocking ESC poll the interrupt controller needs (spec §1). The
//! readline/cursor-management layer a full terminal UI would own is out
//! of scope for this crate.

use clap::Parser;
use owo_colors::OwoColorize;
use parley::config::CoreConfig;
use parley::orchestrator::Orchestrator;
use parley::provider::OllamaProvider;
use parley::session::{JsonFilePersistence, Session};
use parley::tools::ToolRegistry;
use parley::ui::TerminalUi;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "parley")]
#[command(author, version, about = "Parley - agentic execution core for a terminal coding assistant")]
struct Cli {
    /// Path to workspace root (defaults to current directory).
    #[arg(short, long, global = true)]
    workspace: Option<PathBuf>,

    /// Path to config file (defaults to `./parley.toml` if present).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Model to use (overrides config).
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Run as a sub-agent: interactive and destructive tools are withheld
    /// and the error budget/iteration bound still apply per turn.
    #[arg(long, global = true)]
    subagent: bool,

    /// Enable verbose (DEBUG-level) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Single task to run non-interactively, then exit.
    #[arg(short, long)]
    task: Option<String>,
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> parley::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let workspace = cli.workspace.unwrap_or_else(|| PathBuf::from("."));
    let mut config = CoreConfig::load(cli.config.as_ref())?;
    if let Some(model) = cli.model {
        config.model = model;
    }
    config.is_subagent = cli.subagent;

    let registry = ToolRegistry::with_defaults_and_config(workspace.clone(), &config);
    let provider = Arc::new(OllamaProvider::new(
        config.provider_url.clone(),
        config.model.clone(),
        config.temperature,
        config.top_p,
    ));
    let ui = Arc::new(TerminalUi);
    let orchestrator = Orchestrator::new(config, registry, provider, ui);

    let session_path = workspace.join(".parley").join("session.jsonl");
    if let Some(parent) = session_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut session = Session::with_persistence(Box::new(JsonFilePersistence::new(session_path)));
    session.load()?;

    if let Some(task) = cli.task {
        run_turn(&orchestrator, &task, &mut session).await?;
        return Ok(());
    }

    println!("{}", "Parley — type your request, or 'exit' to quit.".bold());
    let interrupt = orchestrator.interrupt_controller();
    loop {
        print!("\n> ");
        use std::io::Write;
        std::io::stdout().flush()?;

        let mut line = String::new();
        if std::io::stdin().read_line(&mut line)? == 0 {
            break; // EOF
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        // Poll for a held-over ESC before starting a new turn so a stray
        // keypress from the previous turn doesn't bleed into this one.
        interrupt.acknowledge();

        run_turn(&orchestrator, line, &mut session).await?;
    }

    Ok(())
}

async fn run_turn(orchestrator: &Orchestrator, input: &str, session: &mut Session) -> parley::Result<()> {
    let result = orchestrator.process(input, session).await?;
    if result.success {
        println!("\n{}", result.content);
    } else {
        eprintln!(
            "\n{} {}",
            "error:".red().bold(),
            result.error.unwrap_or_else(|| "unknown failure".to_string())
        );
    }
    Ok(())
}
