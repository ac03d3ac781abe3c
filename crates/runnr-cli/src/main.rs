//! Runnr CLI
//!
//! A command-line tool for running code snippets through runnr backends.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use runnr::{Config, EXAMPLE_CONFIG, ExecutionRequest, InputRequest, Runnr};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "runnr")]
#[command(about = "A tool for running code snippets in many languages")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: runnr.toml)
        #[arg(short, long, default_value = "runnr.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Run a source file
    Run {
        /// Source file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Language tag (e.g., js, python, ts); inferred from the extension if omitted
        #[arg(short, long)]
        language: Option<String>,
    },

    /// List available languages
    Languages,

    /// Show the active configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
        Config::from_file(path).context("failed to load configuration")?
    } else {
        debug!("using default configuration");
        Config::default()
    };

    match cli.command {
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::Run { source, language } => run_file(config, &source, language).await,
        Commands::Languages => {
            list_languages(&config);
            Ok(())
        }
        Commands::ShowConfig => {
            show_config(&config);
            Ok(())
        }
    }
}

async fn run_file(config: Config, source: &Path, language: Option<String>) -> Result<()> {
    let language = match language {
        Some(tag) => tag,
        None => config
            .language_for_path(source)
            .map(|(id, _)| id.to_owned())
            .with_context(|| {
                format!(
                    "cannot infer the language of '{}'; pass --language",
                    source.display()
                )
            })?,
    };

    let code = tokio::fs::read_to_string(source)
        .await
        .context("failed to read source file")?;

    let runnr = Arc::new(Runnr::new(config));

    let (requests_tx, requests_rx) = mpsc::unbounded_channel();
    runnr.on_input_request(move |request: InputRequest| {
        let _ = requests_tx.send(request);
    });
    let answers = tokio::spawn(answer_from_terminal(runnr.clone(), requests_rx));

    info!(%language, "running program");
    let request = ExecutionRequest::new(code, language);
    let result = tokio::select! {
        result = runnr.execute(&request) => result.context("execution failed")?,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted");
            runnr.destroy();
            std::process::exit(130);
        }
    };
    answers.abort();
    runnr.destroy();

    if !result.stdout.is_empty() {
        println!("{}", result.stdout);
    }
    if !result.stderr.is_empty() {
        eprintln!("{}", result.stderr);
    }
    if !result.diagnostics.is_empty() {
        debug!(count = result.diagnostics.len(), "compiler diagnostics");
    }

    if result.has_errors() {
        std::process::exit(1);
    }
    Ok(())
}

/// Answer each input request with one line read from the terminal
async fn answer_from_terminal(runnr: Arc<Runnr>, mut requests: mpsc::UnboundedReceiver<InputRequest>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(request) = requests.recv().await {
        eprint!("{} ", request.message);
        let _ = std::io::stderr().flush();

        let value = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => String::new(),
            Err(e) => {
                warn!(error = %e, "failed to read input");
                String::new()
            }
        };
        if !runnr.provide_input(value) {
            debug!("input arrived after the run stopped waiting");
        }
    }
}

fn list_languages(config: &Config) {
    println!("Available languages:\n");

    for id in config.language_ids() {
        let Ok(lang) = config.get_language(&id) else {
            continue;
        };
        let aliases = if lang.aliases.is_empty() {
            String::new()
        } else {
            format!(" [{}]", lang.aliases.join(", "))
        };
        println!("  {:<12} {} ({}){}", id, lang.name, lang.backend, aliases);
    }
}

fn show_config(config: &Config) {
    println!(
        "Worker ready timeout: {:.1}s",
        config.worker_ready_timeout().as_secs_f64()
    );
    match &config.work_dir {
        Some(dir) => println!("Work directory: {}", dir.display()),
        None => println!("Work directory: {}", std::env::temp_dir().display()),
    }
    println!();
    println!("Languages configured: {}", config.languages.len());
    for id in config.language_ids() {
        if let Ok(lang) = config.get_language(&id) {
            println!("  {:<12} {}", id, lang.backend);
        }
    }
}

async fn init_config(output: &PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
