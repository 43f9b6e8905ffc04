//! CLI for batch PDF page rendering and text extraction.

mod backend;
mod commands;
mod worker;

use clap::{Parser, Subcommand};
use pagemill_core::{ConfigError, CoordinatorError, EngineError};
use pagemill_parser::ParserError;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{batch, extract, render};

/// pagemill - turn PDF pages into images or text, fast
#[derive(Parser)]
#[command(name = "pagemill")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render pages of one document to image files
    Render(render::RenderArgs),

    /// Extract a document's text as a character stream
    Extract(extract::ExtractArgs),

    /// Render every document matching a glob pattern
    Batch(batch::BatchArgs),
}

fn main() {
    // Reserved worker protocol: positional grammar dispatched before clap,
    // since child processes re-exec this binary with `--worker`.
    let raw_args: Vec<String> = std::env::args().collect();
    if raw_args.len() >= 2 && raw_args[1] == "--worker" {
        std::process::exit(worker::worker_main(&raw_args[2..]));
    }

    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Warning: logging already initialized");
    }

    let result = match cli.command {
        Commands::Render(args) => render::run(args),
        Commands::Extract(args) => extract::run(args),
        Commands::Batch(args) => batch::run(args),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            if let Some(hint) = remediation(&err) {
                eprintln!("  hint: {hint}");
            }
            std::process::exit(exit_code(&err));
        }
    }
}

/// Map a failure onto the process exit codes the worker protocol promises:
/// 2 for document open/read failures, 3 for coordinator-level worker
/// failures, 1 for everything else.
fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(parser) = err.downcast_ref::<ParserError>() {
        return parser_exit_code(parser);
    }
    match err.downcast_ref::<EngineError>() {
        Some(EngineError::Parser(parser)) => parser_exit_code(parser),
        Some(EngineError::Coordinator(_)) => 3,
        _ => 1,
    }
}

fn parser_exit_code(err: &ParserError) -> i32 {
    match err {
        ParserError::NotFound(_)
        | ParserError::CannotOpen(_)
        | ParserError::PasswordProtected
        | ParserError::InvalidDocument(_)
        | ParserError::Io(_) => 2,
        _ => 1,
    }
}

/// One-line suggested fix for the user, where a useful one exists.
fn remediation(err: &anyhow::Error) -> Option<&'static str> {
    if let Some(parser) = err.downcast_ref::<ParserError>() {
        return parser_remediation(parser);
    }
    match err.downcast_ref::<EngineError>()? {
        EngineError::Parser(parser) => parser_remediation(parser),
        EngineError::Config(config) => match config {
            ConfigError::WorkerCount(_) => Some("choose a worker count between 1 and 16"),
            ConfigError::ThreadCount(_) => Some("choose a thread count between 1 and 32"),
            ConfigError::DirectoryNotFound(_) => {
                Some("create the parent directory or pass an existing path")
            }
            ConfigError::OutputDir { .. } => {
                Some("check permissions on the output location")
            }
            ConfigError::Unsupported(_) => {
                Some("rebuild with `--features mupdf` to enable the PDF backend")
            }
            ConfigError::InvalidArgument(_) => Some("see --help for accepted values"),
        },
        EngineError::Range(_) => Some("pass a 0-based page index N or a range A-B"),
        EngineError::Coordinator(CoordinatorError::Spawn { .. }) => {
            Some("check that the pagemill binary is executable")
        }
        _ => None,
    }
}

fn parser_remediation(err: &ParserError) -> Option<&'static str> {
    match err {
        ParserError::NotFound(_) => Some("check the input path"),
        ParserError::PasswordProtected => Some("pass the document password with --password"),
        ParserError::InvalidDocument(_) => Some("the file may be corrupt; try re-downloading it"),
        _ => None,
    }
}
