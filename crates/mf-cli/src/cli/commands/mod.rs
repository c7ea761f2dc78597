//! Top-level command tree: one noun-grouped subcommand per resource
//! (`request`, `template`, `execution`, `worker`, `server`, `recover`),
//! mirroring the HTTP surface's `requests.*`/`pipelines.*`/
//! `executions.*`/`workers.*` verb families.

mod execution;
mod recover;
mod request;
mod server;
mod template;
mod worker;

use clap::{Parser, Subcommand};

/// Check if verbose mode is enabled (for early logging setup, before
/// `Cli::parse()` has run).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Parser)]
#[command(name = "mediaforge")]
#[command(about = "Media acquisition and delivery orchestrator")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage acquisition requests
    Request {
        #[command(subcommand)]
        command: RequestCommands,
    },
    /// Manage pipeline templates
    Template {
        #[command(subcommand)]
        command: TemplateCommands,
    },
    /// Inspect and control pipeline executions
    Execution {
        #[command(subcommand)]
        command: ExecutionCommands,
    },
    /// Inspect encoder workers
    Worker {
        #[command(subcommand)]
        command: WorkerCommands,
    },
    /// Run the HTTP/RPC surface in-process
    Server {
        #[command(subcommand)]
        command: ServerCommands,
    },
    /// Drive the crash-recovery sweeps
    Recover {
        #[command(subcommand)]
        command: RecoverCommands,
    },
}

#[derive(Subcommand)]
enum RequestCommands {
    /// Submit a new acquisition request
    #[allow(clippy::too_many_arguments)]
    Submit {
        /// "movie" or "tv"
        kind: String,
        /// TMDB id
        tmdb_id: i64,
        /// Title
        title: String,
        /// Release year
        #[arg(long)]
        year: Option<i32>,
        /// Season number (TV only)
        #[arg(long)]
        season: Option<i32>,
        /// Episode numbers (TV only, comma-separated)
        #[arg(long, value_delimiter = ',')]
        episodes: Vec<i32>,
        /// Delivery target names (comma-separated)
        #[arg(long, value_delimiter = ',')]
        targets: Vec<String>,
        /// Pipeline template id to run
        #[arg(long)]
        template: String,
    },
    /// List requests
    List {
        /// Filter by status (pending, in_progress, completed, failed, cancelled)
        #[arg(long)]
        status: Option<String>,
    },
    /// Show one request
    Get { id: String },
    /// Watch a request's progress until it reaches a terminal status
    Watch {
        id: String,
        #[arg(long, default_value = "2")]
        interval: u64,
    },
    /// Cancel a request and its in-flight executions
    Cancel { id: String },
    /// Reset a request's failed items back to pending and resume them
    Retry { id: String },
}

#[derive(Subcommand)]
enum TemplateCommands {
    /// List pipeline templates
    List,
    /// Create a pipeline template from a JSON step-tree file
    Create {
        id: String,
        name: String,
        /// "movie" or "tv"
        media_kind: String,
        /// Path to a JSON file describing the step tree
        steps_file: std::path::PathBuf,
    },
    /// Validate a JSON step-tree file without persisting it
    Validate { steps_file: std::path::PathBuf },
    /// Delete a pipeline template
    Delete { id: String },
}

#[derive(Subcommand)]
enum ExecutionCommands {
    /// List executions for a request
    List { request_id: String },
    /// Show one execution, including its step history
    Get { id: String },
    /// Pause a running execution
    Pause { id: String },
    /// Resume a paused execution
    Resume { id: String },
    /// Cancel an execution and its branches
    Cancel { id: String },
}

#[derive(Subcommand)]
enum WorkerCommands {
    /// List registered encoder workers
    List,
    /// Show one encoder worker's status
    Status { id: String },
}

#[derive(Subcommand)]
enum ServerCommands {
    /// Start the HTTP/RPC surface, encoder WebSocket endpoint, and
    /// background sweep schedulers
    Run,
}

#[derive(Subcommand)]
enum RecoverCommands {
    /// Run every C6 recovery sweep once and report what each repaired
    RunOnce,
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Request { command } => match command {
            RequestCommands::Submit { kind, tmdb_id, title, year, season, episodes, targets, template } => {
                request::cmd_submit(&kind, tmdb_id, &title, year, season, episodes, targets, &template).await
            }
            RequestCommands::List { status } => request::cmd_list(status.as_deref()).await,
            RequestCommands::Get { id } => request::cmd_get(&id).await,
            RequestCommands::Watch { id, interval } => request::cmd_watch(&id, interval).await,
            RequestCommands::Cancel { id } => request::cmd_cancel(&id).await,
            RequestCommands::Retry { id } => request::cmd_retry(&id).await,
        },
        Commands::Template { command } => match command {
            TemplateCommands::List => template::cmd_list().await,
            TemplateCommands::Create { id, name, media_kind, steps_file } => {
                template::cmd_create(&id, &name, &media_kind, &steps_file).await
            }
            TemplateCommands::Validate { steps_file } => template::cmd_validate(&steps_file).await,
            TemplateCommands::Delete { id } => template::cmd_delete(&id).await,
        },
        Commands::Execution { command } => match command {
            ExecutionCommands::List { request_id } => execution::cmd_list(&request_id).await,
            ExecutionCommands::Get { id } => execution::cmd_get(&id).await,
            ExecutionCommands::Pause { id } => execution::cmd_pause(&id).await,
            ExecutionCommands::Resume { id } => execution::cmd_resume(&id).await,
            ExecutionCommands::Cancel { id } => execution::cmd_cancel(&id).await,
        },
        Commands::Worker { command } => match command {
            WorkerCommands::List => worker::cmd_list().await,
            WorkerCommands::Status { id } => worker::cmd_status(&id).await,
        },
        Commands::Server { command } => match command {
            ServerCommands::Run => server::cmd_run().await,
        },
        Commands::Recover { command } => match command {
            RecoverCommands::RunOnce => recover::cmd_run_once().await,
        },
    }
}
