//! Inefficiency Engine - CLI entry point

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use inefficiency_engine::api::commands::{self, CommandOutput};
use inefficiency_engine::constants::{APP_NAME, APP_VERSION};
use inefficiency_engine::logic::approval::Verdict;
use inefficiency_engine::logic::config::EngineConfig;

#[derive(Parser)]
#[command(name = "inefficiency", about = "Detects recurring inefficiencies in an interaction log and generates remediations", version)]
struct Cli {
    /// Data directory (defaults to INEFFICIENCY_HOME or the platform data dir).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Print JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Match and score the detection window.
    Detect {
        #[arg(long)]
        window_hours: Option<u64>,
    },

    /// Generate the artifact for one detected pattern.
    Generate {
        pattern: String,
    },

    /// Audit a session window; exit code reflects the grade.
    Audit {
        /// Session window in hours.
        window_hours: Option<u64>,
    },

    /// detect -> generate -> audit.
    Cycle {
        /// Generate every approved pattern instead of the highest-priority one.
        #[arg(long)]
        all: bool,
    },

    /// List patterns waiting for manual approval.
    Approvals,

    /// Approve a pattern waiting for manual approval.
    Approve {
        pattern: String,
        /// Name recorded with the decision (defaults to $USER).
        #[arg(long)]
        by: Option<String>,
    },

    /// Reject a pattern waiting for manual approval.
    Reject {
        pattern: String,
        #[arg(long)]
        by: Option<String>,
    },

    /// List candidate rules proposed by the auditor.
    Candidates,

    /// Merge a candidate rule into the pattern registry.
    ApproveCandidate {
        name: String,
    },

    /// Reject a candidate rule for good.
    RejectCandidate {
        name: String,
    },

    /// Show the registry index.
    Index,

    /// Create the data directory with a default registry and templates.
    Init,
}

fn approver(by: Option<String>) -> String {
    by.or_else(|| std::env::var("USER").ok())
        .or_else(|| std::env::var("USERNAME").ok())
        .or_else(|| hostname::get().ok().map(|h| h.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "operator".to_string())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = EngineConfig::from_env();
    if let Some(dir) = cli.data_dir {
        config = config.with_data_dir(dir);
    }

    log::debug!("{} v{} using {:?}", APP_NAME, APP_VERSION, config.data_dir());

    let output: CommandOutput = match cli.command {
        Commands::Detect { window_hours } => commands::detect(&config, window_hours),
        Commands::Generate { pattern } => commands::generate(&config, &pattern),
        Commands::Audit { window_hours } => commands::audit(&config, window_hours),
        Commands::Cycle { all } => commands::cycle(&config, all),
        Commands::Approvals => commands::approvals(&config),
        Commands::Approve { pattern, by } => commands::decide(&config, &pattern, Verdict::Approved, &approver(by)),
        Commands::Reject { pattern, by } => commands::decide(&config, &pattern, Verdict::Rejected, &approver(by)),
        Commands::Candidates => commands::candidates(&config),
        Commands::ApproveCandidate { name } => commands::approve_candidate(&config, &name),
        Commands::RejectCandidate { name } => commands::reject_candidate(&config, &name),
        Commands::Index => commands::index(&config),
        Commands::Init => commands::init(&config),
    };

    println!("{}", output.render(cli.json));
    ExitCode::from(output.exit_code.clamp(0, 255) as u8)
}
