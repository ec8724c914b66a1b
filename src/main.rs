use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::process::ExitCode;
use std::sync::Arc;

use ssbird::apply::{ApplyParams, BranchPlan};
use ssbird::config::SsbirdConfig;
use ssbird::controller::{
    ApplyRequest, Completion, ConsoleNotifier, Controller, InitializeOutcome, InitializeRequest,
};
use ssbird::remote_config::{ConfigKey, ConfigStore, Configuration, FileConfigStore};
use ssbird::telemetry::init_telemetry;

#[derive(Parser)]
#[command(name = "ssbird")]
#[command(about = "Publish spreadsheets to a Git repository as CSV")]
#[command(long_about = "SSBird renders spreadsheets to CSV through your apply endpoint and hands \
                       the files to the native host, which commits, pushes and optionally opens \
                       a pull request. Start with 'ssbird init' to save your settings.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Save local settings, download extension-config.json and bootstrap the host
    Init {
        /// Git repository the host clones and pushes to
        #[arg(long)]
        repository_url: Option<String>,
        /// GitHub username used for commits and PR titles
        #[arg(long)]
        username: Option<String>,
        /// GitHub access token handed to the host
        #[arg(long)]
        token: Option<String>,
        /// Email used for commits
        #[arg(long)]
        email: Option<String>,
        /// Document id of extension-config.json
        #[arg(long)]
        config_file_id: Option<String>,
    },
    /// Render the spreadsheets and publish them through the host
    Apply(ApplyArgs),
    /// Show the branches and PR an apply would produce, without running it
    Plan(ApplyArgs),
    /// Display the stored configuration with secrets masked
    Status,
}

#[derive(Args, Debug, Clone)]
struct ApplyArgs {
    /// Spreadsheet to render; repeat for several, they are processed in order
    #[arg(long = "spreadsheet-id", required = true)]
    spreadsheet_ids: Vec<String>,
    /// Sheet whose branch receives the result
    #[arg(long = "target-sheet")]
    target_sheet: String,
    /// Sheets to merge in; with --create-pr the last one is pushed
    #[arg(long = "merge-sheet")]
    merge_sheets: Vec<String>,
    #[arg(short = 'm', long, default_value = "Update from spreadsheet")]
    commit_message: String,
    #[arg(long, default_value = "main")]
    parent_branch: String,
    /// Open a pull request into the target sheet's branch
    #[arg(long)]
    create_pr: bool,
}

impl From<ApplyArgs> for ApplyParams {
    fn from(args: ApplyArgs) -> Self {
        ApplyParams {
            spreadsheet_ids: args.spreadsheet_ids,
            target_sheet_name: args.target_sheet,
            merge_sheet_names: args.merge_sheets,
            commit_message: args.commit_message,
            parent_branch_name: args.parent_branch,
            create_pr: args.create_pr,
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    SsbirdConfig::load_env_file()?;
    let settings = ssbird::config::config()?;
    init_telemetry(&settings.observability)?;

    match cli.command {
        Commands::Init {
            repository_url,
            username,
            token,
            email,
            config_file_id,
        } => {
            let mut fields = Configuration::default();
            let entered = [
                (ConfigKey::RepositoryUrl, repository_url),
                (ConfigKey::GitHubUsername, username),
                (ConfigKey::GitHubAccessToken, token),
                (ConfigKey::GitHubEmail, email),
                (ConfigKey::ConfigFileId, config_file_id),
            ];
            for (key, value) in entered {
                if let Some(value) = value {
                    fields.set(key, value);
                }
            }
            tokio::runtime::Runtime::new()?.block_on(async { init_command(settings, fields).await })
        }
        Commands::Apply(args) => {
            tokio::runtime::Runtime::new()?.block_on(async { apply_command(settings, args.into()).await })
        }
        Commands::Plan(args) => {
            tokio::runtime::Runtime::new()?.block_on(async { plan_command(settings, args.into()).await })
        }
        Commands::Status => {
            tokio::runtime::Runtime::new()?.block_on(async { status_command(settings).await })
        }
    }
}

fn open_store(settings: &SsbirdConfig) -> Arc<FileConfigStore> {
    Arc::new(FileConfigStore::new(settings.storage.path.clone()))
}

fn connect(settings: &SsbirdConfig, store: Arc<FileConfigStore>) -> Result<Controller> {
    Controller::connect(settings, store, Arc::new(ConsoleNotifier))
        .with_context(|| format!("Could not start native host '{}'", settings.host.command))
}

async fn init_command(settings: &SsbirdConfig, fields: Configuration) -> Result<ExitCode> {
    println!("🐦 Initializing SSBird");

    let store = open_store(settings);
    let stored = store.load().await.context("Could not read stored configuration")?;
    let controller = connect(settings, store)?.with_configuration(stored);

    print!("🔄 Downloading extension-config.json and starting host... ");
    std::io::Write::flush(&mut std::io::stdout())?;

    let result = controller
        .initialize(InitializeRequest {
            fields,
            on_done: Completion::noop(),
        })
        .await;
    controller.shutdown().await?;

    match result {
        Ok(InitializeOutcome::Initialized) => {
            println!("✅");
            println!("Configuration saved to {}", settings.storage.path.display());
            Ok(ExitCode::SUCCESS)
        }
        Ok(InitializeOutcome::Parked) => {
            println!("⏸️");
            println!("Configuration saved, but no config file id is set.");
            println!("Run 'ssbird init --config-file-id <ID>' to finish.");
            Ok(ExitCode::FAILURE)
        }
        Err(_) => Ok(ExitCode::FAILURE),
    }
}

async fn apply_command(settings: &SsbirdConfig, params: ApplyParams) -> Result<ExitCode> {
    println!(
        "🚀 Applying {} spreadsheet(s) to '{}'",
        params.spreadsheet_ids.len(),
        params.target_sheet_name
    );

    let store = open_store(settings);
    let stored = store.load().await.context("Could not read stored configuration")?;
    let controller = connect(settings, store)?;

    // Each host process starts without a clone, so bootstrap it first
    let bootstrap = controller
        .initialize(InitializeRequest {
            fields: stored,
            on_done: Completion::noop(),
        })
        .await;

    let result = match bootstrap {
        Ok(InitializeOutcome::Initialized) => {
            controller
                .apply(ApplyRequest {
                    params,
                    on_done: Completion::noop(),
                })
                .await
        }
        Ok(InitializeOutcome::Parked) => {
            println!("⚠️  No config file id stored. Run 'ssbird init' first.");
            controller.shutdown().await?;
            return Ok(ExitCode::FAILURE);
        }
        Err(_) => {
            controller.shutdown().await?;
            return Ok(ExitCode::FAILURE);
        }
    };
    controller.shutdown().await?;

    match result {
        Ok(outcome) => {
            println!();
            println!(
                "📦 {} file(s) pushed to {}",
                outcome.artifacts, outcome.plan.target_branch_name
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(_) => Ok(ExitCode::FAILURE),
    }
}

async fn plan_command(settings: &SsbirdConfig, params: ApplyParams) -> Result<ExitCode> {
    let store = open_store(settings);
    let stored = store.load().await.context("Could not read stored configuration")?;
    let username = stored.usable(ConfigKey::GitHubUsername).unwrap_or("<username>");

    let plan = match BranchPlan::compute(&params, username) {
        Ok(plan) => plan,
        Err(e) => {
            println!("❌ {e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    println!("🗺️  Branch plan");
    println!("   Target branch:  {}", plan.target_branch_name);
    println!("   Parents:        {}", plan.parent_branch_names.join(", "));
    if plan.creates_pr() {
        println!("   Pull request:   {}", plan.pr_title);
        println!("   PR base:        {}", plan.pr_base_branch_name);
    } else {
        println!("   Pull request:   none");
    }
    Ok(ExitCode::SUCCESS)
}

async fn status_command(settings: &SsbirdConfig) -> Result<ExitCode> {
    let store = open_store(settings);
    let stored = store.load().await.context("Could not read stored configuration")?;

    println!("📋 Stored configuration ({})", settings.storage.path.display());
    let entries = stored.redacted_entries();
    if entries.is_empty() {
        println!("   (empty) Run 'ssbird init' to get started.");
    }
    for (key, shown) in entries {
        println!("   {key:<18} {shown}");
    }
    println!();
    println!("🔌 Native host: {}", settings.host.command);
    Ok(ExitCode::SUCCESS)
}
