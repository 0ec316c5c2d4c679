use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

use downstream_sync::logger;
use downstream_sync::signals::shutdown_signal;
use downstream_sync::{
    ChangeWatcher, CommandRunner, Config, ConflictResolver, Layout, ProcessRunner,
    ProjectResolver, SyncEngine, Vcs,
};

#[derive(Parser)]
#[command(name = "ds")]
#[command(about = "Keep downstream project trees in sync with upstream changes")]
#[command(version)]
struct Cli {
    /// Keep syncing projects as their upstream files change
    #[arg(short, long)]
    watch: bool,

    /// Resolve downstream merge conflicts (ignores PROJECT arguments)
    #[arg(short, long)]
    resolve: bool,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Projects to sync; detected from pending upstream changes when omitted
    #[arg(value_name = "PROJECT")]
    projects: Vec<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ds: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = logger::init(cli.verbose, &config.logging) {
        eprintln!("ds: {:#}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(cli, config).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

/// Load configuration from specified path or default location
fn load_config(config_path: Option<&std::path::Path>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load(path),
        None => Config::load_or_default(),
    }
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    let timeout = config.sync.command_timeout();
    let root = workspace_root(&config).await?;

    let process_runner = ProcessRunner::new(root.clone(), timeout);
    debug!("Workspace root: {}", process_runner.workdir().display());
    let runner: Arc<dyn CommandRunner> = Arc::new(process_runner);

    let layout = Layout::from_config(&config.workspace);
    let vcs = Vcs::new(runner.clone(), config.vcs.clone());
    let engine = SyncEngine::new(runner, config.sync.clone());

    if cli.resolve {
        let resolution = ConflictResolver::new(vcs, engine, layout).resolve().await?;
        info!(
            "Resolved conflicts in {} project(s), {} path(s) marked",
            resolution.synced_projects.len(),
            resolution.marked_paths
        );
        return Ok(());
    }

    let projects = ProjectResolver::new(vcs, layout.clone())
        .resolve(&cli.projects)
        .await?;

    if cli.watch {
        let mut watcher = ChangeWatcher::new(engine, layout, config.watch, root);
        let state = watcher.run(&projects, shutdown_signal()).await?;
        debug!("Watch session ended in state {:?}", state);
        return Ok(());
    }

    engine.sync_projects(&projects).await;
    Ok(())
}

/// Configured root, or the one reported by the version-control tool
async fn workspace_root(config: &Config) -> Result<PathBuf> {
    if let Some(root) = &config.workspace.root {
        return Ok(PathBuf::from(root));
    }

    let cwd = std::env::current_dir()?;
    let runner: Arc<dyn CommandRunner> =
        Arc::new(ProcessRunner::new(cwd, config.sync.command_timeout()));
    Vcs::new(runner, config.vcs.clone()).root().await
}
