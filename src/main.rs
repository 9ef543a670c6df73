//! dm - local development process manager
//!
//! CLI front-end: every command except `run`, `config` and `server run`
//! talks to the control server through [`DmClient`].

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use devmanager::build::BuildDriver;
use devmanager::client::DmClient;
use devmanager::config::{ConfigResolver, FsConfigResolver, Settings, resolve_app_names, resolve_build_targets};
use devmanager::core::{app_command, resolve_log_path, wait_for_shutdown_signal};
use devmanager::{DmError, server, table};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// dm - local development process manager
#[derive(Parser, Debug)]
#[command(name = "dm")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins when set
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start apps ("all" selects every app)
    Start { names: Vec<String> },

    /// Stop apps
    Stop { names: Vec<String> },

    /// Restart apps
    Restart { names: Vec<String> },

    /// List the apps of the current workspace
    #[command(alias = "ls")]
    List,

    /// Enable apps and start them
    Enable { names: Vec<String> },

    /// Stop apps and keep them from starting
    Disable { names: Vec<String> },

    /// Compile projects/apps and restart the ones that changed
    Build {
        names: Vec<String>,

        /// Rebuild everything (tsc -f)
        #[arg(long)]
        force: bool,
    },

    /// Control server management
    #[command(subcommand)]
    Server(ServerCommands),

    /// Follow an app's log file
    Log { name: String },

    /// Print the dm version
    Version,

    /// Print the resolved workspace config
    Config,

    /// Run apps in the foreground with inherited stdio
    Run { names: Vec<String> },
}

#[derive(Subcommand, Debug)]
enum ServerCommands {
    /// Start the server in the background
    Start,
    /// Ask the server to shut down
    Stop,
    /// Stop, wait one second, start
    Restart,
    /// Check whether the server answers
    Ping,
    /// Run the server in the foreground
    Run {
        /// Write logs to this file instead of stdout
        #[arg(long)]
        log_file: Option<PathBuf>,
    },
}

fn init_logging(level: &str, server: Option<Option<&Path>>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    match server {
        Some(Some(log_file)) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_file)
                .with_context(|| format!("failed to open log file {}", log_file.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(file).with_ansi(false))
                .init();
        }
        Some(None) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(false)
                        .without_time(),
                )
                .init();
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let server_log = match &cli.command {
        Commands::Server(ServerCommands::Run { log_file }) => Some(log_file.as_deref()),
        _ => None,
    };
    let level = if server_log.is_some() && cli.log_level == "warn" {
        "info"
    } else {
        cli.log_level.as_str()
    };
    if let Err(e) = init_logging(level, server_log) {
        eprintln!("dm: {e:#}");
        std::process::exit(1);
    }

    let result = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")
        .and_then(|rt| rt.block_on(run(cli.command)));

    if let Err(e) = result {
        match e.downcast_ref::<DmError>() {
            Some(dm) if dm.is_reportable() => tracing::error!("{dm}"),
            _ => {
                tracing::error!("{e:#}");
                eprintln!("dm: {e:#}");
                std::process::exit(1);
            }
        }
    }
}

async fn run(command: Commands) -> Result<()> {
    let settings = Settings::from_env();
    let cwd = std::env::current_dir().context("failed to read the current directory")?;

    match command {
        Commands::Start { names } => {
            let client = client(&settings)?;
            client.start(&cwd, Some(&require_names(names)?)).await?;
            print_list(&client, &cwd).await
        }
        Commands::Stop { names } => {
            let client = client(&settings)?;
            client.stop(&cwd, Some(&require_names(names)?)).await?;
            print_list(&client, &cwd).await
        }
        Commands::Restart { names } => {
            let client = client(&settings)?;
            client.restart(&cwd, Some(&require_names(names)?)).await?;
            print_list(&client, &cwd).await
        }
        Commands::List => print_list(&client(&settings)?, &cwd).await,
        Commands::Enable { names } => enable(&settings, &cwd, names, true).await,
        Commands::Disable { names } => enable(&settings, &cwd, names, false).await,
        Commands::Build { names, force } => build(&settings, &cwd, names, force).await,
        Commands::Server(cmd) => server_command(&settings, cmd).await,
        Commands::Log { name } => log(&settings, &cwd, &name).await,
        Commands::Version => {
            println!("dm version {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Config => {
            let config = FsConfigResolver::new().load(&cwd).await?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Run { names } => run_foreground(&settings, &cwd, names).await,
    }
}

fn client(settings: &Settings) -> Result<DmClient> {
    Ok(DmClient::from_settings(settings)?)
}

fn require_names(names: Vec<String>) -> Result<Vec<String>, DmError> {
    if names.is_empty() {
        return Err(DmError::user("App name is missing"));
    }
    Ok(names)
}

async fn print_list(client: &DmClient, cwd: &Path) -> Result<()> {
    let apps = client.list(cwd).await?;
    println!();
    print!("{}", table::render(&apps, true));
    Ok(())
}

async fn enable(settings: &Settings, cwd: &Path, names: Vec<String>, on: bool) -> Result<()> {
    let client = client(settings)?;
    client.enable(cwd, Some(&require_names(names)?), on).await?;
    print_list(&client, cwd).await
}

async fn build(settings: &Settings, cwd: &Path, names: Vec<String>, force: bool) -> Result<()> {
    let names = require_names(names)?;
    let config = FsConfigResolver::new().load(cwd).await?;
    let targets = resolve_build_targets(&config, &names)?;

    let driver = BuildDriver::new(Arc::new(client(settings)?), cwd)
        .force(force)
        .limit(settings.build_limit());
    let totals = driver.run(&targets).await;
    println!("{} errors, {} files", totals.errors, totals.files);
    Ok(())
}

async fn server_command(settings: &Settings, cmd: ServerCommands) -> Result<()> {
    let client = client(settings)?;
    match cmd {
        ServerCommands::Start => server_start(&client).await,
        ServerCommands::Stop => server_stop(&client).await,
        ServerCommands::Restart => {
            server_stop(&client).await?;
            tokio::time::sleep(Duration::from_secs(1)).await;
            server_start(&client).await
        }
        ServerCommands::Ping => {
            if client.is_alive().await {
                println!("ALIVE");
                Ok(())
            } else {
                Err(DmError::ServerUnavailable.into())
            }
        }
        ServerCommands::Run { .. } => {
            server::run(settings.clone())
                .await
                .context("control server failed")?;
            Ok(())
        }
    }
}

async fn server_start(client: &DmClient) -> Result<()> {
    if client.is_alive().await {
        return Err(DmError::user("DM server is already running").into());
    }

    let exe = std::env::current_exe().context("failed to locate the dm executable")?;
    let log_file = std::env::temp_dir().join("dm.log");
    let mut cmd = std::process::Command::new(exe);
    cmd.args(["server", "run", "--log-file"])
        .arg(&log_file)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    let child = cmd.spawn().context("failed to spawn the dm server")?;
    println!("DM server started (pid {}, log {})", child.id(), log_file.display());
    Ok(())
}

async fn server_stop(client: &DmClient) -> Result<()> {
    match client.shutdown().await {
        Ok(()) | Err(DmError::ServerUnavailable) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn log(settings: &Settings, cwd: &Path, name: &str) -> Result<()> {
    let app = client(settings)?.app(cwd, name).await?;
    let template = app
        .config
        .log
        .ok_or_else(|| DmError::user(format!("No log path is defined for app {name}")))?;
    let path = resolve_log_path(&template, app.pid)
        .ok_or_else(|| DmError::user(format!("App {name} is not running")))?;

    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        tracing::warn!("Application log file was not found at: {}", path.display());
        return Ok(());
    }

    let status = tokio::process::Command::new("tail")
        .arg("-f")
        .arg(&path)
        .status()
        .await
        .context("failed to run tail")?;
    tracing::debug!(?status, "tail exited");
    Ok(())
}

async fn run_foreground(settings: &Settings, cwd: &Path, names: Vec<String>) -> Result<()> {
    let names = require_names(names)?;
    let config = FsConfigResolver::new().load(cwd).await?;
    let names = resolve_app_names(&config, Some(&names))?;

    let mut children = Vec::new();
    for name in &names {
        let app = config.app(name)?;
        let runtime = app.runtime.as_deref().unwrap_or(&settings.runtime);
        let mut cmd = app_command(app, runtime)?;
        cmd.stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        let child = cmd
            .spawn()
            .with_context(|| format!("failed to start {}", app.name))?;
        tracing::info!(app = %app.name, pid = ?child.id(), "running");
        children.push(child);
    }

    let waits = futures::future::join_all(children.iter_mut().map(|c| c.wait()));
    tokio::select! {
        results = waits => {
            for (name, res) in names.iter().zip(results) {
                match res {
                    Ok(status) => tracing::info!(app = %name, %status, "exited"),
                    Err(e) => tracing::warn!(app = %name, error = %e, "wait failed"),
                }
            }
        }
        res = wait_for_shutdown_signal() => {
            res.context("failed to register signal handlers")?;
            tracing::info!("interrupted; stopping apps");
        }
    }
    Ok(())
}
