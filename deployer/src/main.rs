//! MadaHost deployer - Entry Point
//!
//! Clones GitHub repositories, builds them and publishes the static output.
//! Runs as a service exposing a trigger API, or deploys one project with
//! `--deploy=<project_id>`.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use anyhow::Context;
use colored::Colorize;

use madahost::app::options::AppOptions;
use madahost::app::run::run;
use madahost::app::state::AppState;
use madahost::logs::{init_logging, LogOptions};
use madahost::storage::settings::Settings;
use madahost::utils::version_info;

use tracing::{error, info};

const DEFAULT_SETTINGS_PATH: &str = "/etc/madahost/settings.json";

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", version.version),
        }
        return;
    }

    // Retrieve the settings file
    let settings_path = cli_args
        .get("settings")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH));
    let mut settings = match Settings::load(&settings_path).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{} {}", "Unable to read settings:".red(), e);
            std::process::exit(1);
        }
    };
    if let Some(level) = cli_args.get("log-level") {
        match level.parse() {
            Ok(level) => settings.log_level = level,
            Err(e) => eprintln!("{} {}", "Ignoring --log-level:".yellow(), e),
        }
    }

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        log_dir: settings.log_dir.clone(),
        json_format: settings.log_json,
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    let options = AppOptions::from(&settings);

    // Deploy a single project and exit
    if let Some(project_id) = cli_args.get("deploy") {
        match deploy_once(&options, project_id).await {
            Ok(true) => return,
            Ok(false) => std::process::exit(1),
            Err(e) => {
                eprintln!("{} {:#}", "Deployment failed:".red().bold(), e);
                std::process::exit(1);
            }
        }
    }

    // Run the service
    info!("Running MadaHost deployer {} with options: {:?}", version.version, options);
    if let Err(e) = run(options, await_shutdown_signal()).await {
        error!("Failed to run the deployer: {e}");
        std::process::exit(1);
    }
}

async fn deploy_once(options: &AppOptions, project_id: &str) -> anyhow::Result<bool> {
    let state = AppState::init(options)
        .await
        .context("unable to initialize the deployer")?;

    // Same admission as the API: one active deployment per project
    println!("{} {}", "Deploying project".cyan(), project_id.bold());
    let outcome = state
        .queue
        .deploy_and_wait(project_id)
        .await
        .with_context(|| format!("unable to deploy {}", project_id))?;

    if outcome.success {
        println!(
            "{} {} {}",
            "Deployed".green().bold(),
            outcome.deployment_id,
            outcome.url.as_deref().unwrap_or_default()
        );
    } else {
        println!(
            "{} {} ({}): {}",
            "Deployment".red().bold(),
            outcome.deployment_id,
            outcome.status,
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(outcome.success)
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {
                        info!("SIGTERM received, shutting down...");
                    }
                    _ = sigint.recv() => {
                        info!("SIGINT received, shutting down...");
                    }
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => {
                error!("Unable to install signal handlers: {}", e);
            }
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Unable to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Ctrl+C received, shutting down...");
}
