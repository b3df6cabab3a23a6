// Capsule configuration controller binary
use anyhow::{Context, Result};
use capsule_rs::config::ConfigLoader;
use capsule_rs::logging::{init_logging, LogFormat};
use capsule_rs::operator::{self, CapsuleConfiguration};
use clap::{Parser, Subcommand};
use kube::{Client, CustomResourceExt};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(
    name = "capsule-config-controller",
    version,
    about = "Keeps the Capsule cluster configuration validated"
)]
struct Cli {
    /// TOML settings file
    #[arg(long, env = "CAPSULE_CONFIG_FILE")]
    config_file: Option<PathBuf>,

    /// Name of the CapsuleConfiguration instance to reconcile
    #[arg(long)]
    configuration_name: Option<String>,

    /// Log level or EnvFilter directives
    #[arg(long)]
    log_level: Option<String>,

    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Command {
    /// Run the controller (default)
    Run,
    /// Print the CapsuleConfiguration CRD as YAML
    Crd,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Command::Crd) = cli.command {
        print!("{}", serde_yaml_ng::to_string(&CapsuleConfiguration::crd())?);
        return Ok(());
    }

    let config = ConfigLoader::new()
        .load_from_file(cli.config_file)
        .load_from_env()
        .with_override("configuration_name", cli.configuration_name)
        .with_override("logging.level", cli.log_level)
        .with_override("logging.format", cli.log_format.map(|f| f.as_str()))
        .build()
        .context("failed to load controller configuration")?;

    init_logging(&config.logging)?;

    info!(
        configuration = %config.configuration_name,
        "Starting Capsule configuration controller"
    );

    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;

    info!("Connected to Kubernetes cluster");

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    match operator::run_config_controller(client, &config, shutdown).await {
        Ok(()) => Ok(()),
        Err(err) if err.is_fatal() => {
            error!("Controller aborted: {:#}", anyhow::Error::from(err));
            std::process::exit(1);
        }
        Err(err) => Err(err.into()),
    }
}

async fn cancel_on_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(terminate) => terminate,
            Err(err) => {
                error!(error = %err, "cannot install SIGTERM handler");
                return;
            }
        };
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    error!(error = %err, "cannot listen for Ctrl-C");
                    return;
                }
            }
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "cannot listen for Ctrl-C");
        return;
    }

    info!("Shutdown signal received");
    shutdown.cancel();
}
