use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use huddle_api::Channel;
use huddle_controller::{Reconciler, RunOptions};
use huddle_kubehub::{KubeStore, WatchScope, SERVICE_ACCOUNT_NAMESPACE_FILE};
use huddle_slack::WebApiClient;
use kube::CustomResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod config;

use config::{EnvOverrides, OperatorConfig};

#[derive(Parser, Debug)]
#[command(name = "huddlectl", version, about = "Declarative Slack channels for Kubernetes")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Operator config file (YAML); falls back to CONFIG_FILE_PATH
    #[arg(long = "config", env = "HUDDLE_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the channel controller until SIGINT/SIGTERM
    Run {
        /// Namespaces to watch, comma-separated (default: all)
        #[arg(long = "watch-namespace", env = "WATCH_NAMESPACE")]
        watch_namespace: Option<String>,
    },
    /// Print the Channel CustomResourceDefinition
    Crd,
    /// Print the effective configuration
    Config,
}

fn init_tracing() {
    let env = std::env::var("HUDDLE_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("HUDDLE_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid HUDDLE_METRICS_ADDR; expected host:port");
        }
    }
}

fn config_path(flag: Option<PathBuf>) -> Option<PathBuf> {
    flag.or_else(|| std::env::var_os("CONFIG_FILE_PATH").filter(|v| !v.is_empty()).map(PathBuf::from))
}

fn effective_config(flag: Option<PathBuf>, env: &EnvOverrides) -> Result<OperatorConfig> {
    let path = config_path(flag);
    let mut cfg = OperatorConfig::load(path.as_deref())?;
    cfg.apply_env(env)?;
    cfg.validate()?;
    if let Some(p) = &path {
        info!(path = %p.display(), "config loaded");
    }
    Ok(cfg)
}

/// Cancel `token` on SIGINT or SIGTERM.
async fn watch_signals(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("SIGINT received"),
                    _ = term.recv() => info!("SIGTERM received"),
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable; only SIGINT stops the controller");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("interrupt received");
    }
    token.cancel();
}

async fn run(cfg: OperatorConfig, env: EnvOverrides, watch_namespace: Option<String>) -> Result<()> {
    let client = huddle_kubehub::connect().await?;
    let token = match env.slack_api_token {
        Some(t) => {
            info!("using Slack token from SLACK_API_TOKEN");
            t
        }
        None => {
            let ns = huddle_kubehub::operator_namespace(env.operator_namespace.as_deref(), Path::new(SERVICE_ACCOUNT_NAMESPACE_FILE))?;
            let secret = &cfg.slack.api_token;
            huddle_kubehub::load_secret_value(client.clone(), &ns, &secret.secret_name, &secret.key)
                .await
                .context("loading Slack API token")?
        }
    };
    let slack = WebApiClient::new(token, cfg.web_api()).context("building Slack client")?;
    let store = KubeStore::new(client.clone());
    let reconciler = Reconciler::new(Arc::new(slack), Arc::new(store), cfg.settings());

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    let opts = RunOptions { scope: WatchScope::parse(watch_namespace.as_deref()), concurrency: cfg.reconcile.concurrency };
    huddle_controller::run(reconciler, client, opts, shutdown).await
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let env = EnvOverrides::from_env();

    match cli.command {
        Commands::Run { watch_namespace } => {
            let cfg = effective_config(cli.config, &env)?;
            info!(watch = ?watch_namespace, concurrency = cfg.reconcile.concurrency, "run invoked");
            run(cfg, env, watch_namespace).await?;
        }
        Commands::Crd => {
            let crd = Channel::crd();
            match cli.output {
                Output::Human => print!("{}", serde_yaml::to_string(&crd)?),
                Output::Json => println!("{}", serde_json::to_string_pretty(&crd)?),
            }
        }
        Commands::Config => {
            let cfg = effective_config(cli.config, &env)?;
            match cli.output {
                Output::Human => print!("{}", serde_yaml::to_string(&cfg)?),
                Output::Json => println!("{}", serde_json::to_string_pretty(&cfg)?),
            }
        }
    }
    Ok(())
}
