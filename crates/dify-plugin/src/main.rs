use std::env;
use std::io::{self, IsTerminal};
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use dify_plugin::{AppConfig, AppState, build_router};

const APP_NAME: &str = "dify-plugin";

#[derive(Debug, Parser)]
#[command(name = APP_NAME)]
#[command(about = "Resource layer of the Dify Grafana app plugin")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", env = "DIFY_PLUGIN_CONFIG", global = true)]
    config: Option<PathBuf>,
    /// Reduce output to only errors
    #[arg(short, long, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,
    /// Disable ANSI colors in output
    #[arg(long = "no-color", global = true)]
    no_color: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the resource endpoints (default)
    Serve(ServeCommand),
    /// Print the effective configuration with secrets masked
    Config,
}

#[derive(Debug, Clone, Default, Args)]
struct ServeCommand {
    /// Address to bind to
    #[arg(short, long)]
    bind: Option<String>,
    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,
}

impl CommonOpts {
    fn level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    fn init_logging(&self) {
        use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

        let level = self.level();
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("dify_plugin={level},tower_http={level}")));

        if self.json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .ok();
        } else {
            let disable_color = self.no_color
                || env::var_os("NO_COLOR").is_some()
                || !io::stderr().is_terminal();

            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(io::stderr)
                        .with_ansi(!disable_color),
                )
                .try_init()
                .ok();
        }
    }

    /// Explicit `--config`, else the per-user config file if it exists.
    fn config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(|| {
            dirs::config_dir()
                .map(|dir| dir.join(APP_NAME).join("config.toml"))
                .filter(|path| path.exists())
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.common.init_logging();

    let config_path = cli.common.config_path();
    debug!("config file: {:?}", config_path);
    let config = AppConfig::load(config_path.as_deref())?;

    match cli.command.unwrap_or(Command::Serve(ServeCommand::default())) {
        Command::Serve(cmd) => serve(config, cmd).await,
        Command::Config => {
            print!("{}", config.to_redacted_toml()?);
            Ok(())
        }
    }
}

async fn serve(mut config: AppConfig, cmd: ServeCommand) -> Result<()> {
    if let Some(bind) = cmd.bind {
        config.server.bind = bind;
    }
    if let Some(port) = cmd.port {
        config.server.port = port;
    }

    if config.plugin.json_data.trim().is_empty() {
        warn!("No plugin jsonData configured; Dify endpoints will answer 400");
    }

    let state = AppState::new(config.plugin.clone(), config.upstream.clone())?;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = build_router(state, &config.server.base_path)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .context("invalid address")?;

    let listener = TcpListener::bind(addr)
        .await
        .context("binding to address")?;
    info!(
        "Serving resources on http://{}{}",
        addr, config.server.base_path
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running server")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
