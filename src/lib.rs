pub mod api;
pub mod cli;
pub mod clients;
pub mod config;
pub mod console;
pub mod db;
pub mod entities;
pub mod services;
pub mod state;
pub mod storage;

use anyhow::Context;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
pub use config::Config;
use config::ServerConfig;

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load()?;
    config.validate()?;

    let prometheus_handle = if config.observability.metrics_enabled {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        info!("Prometheus metrics recorder initialized");
        Some(handle)
    } else {
        None
    };

    init_tracing(&config)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config, prometheus_handle).await,

        Commands::InitDb => cli::cmd_init_db(&config).await,

        Commands::AddAdmin {
            username,
            password,
            email,
        } => cli::cmd_add_admin(&config, &username, &password, email.as_deref()).await,

        Commands::ListAdmins => cli::cmd_list_admins(&config).await,

        Commands::MigrateAdmins => cli::cmd_migrate_admins(&config).await,

        Commands::Whoami {
            email,
            password,
            server,
        } => cli::cmd_whoami(&config, &email, &password, server.as_deref()).await,

        Commands::Init => {
            if Config::create_default_if_missing()? {
                println!("✓ Config file created. Edit config.toml and run again.");
            } else {
                println!("config.toml already exists.");
            }
            Ok(())
        }
    }
}

fn init_tracing(config: &Config) -> anyhow::Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    let fmt_layer = tracing_subscriber::fmt::layer();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    if config.observability.loki_enabled {
        let url = url::Url::parse(&config.observability.loki_url).context("Invalid Loki URL")?;

        let mut builder = tracing_loki::builder();
        for (key, value) in &config.observability.loki_labels {
            builder = builder.label(key.as_str(), value.as_str())?;
        }
        let (layer, task) = builder
            .extra_field("pid", std::process::id().to_string())?
            .build_url(url)?;

        tokio::spawn(task);

        registry.with(layer).init();
        info!(
            "Loki logging initialized at {}",
            config.observability.loki_url
        );
    } else {
        registry.init();
    }

    Ok(())
}

/// Binds the configured port, moving to the next one while ports are taken.
pub async fn bind_with_retry(server: &ServerConfig) -> anyhow::Result<TcpListener> {
    for offset in 0..=server.port_retry_attempts {
        let Some(port) = server.port.checked_add(offset) else {
            break;
        };

        match TcpListener::bind((server.bind_address.as_str(), port)).await {
            Ok(listener) => return Ok(listener),
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                warn!(port, "Port in use, trying the next one");
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to bind {}:{}", server.bind_address, port)
                });
            }
        }
    }

    anyhow::bail!(
        "No free port in {}..={}",
        server.port,
        server.port.saturating_add(server.port_retry_attempts)
    )
}

async fn serve(config: Config, prometheus_handle: Option<PrometheusHandle>) -> anyhow::Result<()> {
    info!("academy-admin v{} starting...", env!("CARGO_PKG_VERSION"));

    let server_config = config.server.clone();
    let state = api::create_app_state_from_config(config, prometheus_handle).await?;
    let app = api::router(state).await?;

    let listener = bind_with_retry(&server_config).await?;
    let addr = listener.local_addr()?;
    info!("🌐 Web Server running at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Web server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_moves_past_taken_port() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let taken_port = taken.local_addr().unwrap().port();

        let server = ServerConfig {
            bind_address: "127.0.0.1".to_string(),
            port: taken_port,
            port_retry_attempts: 5,
            ..ServerConfig::default()
        };

        let listener = bind_with_retry(&server).await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), taken_port);
    }

    #[tokio::test]
    async fn bind_without_retries_fails_on_taken_port() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let server = ServerConfig {
            bind_address: "127.0.0.1".to_string(),
            port: taken.local_addr().unwrap().port(),
            port_retry_attempts: 0,
            ..ServerConfig::default()
        };

        assert!(bind_with_retry(&server).await.is_err());
    }
}
