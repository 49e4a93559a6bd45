//! DOGG API server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use dogg_api::AppState;
use dogg_api::config::ApiConfig;
use dogg_core::auth::InMemoryUserStore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const DEFAULT_LOG_FILTER: &str = "info,dogg_api=debug,dogg_core=debug";

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "dogg_api_server", about = "DOGG API server")]
struct Args {
    /// Port to listen on; overrides the port of `--bind` / `BIND_ADDR`.
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Listener address.
    #[arg(long, env = "BIND_ADDR")]
    bind: Option<String>,

    /// Log output format.
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

impl Args {
    fn bind_addr(&self, config: &ApiConfig) -> String {
        let base = self.bind.clone().unwrap_or_else(|| config.bind_addr.clone());
        match self.port {
            None => base,
            Some(port) => {
                let host = base.rsplit_once(':').map(|(h, _)| h).unwrap_or(&base);
                format!("{host}:{port}")
            }
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn shutdown_signal(ct: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("ctrl-c received, shutting down"),
        _ = terminate => info!("SIGTERM received, shutting down"),
        _ = ct.cancelled() => {}
    }
    ct.cancel();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(args.log_format);

    let mut config = ApiConfig::from_env()?;
    config.bind_addr = args.bind_addr(&config);

    info!(
        bind_addr = %config.bind_addr,
        rate_limit = config.rate_limit.enabled,
        bcrypt_cost = config.bcrypt_cost,
        "starting dogg_api_server"
    );

    let state = AppState::new(config.clone(), Arc::new(InMemoryUserStore::new()))?;
    let sweepers = state.limiters.spawn_sweep_tasks(&config.rate_limit);
    let app = dogg_api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    let local_addr = listener.local_addr()?;
    info!(target: "security", addr = %local_addr, "DOGG API server started");

    let ct = CancellationToken::new();
    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(ct.clone()))
    .await;

    for handle in sweepers {
        handle.abort();
    }
    result?;
    info!("server stopped");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("dogg_api_server").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn port_overrides_configured_bind_port() {
        let config = ApiConfig::default();
        let args = Args {
            port: Some(8080),
            bind: None,
            log_format: LogFormat::Text,
        };
        assert_eq!(args.bind_addr(&config), "127.0.0.1:8080");
    }

    #[test]
    fn bind_flag_wins_over_config() {
        let config = ApiConfig::default();
        let args = Args {
            port: None,
            bind: Some("0.0.0.0:9000".into()),
            log_format: LogFormat::Json,
        };
        assert_eq!(args.bind_addr(&config), "0.0.0.0:9000");
    }

    #[test]
    fn log_format_flag_parses() {
        assert_eq!(parse(&["--log-format", "json"]).log_format, LogFormat::Json);
    }
}
