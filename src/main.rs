mod config;
mod routes;
mod state;
mod translate;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Result;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use state::AppState;

const DEFAULT_LOG_FILTER: &str = "translation_relay=info,tower_http=info";

#[tokio::main]
async fn main() -> Result<()> {
    let (config, loaded_path) = load_config()?;
    let _log_guard = init_tracing(config.system_config.log_file.as_deref());

    info!("Loaded configuration from: {}", loaded_path);

    let app_state = AppState::new(&config)?;

    let app = Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let addr: SocketAddr =
        format!("{}:{}", config.system_config.host, config.system_config.port).parse()?;
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Try `CONFIG_PATH`, the working directory, then the executable's directory
fn load_config() -> Result<(Config, String)> {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));

    let config_paths: Vec<String> = vec![
        std::env::var("CONFIG_PATH").ok(),
        Some("conf.yaml".to_string()),
        Some("conf.json".to_string()),
        exe_dir.join("conf.yaml").to_str().map(str::to_string),
        exe_dir.join("conf.json").to_str().map(str::to_string),
    ]
    .into_iter()
    .flatten()
    .collect();

    let mut errors = Vec::new();
    for path in &config_paths {
        match Config::load(path) {
            Ok(cfg) => return Ok((cfg, path.clone())),
            Err(e) => errors.push(format!("{}: {}", path, e)),
        }
    }

    Err(anyhow::anyhow!(
        "Could not load a config file. Tried: {:?}",
        errors
    ))
}

/// Stdout plus an optional append-only log file. The returned guard flushes the
/// file writer on drop and must live as long as the server.
fn init_tracing(log_file: Option<&str>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "server.log".into());
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    guard
}
