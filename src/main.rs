use anyhow::Context;
use clap::Parser;
use pdfqa::{
    api::{self, AppState},
    chat::ConnectionManager,
    config::{self, Config},
    logging,
    metrics::ServiceMetrics,
    processing::DocumentPipeline,
    session::SessionStore,
    upload::UploadService,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

const PORT_RANGE: std::ops::RangeInclusive<u16> = 8000..=8099;

/// PDF Q&A backend: upload a PDF, get a summary, and ask questions over a WebSocket.
#[derive(Debug, Parser)]
#[command(name = "pdfqa", version, about)]
struct Cli {
    /// Port to listen on. Overrides `SERVER_PORT`.
    #[arg(long)]
    port: Option<u16>,
    /// Directory receiving uploaded PDFs. Overrides `UPLOAD_DIR`.
    #[arg(long)]
    upload_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    logging::init_tracing();
    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(port) = cli.port {
        config.server_port = Some(port);
    }
    if let Some(upload_dir) = cli.upload_dir {
        config.upload_dir = upload_dir;
    }
    let config = config::install_config(config).context("Failed to install configuration")?;

    let metrics = Arc::new(ServiceMetrics::new());
    let sessions = Arc::new(SessionStore::new());
    let pipeline = Arc::new(DocumentPipeline::from_config(config, Arc::clone(&metrics)));
    let uploads = Arc::new(UploadService::new(
        Arc::clone(&sessions),
        pipeline,
        config.upload_dir.clone(),
    ));
    uploads
        .ensure_upload_dir()
        .await
        .with_context(|| format!("Failed to create {}", uploads.upload_dir().display()))?;

    let app = api::create_router(AppState {
        sessions,
        connections: Arc::new(ConnectionManager::new()),
        uploads,
        metrics,
        upload_limit: config.max_upload_bytes,
    });

    let (listener, port) = bind_listener(config)
        .await
        .context("Failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

async fn bind_listener(config: &Config) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = config.server_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 8000-8099",
    ))
}
