use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use larder_gateway::{Authorities, router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "larder_server=debug,larder_gateway=debug,larder_db=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let db_path = std::env::var("LARDER_DB_PATH").unwrap_or_else(|_| "larder.db".into());
    let host = std::env::var("LARDER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("LARDER_PORT")
        .unwrap_or_else(|_| "8787".into())
        .parse()?;

    // One database holds every authority's persisted copy
    let db = Arc::new(larder_db::Database::open(&PathBuf::from(&db_path))?);
    info!("{} persisted stores in {}", db.document_ids()?.len(), db_path);
    let authorities = Authorities::new(db);

    let app = router(authorities.clone());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Larder sync server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    authorities.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Ctrl+C received, saving stores and stopping"),
            _ = sigterm.recv() => info!("SIGTERM received, saving stores and stopping"),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Ctrl+C received, saving stores and stopping");
    }
}
