//! Binary entry point: argument parsing, logging, and the HTTP listener.
use anyhow::Context;
use clap::Parser;
use gateway_core::catalog::DescriptorCatalog;
use gateway_core::endpoint::Endpoint;
use gateway_core::proxy::GrpcProxy;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod routes;

/// Schema-less JSON to gRPC gateway.
///
/// Discovers the backend's services over gRPC server reflection and proxies
/// JSON requests to them without any generated stubs.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Address the HTTP listener binds to
    #[arg(long, env = "GATEWAY_LISTEN", default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// Host of the default gRPC backend
    #[arg(long, env = "GRPC_BACKEND_HOST", default_value = "127.0.0.1")]
    backend_host: String,

    /// Port of the default gRPC backend
    #[arg(long, env = "GRPC_BACKEND_PORT", default_value = "50051")]
    backend_port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let backend = Endpoint::new(args.backend_host.clone(), args.backend_port);
    tracing::info!(listen = %args.listen, %backend, "starting gateway");

    let catalog = Arc::new(DescriptorCatalog::new(backend));
    let app = routes::router(GrpcProxy::new(catalog));

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to install the shutdown signal handler");
    }
}
