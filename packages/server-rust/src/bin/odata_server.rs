//! `odata-server`: serves a JSON metadata model over HTTP.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use odata_core::{MetadataCache, SchemaProvider};
use odata_server::network::{NetworkConfig, NetworkModule, ODataHttpHandler};
use odata_server::service::{JsonDebugSupport, ODataHandler, ServerConfig};
use odata_server::telemetry::{self, LogFormat};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "odata-server", version, about = "Serve an OData metadata model over HTTP")]
struct Cli {
    /// JSON model document to serve.
    #[arg(long, env = "ODATA_METADATA")]
    metadata: PathBuf,

    #[arg(long, env = "ODATA_HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "ODATA_PORT", default_value_t = 8080)]
    port: u16,

    /// Path the service is mounted under.
    #[arg(long, env = "ODATA_SERVICE_PATH", default_value = "/odata")]
    service_path: String,

    /// Application prefix in front of the service path.
    #[arg(long, env = "ODATA_CONTEXT_PATH", default_value = "")]
    context_path: String,

    /// Leading resource-path segments used for service resolution.
    #[arg(long, env = "ODATA_SPLIT", default_value_t = 0)]
    split: usize,

    /// Accept `/Set/key` as well as `/Set(key)`.
    #[arg(long, env = "ODATA_KEY_AS_SEGMENT")]
    key_as_segment: bool,

    #[arg(long, env = "ODATA_MAX_BODY_BYTES", default_value_t = 4 * 1024 * 1024)]
    max_body_bytes: usize,

    #[arg(long, env = "ODATA_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    request_timeout_secs: u64,

    /// Comma-separated allowed CORS origins; `*` allows any.
    #[arg(long, env = "ODATA_CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    cors_origins: Vec<String>,

    /// Honor `odata-debug=json` on requests.
    #[arg(long, env = "ODATA_DEBUG")]
    debug: bool,

    #[arg(long, env = "ODATA_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Serve Prometheus metrics on this port.
    #[arg(long, env = "ODATA_METRICS_PORT")]
    metrics_port: Option<u16>,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            service_path: self.service_path.clone(),
            context_path: self.context_path.clone(),
            split: self.split,
            key_as_segment: self.key_as_segment,
            max_body_bytes: self.max_body_bytes,
        }
    }

    fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            cors_origins: self.cors_origins.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            ..NetworkConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.log_format, "info")?;

    if let Some(port) = cli.metrics_port {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
        telemetry::init_metrics(addr)?;
        info!(%addr, "prometheus exporter listening");
    }

    let provider = SchemaProvider::from_path(&cli.metadata)
        .with_context(|| format!("loading metadata model {}", cli.metadata.display()))?;
    let metadata = Arc::new(MetadataCache::new(Arc::new(provider)));

    let mut odata = ODataHttpHandler::new(ODataHandler::new(
        metadata,
        Arc::new(cli.server_config()),
    ));
    if cli.debug {
        odata.register_debug_support(Arc::new(JsonDebugSupport));
        info!("debug output enabled");
    }

    let mut module = NetworkModule::new(cli.network_config(), odata);
    let port = module.start().await?;
    info!(port, service_path = %cli.service_path, "odata-server started");

    module.serve(shutdown_signal()).await?;
    info!("odata-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
