use clap::Parser;
use rekon_server::{bind, load_seed, serve, Service};
use rekon_store::MemoryStore;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "rekon-server", about = "In-memory resource store speaking the rekon protocol v1")]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value_t = 8443)]
    port: u16,

    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// JSON array of objects to load before serving.
    #[arg(long)]
    seed: Option<PathBuf>,

    /// Require this bearer token on resource requests.
    #[arg(long)]
    token: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let store = Arc::new(MemoryStore::new());
    if let Some(ref path) = cli.seed {
        match load_seed(&store, path) {
            Ok(count) => info!("seeded {count} objects from {}", path.display()),
            Err(e) => {
                error!("{e}");
                return ExitCode::FAILURE;
            }
        }
    }

    let addr = format!("{}:{}", cli.host, cli.port);
    let server = match bind(&addr) {
        Ok(server) => Arc::new(server),
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = Arc::clone(&server);
    if let Err(e) = ctrlc::set_handler(move || {
        info!("shutdown requested");
        shutdown.unblock();
    }) {
        error!("failed to install signal handler: {e}");
    }

    info!("starting rekon-server on {addr}");
    if cli.token.is_some() {
        info!("bearer token required");
    }
    let service = Service::new(store).with_token(cli.token);
    serve(&server, &service);
    info!("stopped");
    ExitCode::SUCCESS
}
