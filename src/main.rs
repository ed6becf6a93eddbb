pub mod api;
pub mod app;
pub mod bgp;
pub mod config;
pub mod db;
pub mod gpg;
pub mod ipc;
pub mod middleware;
pub mod peer;
pub mod privsep;
pub mod registry;
pub mod session;
pub mod wireguard;
pub mod worker;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "autopeerd", version, about = "Automated DN42 peering daemon")]
struct Opts {
    /// Configuration file
    #[arg(short = 'f', long = "config", default_value = "/etc/autopeer.conf")]
    config: PathBuf,

    /// Parse the configuration, report problems and exit
    #[arg(short = 'n', long = "config-test")]
    config_test: bool,

    /// Log level
    #[arg(
        short = 'd',
        long = "log-level",
        default_value = "info",
        value_parser = ["debug", "info", "warn", "error", "critical"]
    )]
    log_level: String,
}

fn main() -> ExitCode {
    let opts = Opts::parse();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing; "critical" is accepted for syslog familiarity
    let default_level = match opts.log_level.as_str() {
        "critical" => "error",
        other => other,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let config = match config::AppConfig::from_file(&opts.config) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    if opts.config_test {
        println!("configuration file {} OK", opts.config.display());
        return ExitCode::SUCCESS;
    }

    // the worker half needs root for interfaces and /etc
    if !privsep::running_as_root() {
        error!("autopeerd must be started as root");
        return ExitCode::FAILURE;
    }

    match privsep::split() {
        Ok(privsep::Role::Worker(stream)) => {
            let provisioner =
                worker::provision::Provisioner::new(config.autopeer.asn, config.bgp.clone());
            worker::run(stream, provisioner);
            ExitCode::SUCCESS
        }
        Ok(privsep::Role::Frontend(stream)) => run_frontend(config, stream),
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run_frontend(config: config::AppConfig, stream: std::os::unix::net::UnixStream) -> ExitCode {
    if let Err(e) = privsep::drop_privileges(&config.autopeer.user, &config.autopeer.group) {
        error!("{e}");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };
    match runtime.block_on(serve(config, stream)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn serve(
    config: config::AppConfig,
    stream: std::os::unix::net::UnixStream,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(config);
    let tokens = Arc::new(session::TokenCache::new());
    let state = app::AppState {
        config: config.clone(),
        tokens: tokens.clone(),
        db: Arc::new(db::PeerDb::open(&config.autopeer.db_dir)?),
        worker: Arc::new(ipc::client::WorkerChannel::new(stream)?),
        verifier: Arc::new(gpg::GnupgKeyring),
    };

    // periodic eviction of expired session tokens
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(session::SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            tokens.sweep();
        }
    });

    let router = api::router(state);
    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    info!("autopeerd front-end listening on {}", listener.local_addr()?);
    axum::serve(listener, router).await?;
    Ok(())
}
