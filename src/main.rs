//! Codebridge - session files and code execution over a stateless backend.
//!
//! Usage:
//!   codebridge serve [--port 8080] [--storage memory|redis]   # Start HTTP server
//!   codebridge exec --lang py script.py [-- args]              # One-off run

use clap::{Args, Parser, Subcommand};
use codebridge::backend::Judge0Client;
use codebridge::config::{ServeConfig, StorageKind};
use codebridge::executor::{ExecuteRequest, Executor};
use codebridge::http_server;
use codebridge::languages::Language;
use codebridge::state::AppState;
use codebridge::store::{FileStore, MemoryStore, RedisStore};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "codebridge")]
#[command(about = "Session files and code execution over a stateless execution backend")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server
    Serve(ServeConfig),
    /// Run a source file once against the backend and print the result
    Exec(ExecArgs),
}

#[derive(Args, Debug)]
struct ExecArgs {
    /// Language code (py, js, c, ...)
    #[arg(long)]
    lang: String,

    /// Source file to run
    file: PathBuf,

    /// Base URL of the execution backend
    #[arg(long, env = "JUDGE0_URL", default_value = "http://localhost:2358")]
    backend_url: String,

    /// Auth token sent to the execution backend
    #[arg(long, env = "JUDGE0_TOKEN")]
    backend_token: Option<String>,

    /// Upper bound on the backend round trip
    #[arg(long, default_value = "60")]
    timeout_secs: u64,

    /// Arguments passed to the program
    #[arg(last = true)]
    args: Vec<String>,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        "codebridge=debug,tower_http=debug"
    } else {
        "codebridge=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve(config) => {
            init_tracing(config.verbose);
            serve(config).await
        }
        Commands::Exec(args) => {
            init_tracing(false);
            exec_once(args).await
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn serve(config: ServeConfig) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let store: Arc<dyn FileStore> = match config.storage {
        StorageKind::Memory => Arc::new(MemoryStore::new(
            config.session_ttl(),
            config.cleanup_interval(),
        )),
        StorageKind::Redis => {
            Arc::new(RedisStore::connect(&config.redis_url, config.session_ttl()).await?)
        }
    };
    info!(
        "Using {:?} storage with {}s session TTL",
        config.storage,
        config.session_ttl().as_secs()
    );

    let backend = Judge0Client::new(
        config.backend_url.clone(),
        config.backend_token.clone(),
        config.request_timeout(),
    )?;
    let executor = Executor::new(backend, store.clone());
    let state = AppState::new(store.clone(), executor, config.api_key.clone());
    let app = http_server::router(state, config.max_upload_bytes);

    let served = http_server::run_server(config.addr()?, app, shutdown_signal()).await;

    info!("Shutting down, releasing store");
    store.destroy().await;
    served?;
    Ok(ExitCode::SUCCESS)
}

async fn exec_once(args: ExecArgs) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let language = Language::from_code(&args.lang)
        .ok_or_else(|| format!("Unsupported language: {}", args.lang))?;
    let code = tokio::fs::read_to_string(&args.file).await?;

    let store: Arc<dyn FileStore> = Arc::new(MemoryStore::new(
        Duration::from_secs(3600),
        Duration::from_secs(3600),
    ));
    let backend = Judge0Client::new(
        args.backend_url,
        args.backend_token,
        Duration::from_secs(args.timeout_secs),
    )?;
    let executor = Executor::new(backend, store.clone());

    let response = executor
        .execute(ExecuteRequest {
            language,
            code,
            files: Vec::new(),
            args: args.args,
        })
        .await?;
    store.destroy().await;

    print!("{}", response.stdout);
    eprint!("{}", response.stderr);
    if let Some(files) = &response.files {
        for file in files {
            eprintln!("produced {} ({}/{})", file.name, response.session_id, file.id);
        }
    }
    Ok(if response.stderr.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
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
                error!("Failed to listen for SIGTERM: {}", e);
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
