//! EchoPost: local relay agent.
//!
//! Listens on a unix socket, accepts records from pipelines whose primary
//! server is unreachable, and delivers them through its own pipeline with
//! the relay tier disabled (primary, then fallback, then disk).

#![deny(clippy::pedantic, clippy::all, clippy::nursery)]

#[cfg(not(unix))]
compile_error!("echopost needs unix domain sockets");

use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use nadhi::{DEFAULT_DIR, Pipeline, PipelineRelay, ResolvedConfig};
use nadhi_common::{Signal, config::ConfigFile, internal, logging};
use nadhi_relay::{RELAY_DIR, RelayServer, SOCKET_NAME};
use tokio::sync::broadcast;

#[derive(Debug, Parser)]
#[command(name = "echopost", about = "Local relay agent for nadhi pipelines", version)]
struct Args {
    /// Agent directory holding config.ron and the spool
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Socket to listen on [default: <dir>/data-nadhi-agent.sock]
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Primary server base URL
    #[arg(long)]
    primary: Option<String>,

    /// Fallback server base URL
    #[arg(long)]
    fallback: Option<String>,

    /// API key sent to the servers, otherwise taken from the environment
    #[arg(long)]
    api_key: Option<String>,

    #[arg(long)]
    queue_size: Option<usize>,

    #[arg(long)]
    workers: Option<usize>,
}

impl Args {
    fn dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DIR).join(RELAY_DIR))
    }

    fn socket(&self) -> PathBuf {
        self.socket
            .clone()
            .unwrap_or_else(|| self.dir().join(SOCKET_NAME))
    }

    /// The agent's own configuration: `config.ron` and the environment,
    /// overridden by the command line.
    fn config(&self) -> anyhow::Result<ResolvedConfig> {
        let file = ConfigFile::load(&self.dir())?;
        let file = ConfigFile {
            api_key: self.api_key.clone().or(file.api_key),
            queue_size: self.queue_size.or(file.queue_size),
            workers: self.workers.or(file.workers),
            primary_endpoint: self.primary.clone().or(file.primary_endpoint),
            fallback_endpoint: self.fallback.clone().or(file.fallback_endpoint),
            ..file
        };

        let mut config = file.resolve(|key| std::env::var(key).ok())?;
        config.echopost_disabled = true;
        config.relay_binary = None;

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let args = Args::parse();
    let config = args.config()?;

    let pipeline = Arc::new(
        Pipeline::builder()
            .dir(args.dir())
            .config(config)
            .build()?,
    );

    let server = RelayServer::new(
        args.socket(),
        Arc::new(PipelineRelay::new(Arc::clone(&pipeline))),
    );
    internal!(
        level = INFO,
        "EchoPost listening on {}",
        server.socket_path().display()
    );

    let (shutdown, receiver) = broadcast::channel(4);
    let mut serve = tokio::spawn(async move { server.serve(receiver).await });

    tokio::select! {
        result = &mut serve => {
            // The server stopped on its own, usually because it never bound
            result??;
        }
        result = shutdown_signal() => {
            result?;
            let _ = shutdown.send(Signal::Shutdown);
            serve.await??;
        }
    }

    let report = pipeline.flush().await;
    internal!(
        level = INFO,
        "EchoPost stopped: {} delivered, {} on disk, timed out: {}",
        report.stats.delivered(),
        report.stats.on_disk(),
        report.timed_out
    );

    Ok(())
}

async fn shutdown_signal() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            internal!(level = INFO, "CTRL+C entered, shutting down");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate signal received, shutting down");
        }
    }

    Ok(())
}
