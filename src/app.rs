//! Application orchestration: WebSocket server and single-run mode

use crate::{
    cli::{Cli, Command},
    config::{display_config_summary, load_config, ServerConfig},
    error::{AppError, Result},
    log_debug, log_info, log_warn,
    logging::Logger,
    notifier::{WebSocketSink, WriterSink},
    session::{Collaborators, Session, SessionOutcome},
};
use futures::{stream::SplitStream, StreamExt};
use std::net::SocketAddr;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{tungstenite::Message, WebSocketStream};
use tokio_util::sync::CancellationToken;

/// Main application struct that coordinates all components
pub struct App {
    cli: Cli,
}

impl App {
    /// Create a new application instance with CLI configuration
    pub fn new(cli: Cli) -> Result<Self> {
        cli.validate().map_err(AppError::config)?;
        Ok(Self { cli })
    }

    /// Run the selected command
    pub async fn run(self) -> Result<()> {
        let config = load_config(self.cli.clone())?;
        let logger = Logger::with_config("APP".to_string(), &config);

        if config.debug {
            eprintln!(
                "{} v{} ({}, {}, built {})",
                crate::PKG_NAME,
                crate::VERSION,
                crate::GIT_COMMIT.unwrap_or("unknown commit"),
                crate::TARGET_TRIPLE,
                crate::BUILD_TIME
            );
            eprintln!("{}", display_config_summary(&config));
        }

        let collaborators = Collaborators::from_config(&config, &logger)?;

        match &self.cli.command {
            Command::Serve { .. } => {
                let shutdown = CancellationToken::new();
                spawn_ctrl_c(shutdown.clone());

                let server = Server::new(config, collaborators, &logger);
                let listener = server.bind().await?;
                server.serve(listener, shutdown).await
            }
            Command::Run { request } => {
                let payload = read_request(request).await?;
                let outcome = run_once(&config, collaborators, &payload).await?;
                log_info!(
                    logger,
                    "Session {} finished: {} ok, {} results",
                    outcome.session_id,
                    outcome.summary.success_fraction(),
                    outcome.results.len()
                );
                Ok(())
            }
        }
    }
}

/// Cancel `token` on Ctrl-C
fn spawn_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
}

/// Read the request from a file, or from stdin for `-`
pub async fn read_request(source: &str) -> Result<String> {
    let payload = if source == "-" {
        let mut buffer = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buffer)
            .await
            .map_err(|e| AppError::io(format!("Failed to read request from stdin: {}", e)))?;
        buffer
    } else {
        tokio::fs::read_to_string(source)
            .await
            .map_err(|e| AppError::io(format!("Failed to read request {}: {}", source, e)))?
    };

    let payload = payload.trim().to_string();
    if payload.is_empty() {
        return Err(AppError::decode("empty request"));
    }
    Ok(payload)
}

/// Run one session writing JSON lines to stdout; Ctrl-C cancels it
pub async fn run_once(config: &ServerConfig, collaborators: Collaborators, payload: &str) -> Result<SessionOutcome> {
    let cancel = CancellationToken::new();
    spawn_ctrl_c(cancel.clone());

    let session = Session::new(config, collaborators, cancel).await;
    session.run(payload, Box::new(WriterSink::stdout())).await
}

/// WebSocket front end, one session per connection
pub struct Server {
    config: ServerConfig,
    collaborators: Collaborators,
    logger: Logger,
}

impl Server {
    pub fn new(config: ServerConfig, collaborators: Collaborators, logger: &Logger) -> Self {
        Self {
            config,
            collaborators,
            logger: logger.child("SERVER"),
        }
    }

    /// Bind the configured listen address
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.config.listen_socket_addr()?;
        TcpListener::bind(addr)
            .await
            .map_err(|e| AppError::network(format!("Failed to bind {}: {}", addr, e)))
    }

    /// Accept connections until `shutdown` fires
    ///
    /// Shutdown cancels every running session.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let local = listener.local_addr()?;
        log_info!(self.logger, "Listening on ws://{}", local);

        loop {
            let (stream, peer) = tokio::select! {
                _ = shutdown.cancelled() => {
                    log_info!(self.logger, "Shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        log_warn!(self.logger, "Accept failed: {}", e);
                        continue;
                    }
                },
            };

            let config = self.config.clone();
            let collaborators = self.collaborators.clone();
            let logger = self.logger.clone();
            let cancel = shutdown.child_token();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer, config, collaborators, cancel, &logger).await {
                    log_warn!(logger, "Connection {} ended with error: {}", peer, e);
                }
            });
        }
    }
}

/// Run one session over an accepted connection
///
/// The first text frame is the request. Later frames are only watched for
/// a disconnect, which cancels the session.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    config: ServerConfig,
    collaborators: Collaborators,
    cancel: CancellationToken,
    logger: &Logger,
) -> Result<()> {
    let socket = tokio_tungstenite::accept_async(stream).await?;
    let (write, mut read) = socket.split();
    log_debug!(logger, "Client connected: {}", peer);

    let payload = loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => break text,
            Some(Ok(Message::Close(_))) | None => return Ok(()),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    };

    let session = Session::new(&config, collaborators, cancel.clone()).await;
    let watcher = tokio::spawn(watch_disconnect(read, cancel));

    let outcome = session.run(&payload, Box::new(WebSocketSink::new(write))).await;
    watcher.abort();

    let outcome = outcome?;
    log_info!(
        logger,
        "Session {} for {} finished: {} ok{}",
        outcome.session_id,
        peer,
        outcome.summary.success_fraction(),
        if outcome.is_cancelled() { " (cancelled)" } else { "" }
    );
    Ok(())
}

/// Cancel the session once the client goes away
async fn watch_disconnect(mut read: SplitStream<WebSocketStream<TcpStream>>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            frame = read.next() => match frame {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    cancel.cancel();
                    return;
                }
                Some(Ok(_)) => {}
            },
        }
    }
}
