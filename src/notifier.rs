//! Progress notifier
//!
//! Every concurrent pipeline writes through one [`ProgressNotifier`], which
//! serializes writes onto the session's single outbound [`EventSink`].
//! The first failed write closes the notifier and cancels the session.

use crate::{
    error::{AppError, Result},
    logging::Logger,
    models::ProgressEvent,
};
use async_trait::async_trait;
use futures::{stream::SplitSink, SinkExt};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{tungstenite::Message, WebSocketStream};
use tokio_util::sync::CancellationToken;

/// Outbound transport carrying serialized events
#[async_trait]
pub trait EventSink: Send {
    /// Deliver one serialized event
    async fn send(&mut self, message: String) -> Result<()>;

    /// Flush and release the transport
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Sends each event as one WebSocket text frame
pub struct WebSocketSink<S> {
    inner: SplitSink<WebSocketStream<S>, Message>,
}

impl<S> WebSocketSink<S> {
    pub fn new(inner: SplitSink<WebSocketStream<S>, Message>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S> EventSink for WebSocketSink<S>
where
    S: tokio::io::AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, message: String) -> Result<()> {
        self.inner.send(Message::Text(message)).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.close().await?;
        Ok(())
    }
}

/// Writes each event as one JSON line
pub struct WriterSink<W> {
    writer: W,
}

impl<W> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl WriterSink<tokio::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

#[async_trait]
impl<W> EventSink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, message: String) -> Result<()> {
        self.writer.write_all(message.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.flush().await?;
        Ok(())
    }
}

/// Forwards events into an in-process channel
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<String>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn send(&mut self, message: String) -> Result<()> {
        self.sender
            .send(message)
            .map_err(|_| AppError::notification("event receiver dropped"))
    }
}

/// Single-writer event notifier shared by all tasks of a session
pub struct ProgressNotifier {
    sink: Mutex<Box<dyn EventSink>>,
    closed: AtomicBool,
    sent: AtomicU64,
    cancel: CancellationToken,
    logger: Logger,
}

impl ProgressNotifier {
    /// Wrap a sink; a write failure cancels `cancel`
    pub fn new(sink: Box<dyn EventSink>, cancel: CancellationToken, logger: &Logger) -> Self {
        Self {
            sink: Mutex::new(sink),
            closed: AtomicBool::new(false),
            sent: AtomicU64::new(0),
            cancel,
            logger: logger.child("NOTIFY"),
        }
    }

    /// Serialize and deliver one event
    ///
    /// Writes from concurrent callers never interleave. Once a write has
    /// failed every later call returns `AppError::Notification` without
    /// touching the sink.
    pub async fn emit(&self, event: ProgressEvent) -> Result<()> {
        if self.is_closed() {
            return Err(AppError::notification("notifier closed"));
        }

        let message = event.to_message();
        let mut sink = self.sink.lock().await;

        // Another writer may have failed while this one waited for the lock
        if self.is_closed() {
            return Err(AppError::notification("notifier closed"));
        }

        match sink.send(message).await {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.closed.store(true, Ordering::SeqCst);
                self.cancel.cancel();
                self.logger
                    .warn(&format!("Event delivery failed, cancelling session: {}", e))
                    .field("event", event.kind())
                    .error_info(&e)
                    .log()
                    .await;
                Err(AppError::notification(format!("failed to deliver {}: {}", event.kind(), e)))
            }
        }
    }

    /// Deliver an event when the caller cannot act on a failure
    ///
    /// The failure itself has already closed the notifier and cancelled
    /// the session.
    pub async fn emit_best_effort(&self, event: ProgressEvent) {
        let _ = self.emit(event).await;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of events delivered so far
    pub fn events_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Close the underlying sink; later emits fail
    pub async fn close(&self) -> Result<()> {
        let mut sink = self.sink.lock().await;
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        sink.close().await
    }
}
