//! Batching InfluxDB v2 writer.
//!
//! Each [`InfluxWriter`] owns a background task that receives encoded
//! points over an unbounded channel and POSTs them to the write API every
//! flush interval, or earlier once [`MAX_BATCH`] points are buffered.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, interval_at};

use super::{DataPoint, TelemetryTarget, TelemetryWriter};
use crate::domain::PoolFactory;
use crate::error::RelayError;

/// Buffered points that trigger an early flush.
pub const MAX_BATCH: usize = 500;

enum Command {
    Point(String),
    Close(oneshot::Sender<Result<(), String>>),
}

/// Telemetry writer backed by a flush task.
#[derive(Debug)]
pub struct InfluxWriter {
    tx: mpsc::UnboundedSender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Point(line) => f.debug_tuple("Point").field(line).finish(),
            Self::Close(_) => f.write_str("Close"),
        }
    }
}

impl InfluxWriter {
    /// Starts a writer for `target`. Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidMetadata`] if the target URL is invalid.
    pub fn spawn(
        target: &TelemetryTarget,
        client: reqwest::Client,
        flush_interval: Duration,
        http_timeout: Duration,
    ) -> Result<Self, RelayError> {
        let sink = Sink {
            url: target.write_url()?,
            token: target.token.clone(),
            client,
            http_timeout,
        };
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(sink, rx, flush_interval));
        Ok(Self { tx })
    }
}

#[async_trait]
impl TelemetryWriter for InfluxWriter {
    fn submit(&self, point: DataPoint) {
        let Some(line) = point.to_line_protocol() else {
            tracing::warn!(measurement = %point.measurement, "dropping telemetry point without fields");
            return;
        };
        if self.tx.send(Command::Point(line)).is_err() {
            tracing::warn!("telemetry writer closed, dropping point");
        }
    }

    async fn close(&self) -> Result<(), RelayError> {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Close(done_tx)).is_err() {
            return Ok(());
        }
        match done_rx.await {
            Ok(result) => result.map_err(RelayError::Telemetry),
            Err(_) => Ok(()),
        }
    }
}

struct Sink {
    url: reqwest::Url,
    token: Option<String>,
    client: reqwest::Client,
    http_timeout: Duration,
}

impl Sink {
    async fn flush(&self, buffer: &mut Vec<String>) -> Result<(), String> {
        if buffer.is_empty() {
            return Ok(());
        }
        let count = buffer.len();
        let body = std::mem::take(buffer).join("\n");

        let mut request = self
            .client
            .post(self.url.clone())
            .timeout(self.http_timeout)
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Token {token}"));
        }

        match request.send().await.and_then(reqwest::Response::error_for_status) {
            Ok(_) => {
                tracing::debug!(points = count, url = %self.url, "telemetry flushed");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(points = count, url = %self.url, error = %e, "telemetry flush failed");
                Err(e.to_string())
            }
        }
    }
}

async fn run(sink: Sink, mut rx: mpsc::UnboundedReceiver<Command>, flush_interval: Duration) {
    let mut buffer = Vec::new();
    let mut ticker = interval_at(Instant::now() + flush_interval, flush_interval);

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Point(line)) => {
                    buffer.push(line);
                    if buffer.len() >= MAX_BATCH {
                        let _ = sink.flush(&mut buffer).await;
                    }
                }
                Some(Command::Close(done)) => {
                    let _ = done.send(sink.flush(&mut buffer).await);
                    break;
                }
                None => {
                    let _ = sink.flush(&mut buffer).await;
                    break;
                }
            },
            _ = ticker.tick() => {
                let _ = sink.flush(&mut buffer).await;
            }
        }
    }
}

/// Builds [`InfluxWriter`]s for the telemetry pool.
#[derive(Debug, Clone)]
pub struct InfluxWriterFactory {
    client: reqwest::Client,
    flush_interval: Duration,
    http_timeout: Duration,
}

impl InfluxWriterFactory {
    /// Creates a factory sharing one HTTP client across writers.
    #[must_use]
    pub fn new(flush_interval: Duration, http_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            flush_interval,
            http_timeout,
        }
    }
}

#[async_trait]
impl PoolFactory<TelemetryTarget, Arc<dyn TelemetryWriter>> for InfluxWriterFactory {
    fn create(&self, config: &TelemetryTarget) -> Result<Arc<dyn TelemetryWriter>, RelayError> {
        tracing::debug!(url = %config.url, bucket = %config.bucket, "starting telemetry writer");
        let writer = InfluxWriter::spawn(
            config,
            self.client.clone(),
            self.flush_interval,
            self.http_timeout,
        )?;
        Ok(Arc::new(writer))
    }

    async fn release(
        &self,
        _config: TelemetryTarget,
        handle: Arc<dyn TelemetryWriter>,
    ) -> Result<(), RelayError> {
        handle.close().await
    }
}
