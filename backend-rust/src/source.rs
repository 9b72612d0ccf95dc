//! # source
//!
//! Line sources and the producer task.
//!
//! The producer owns exactly one [`LineSource`], decodes every line, and pushes
//! measurements into the ingest channel. It touches no other shared state; its
//! lifecycle is published through a `watch` channel of [`SourceStatus`] so the
//! rest of the process can observe end-of-stream or an unavailable transport
//! without anything crashing.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use crate::decoder::decode_measurement;
use crate::error::SourceError;
use crate::ingest::{MeasurementSender, StopSignal};

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ── Source abstraction ────────────────────────────────────────────────────────

/// Anything that yields raw text lines. `Ok(None)` is end-of-stream.
#[allow(async_fn_in_trait)]
pub trait LineSource {
    async fn next_raw_line(&mut self) -> Result<Option<String>, SourceError>;

    /// Human-readable name for logs and status.
    fn name(&self) -> &str;
}

/// Line reader over any buffered async reader (log file, stdin, in-memory bytes).
pub struct ReaderSource<R> {
    reader: R,
    name: String,
    /// Pause after each line, used to replay log files at a readable pace.
    replay_delay: Option<Duration>,
    buf: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> ReaderSource<R> {
    pub fn new(reader: R, name: impl Into<String>) -> Self {
        Self { reader, name: name.into(), replay_delay: None, buf: Vec::with_capacity(256) }
    }

    pub fn with_replay_delay(mut self, delay: Duration) -> Self {
        self.replay_delay = (!delay.is_zero()).then_some(delay);
        self
    }
}

impl<R: AsyncBufRead + Unpin> LineSource for ReaderSource<R> {
    async fn next_raw_line(&mut self) -> Result<Option<String>, SourceError> {
        self.buf.clear();
        let n = self.reader.read_until(b'\n', &mut self.buf).await?;
        if n == 0 {
            return Ok(None);
        }
        if let Some(delay) = self.replay_delay {
            tokio::time::sleep(delay).await;
        }
        // Serial noise is common; undecodable bytes are replaced, not fatal.
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }

    fn name(&self) -> &str { &self.name }
}

/// Largest datagram read in one piece; longer ones are cut off by the socket.
const RECV_BUF_BYTES: usize = 4096;

/// Pause after a failed receive before trying again.
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// UDP listener; a datagram may carry one or several newline-separated lines.
pub struct UdpLineSource {
    socket: UdpSocket,
    name: String,
    pending: std::collections::VecDeque<String>,
    buf: Vec<u8>,
}

impl UdpLineSource {
    pub async fn bind(addr: SocketAddr) -> Result<Self, SourceError> {
        let name = format!("udp://{addr}");
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|error| SourceError::Unavailable { source_name: name.clone(), error })?;
        Ok(Self { socket, name, pending: Default::default(), buf: vec![0u8; RECV_BUF_BYTES] })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> { self.socket.local_addr() }
}

impl LineSource for UdpLineSource {
    async fn next_raw_line(&mut self) -> Result<Option<String>, SourceError> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                return Ok(Some(line));
            }
            match self.socket.recv_from(&mut self.buf).await {
                Ok((len, src)) => {
                    trace!("UDP: {len} bytes from {src}");
                    let mut data = &self.buf[..len];
                    if len == self.buf.len() {
                        warn!("UDP: datagram from {src} filled the {len}-byte buffer and was truncated");
                        // The last line is cut off
                        let end = data.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);
                        data = &data[..end];
                    }
                    let text = String::from_utf8_lossy(data);
                    self.pending.extend(
                        text.lines().filter(|l| !l.trim().is_empty()).map(str::to_owned),
                    );
                }
                Err(e) => {
                    // A bad datagram must not end the stream
                    warn!("UDP: recv error on {}: {e}", self.name);
                    tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                }
            }
        }
    }

    fn name(&self) -> &str { &self.name }
}

// ── Transport selection ───────────────────────────────────────────────────────

/// Which transport to open for the producer.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceSpec {
    /// Replay a captured serial log
    LogFile { path: PathBuf, replay_delay: Duration },
    /// Read lines from standard input (e.g. a serial terminal piped in)
    Stdin,
    /// Listen for lines over UDP
    Udp { addr: SocketAddr },
}

impl SourceSpec {
    pub async fn open(&self) -> Result<AnySource, SourceError> {
        match self {
            Self::LogFile { path, replay_delay } => {
                let name = path.display().to_string();
                let file = tokio::fs::File::open(path)
                    .await
                    .map_err(|error| SourceError::Unavailable { source_name: name.clone(), error })?;
                Ok(AnySource::LogFile(
                    ReaderSource::new(BufReader::new(file), name).with_replay_delay(*replay_delay),
                ))
            }
            Self::Stdin => Ok(AnySource::Stdin(ReaderSource::new(
                BufReader::new(tokio::io::stdin()),
                "stdin",
            ))),
            Self::Udp { addr } => Ok(AnySource::Udp(UdpLineSource::bind(*addr).await?)),
        }
    }
}

/// Opened transport, dispatched statically.
pub enum AnySource {
    LogFile(ReaderSource<BufReader<tokio::fs::File>>),
    Stdin(ReaderSource<BufReader<tokio::io::Stdin>>),
    Udp(UdpLineSource),
}

impl LineSource for AnySource {
    async fn next_raw_line(&mut self) -> Result<Option<String>, SourceError> {
        match self {
            Self::LogFile(s) => s.next_raw_line().await,
            Self::Stdin(s) => s.next_raw_line().await,
            Self::Udp(s) => s.next_raw_line().await,
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::LogFile(s) => s.name(),
            Self::Stdin(s) => s.name(),
            Self::Udp(s) => s.name(),
        }
    }
}

// ── Producer status ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceStatus {
    Starting,
    Running { source: String },
    /// Source exhausted (log replay finished)
    EndOfStream,
    /// Cooperative stop requested
    Stopped,
    /// Transport could not be opened or failed irrecoverably
    Unavailable { reason: String },
}

impl SourceStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Starting | Self::Running { .. })
    }
}

/// Create the status channel, starting in `Starting`.
pub fn status_channel() -> (watch::Sender<SourceStatus>, watch::Receiver<SourceStatus>) {
    watch::channel(SourceStatus::Starting)
}

// ── Producer task ─────────────────────────────────────────────────────────────

/// Counters reported when the producer exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerStats {
    pub lines: u64,
    pub measurements: u64,
    pub skipped: u64,
}

/// Open `spec` and run the producer until end-of-stream, stop, or failure.
pub async fn run_producer(
    spec: SourceSpec,
    tx: MeasurementSender,
    stop: StopSignal,
    status: watch::Sender<SourceStatus>,
) -> ProducerStats {
    match spec.open().await {
        Ok(source) => pump(source, tx, stop, status).await,
        Err(e) => {
            error!("Source failed to open: {e}");
            status.send_replace(SourceStatus::Unavailable { reason: e.to_string() });
            ProducerStats::default()
        }
    }
}

/// Drive an already-open source. Every read races the stop signal, so a stop
/// takes effect without waiting for the next line.
pub async fn pump<S: LineSource>(
    mut source: S,
    tx: MeasurementSender,
    mut stop: StopSignal,
    status: watch::Sender<SourceStatus>,
) -> ProducerStats {
    let mut stats = ProducerStats::default();
    info!("📡 Reading range reports from {}", source.name());
    status.send_replace(SourceStatus::Running { source: source.name().to_string() });

    let final_status = loop {
        if stop.is_stopped() {
            break SourceStatus::Stopped;
        }

        let next = tokio::select! {
            biased;
            _ = stop.cancelled() => break SourceStatus::Stopped,
            next = source.next_raw_line() => next,
        };

        let line = match next {
            Ok(Some(line)) => line,
            Ok(None) => break SourceStatus::EndOfStream,
            Err(e) => {
                error!("Source {} failed: {e}", source.name());
                break SourceStatus::Unavailable { reason: e.to_string() };
            }
        };
        stats.lines += 1;

        let Some(measurement) = decode_measurement(&line, now_ms()) else {
            stats.skipped += 1;
            trace!("skipped line: {:?}", line.trim_end());
            continue;
        };

        debug!("Parsed: {} = {} m", measurement.anchor_id, measurement.distance_m);
        stats.measurements += 1;
        if !tx.push(measurement) {
            info!("Consumer gone, producer exiting");
            break SourceStatus::Stopped;
        }
    };

    info!(
        "Producer finished ({final_status:?}): {} lines, {} measurements, {} skipped",
        stats.lines, stats.measurements, stats.skipped
    );
    status.send_replace(final_status);
    stats
}
