// src/listener.rs
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder, FramedRead};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::address::Address;
use crate::aggregator::EventSink;
use crate::models::domain::{ConnectionEvent, Role};
use crate::parser;

pub const DEFAULT_PORT: u16 = 9999;
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);
const FRAGMENT_BYTES: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerSettings {
    /// Longest record accepted before the connection is dropped.
    pub max_line_bytes: usize,
    /// Close peers that send nothing for this long.
    pub idle_timeout: Option<Duration>,
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            idle_timeout: None,
        }
    }
}

/// Why a connection handler stopped.
#[derive(Debug)]
pub enum CloseReason {
    PeerClosed,
    LineTooLong,
    IdleTimeout,
    ReadError(io::Error),
    QueueClosed,
    Shutdown,
}

/// Per-connection tallies, logged when the handler exits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSummary {
    pub lines: u64,
    pub events: u64,
    pub skipped: u64,
}

/// Accepts log feeds and turns each line into connection events.
pub struct ConnectionListener {
    listener: TcpListener,
    settings: ListenerSettings,
}

impl ConnectionListener {
    pub async fn bind(addr: &str, port: u16, settings: ListenerSettings) -> io::Result<Self> {
        let listener = TcpListener::bind((addr, port)).await?;
        info!(addr = %listener.local_addr()?, "listening for connection logs");
        Ok(Self { listener, settings })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop until `shutdown` fires, then waits for every
    /// open connection to finish. Accept failures are logged and retried.
    pub async fn serve(self, sink: EventSink, shutdown: CancellationToken) {
        let mut handlers = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        info!(%peer, "new connection");
                        handlers.spawn(handle_connection(
                            stream,
                            peer,
                            sink.clone(),
                            self.settings,
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed, retrying");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(finished) = handlers.join_next(), if !handlers.is_empty() => {
                    if let Err(e) = finished {
                        warn!(error = %e, "connection handler panicked");
                    }
                }
            }
        }

        drop(self.listener);
        drop(sink);
        info!(open = handlers.len(), "listener closed, draining connections");
        while let Some(finished) = handlers.join_next().await {
            if let Err(e) = finished {
                warn!(error = %e, "connection handler panicked");
            }
        }
    }
}

/// Binds and serves in one step; a failed bind is returned to the caller.
pub async fn serve(
    addr: &str,
    port: u16,
    sink: EventSink,
    settings: ListenerSettings,
    shutdown: CancellationToken,
) -> io::Result<()> {
    ConnectionListener::bind(addr, port, settings)
        .await?
        .serve(sink, shutdown)
        .await;
    Ok(())
}

pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    sink: EventSink,
    settings: ListenerSettings,
    shutdown: CancellationToken,
) -> ConnectionSummary {
    let codec = AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), Vec::new(), settings.max_line_bytes);
    let mut lines = FramedRead::new(stream, codec);
    let mut summary = ConnectionSummary::default();

    let reason = loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break CloseReason::Shutdown,
            next = next_line(&mut lines, settings.idle_timeout) => next,
        };

        let line = match next {
            Ok(Some(line)) => line,
            Ok(None) => break CloseReason::PeerClosed,
            Err(reason) => break reason,
        };
        summary.lines += 1;

        if line.iter().all(u8::is_ascii_whitespace) {
            debug!(%peer, "skipping blank line");
            continue;
        }

        let mut queue_closed = false;
        for event in decode_line(&line, peer) {
            match event {
                Some(event) => {
                    if sink.send(event).await.is_err() {
                        queue_closed = true;
                        break;
                    }
                    summary.events += 1;
                }
                None => summary.skipped += 1,
            }
        }
        if queue_closed {
            break CloseReason::QueueClosed;
        }
    };

    match &reason {
        CloseReason::PeerClosed | CloseReason::Shutdown => {
            info!(%peer, ?reason, lines = summary.lines, events = summary.events, skipped = summary.skipped, "connection closed");
        }
        CloseReason::ReadError(e) => {
            warn!(%peer, error = %e, lines = summary.lines, "error reading from connection, closing");
        }
        CloseReason::LineTooLong => {
            warn!(%peer, max = settings.max_line_bytes, lines = summary.lines, "record exceeds maximum size, closing");
        }
        CloseReason::IdleTimeout => {
            warn!(%peer, lines = summary.lines, "connection idle, closing");
        }
        CloseReason::QueueClosed => {
            warn!(%peer, "event queue closed, dropping connection");
        }
    }
    summary
}

type LineReader = FramedRead<TcpStream, AnyDelimiterCodec>;
type Line = <AnyDelimiterCodec as Decoder>::Item;

async fn next_line(
    lines: &mut LineReader,
    idle_timeout: Option<Duration>,
) -> Result<Option<Line>, CloseReason> {
    let next = match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, lines.next())
            .await
            .map_err(|_| CloseReason::IdleTimeout)?,
        None => lines.next().await,
    };
    match next {
        None => Ok(None),
        Some(Ok(line)) => Ok(Some(line)),
        Some(Err(AnyDelimiterCodecError::MaxChunkLengthExceeded)) => Err(CloseReason::LineTooLong),
        Some(Err(AnyDelimiterCodecError::Io(e))) => Err(CloseReason::ReadError(e)),
    }
}

/// Originator then responder. A host that fails to parse leaves a `None`
/// in its slot; the other host is still emitted.
pub fn decode_line(line: &[u8], peer: SocketAddr) -> [Option<ConnectionEvent>; 2] {
    let record = match parser::extract(line) {
        Ok(record) => record,
        Err(e) => {
            warn!(%peer, error = %e, line = %fragment(line), "skipping record");
            return [None, None];
        }
    };

    [Role::Originator, Role::Responder].map(|role| {
        let text = record.host(role);
        match Address::parse(text) {
            Ok(address) => Some(ConnectionEvent { address, role }),
            Err(e) => {
                warn!(%peer, field = role.field(), error = %e, "skipping host");
                None
            }
        }
    })
}

fn fragment(line: &[u8]) -> String {
    let end = line.len().min(FRAGMENT_BYTES);
    let mut text = String::from_utf8_lossy(&line[..end]).into_owned();
    if line.len() > end {
        text.push_str("...");
    }
    text
}
