//! Connection lifecycle and the serial execution context
//!
//! All stream operations — user writes, transport readiness, close — run on
//! one spawned link task, in FIFO order over a single op channel. Decoded
//! reports leave the link task over a second FIFO channel and are delivered
//! by a separate notify task, so a slow observer never stalls device I/O and
//! reports arrive in decode order.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::connection::driver::StreamDriver;
use crate::connection::observer::{ConnectionObserver, ObserverSet, ReportObserver};
use crate::connection::queue::DEFAULT_MAX_PENDING_WRITES;
use crate::transport::TransportConnector;

/// Default pause after each completed transfer; the brick's receive buffer
/// overruns without it.
pub const DEFAULT_INTER_WRITE_DELAY: Duration = Duration::from_millis(125);

/// How long `close` waits for the link task before aborting it
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Configuration for a brick connection
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Maximum number of pending outbound commands; the oldest entries are
    /// evicted beyond this depth.
    pub max_pending_writes: usize,
    /// Pause after each completed transfer. Raising it trades throughput for
    /// a calmer brick; lowering it invites dropped frames under load.
    pub inter_write_delay: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_pending_writes: DEFAULT_MAX_PENDING_WRITES,
            inter_write_delay: DEFAULT_INTER_WRITE_DELAY,
        }
    }
}

enum LinkOp {
    Send(Bytes),
    SpaceAvailable,
    Close,
}

struct LinkHandle {
    ops_tx: mpsc::UnboundedSender<LinkOp>,
    link_task: JoinHandle<()>,
}

impl Drop for LinkHandle {
    fn drop(&mut self) {
        let _ = self.ops_tx.send(LinkOp::Close);
    }
}

/// Manages the single connection to one brick
///
/// Exactly one connection is active at a time; `open` while open and `close`
/// while closed are no-ops. Transport-level errors never change the
/// open/closed state — the only caller-visible failure signal is the
/// `connected = false` notification produced by an explicit
/// [`close`](ConnectionManager::close). There is no automatic reconnect;
/// reconnection is the caller's responsibility.
pub struct ConnectionManager {
    connector: Box<dyn TransportConnector>,
    config: ConnectionConfig,
    observers: Arc<ObserverSet>,
    link: Mutex<Option<LinkHandle>>,
}

impl ConnectionManager {
    pub fn new(connector: Box<dyn TransportConnector>) -> Self {
        Self::with_config(connector, ConnectionConfig::default())
    }

    pub fn with_config(connector: Box<dyn TransportConnector>, config: ConnectionConfig) -> Self {
        Self {
            connector,
            config,
            observers: Arc::new(ObserverSet::default()),
            link: Mutex::new(None),
        }
    }

    /// Whether a connection is currently open.
    pub fn is_open(&self) -> bool {
        lock(&self.link).is_some()
    }

    /// Register a connection-state observer. Registration is append-only;
    /// duplicates are invoked once each per transition.
    pub fn add_connection_observer(&self, observer: Arc<dyn ConnectionObserver>) {
        self.observers.add_connection_observer(observer);
    }

    /// Register a report observer, notified once per decoded inbound frame.
    pub fn add_report_observer(&self, observer: Arc<dyn ReportObserver>) {
        self.observers.add_report_observer(observer);
    }

    /// Open the connection. A no-op when already open.
    ///
    /// Connection observers see `connected = true` once the link is up.
    pub async fn open(&self) -> Result<()> {
        if self.is_open() {
            debug!("open ignored, connection already open");
            return Ok(());
        }

        info!(transport = self.connector.name(), "opening brick connection");
        let stream = self.connector.connect().await?;

        {
            let mut link = lock(&self.link);
            if link.is_some() {
                debug!("open raced with another open, dropping fresh stream");
                return Ok(());
            }

            let (reader, writer) = tokio::io::split(stream);
            let driver = StreamDriver::new(
                reader,
                writer,
                self.config.max_pending_writes,
                self.config.inter_write_delay,
            );
            let (ops_tx, ops_rx) = mpsc::unbounded_channel();
            let (report_tx, report_rx) = mpsc::unbounded_channel();

            let link_task = tokio::spawn(link_loop(driver, ops_rx, ops_tx.clone(), report_tx));
            tokio::spawn(notify_loop(report_rx, self.observers.clone()));

            *link = Some(LinkHandle { ops_tx, link_task });
        }

        self.observers.notify_connection(true);
        Ok(())
    }

    /// Close the connection. A no-op when already closed.
    ///
    /// Connection observers see `connected = false` before the underlying
    /// stream is torn down.
    pub async fn close(&self) {
        let Some(mut handle) = lock(&self.link).take() else {
            debug!("close ignored, connection already closed");
            return;
        };

        self.observers.notify_connection(false);

        let _ = handle.ops_tx.send(LinkOp::Close);
        if timeout(CLOSE_GRACE, &mut handle.link_task).await.is_err() {
            warn!("link task did not stop within {CLOSE_GRACE:?}, aborting");
            handle.link_task.abort();
        }
        info!("brick connection closed");
    }

    /// Queue a command for transmission. Callable from any thread; the
    /// actual transfer happens on the link task, with the user-issued write
    /// order preserved.
    pub fn write<C: Command + ?Sized>(&self, command: &C) {
        self.write_raw(command.to_bytes());
    }

    /// Queue a pre-encoded payload for transmission. Dropped with a log line
    /// when the connection is closed.
    pub fn write_raw(&self, payload: Bytes) {
        match lock(&self.link).as_ref() {
            Some(handle) => {
                let _ = handle.ops_tx.send(LinkOp::Send(payload));
            }
            None => debug!("write dropped, connection closed"),
        }
    }
}

fn lock(mutex: &Mutex<Option<LinkHandle>>) -> MutexGuard<'_, Option<LinkHandle>> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The serial execution context: every stream operation passes through this
/// task, giving total FIFO order between user-issued writes and
/// transport-driven reads with no locks around the stream state.
///
/// After a completed transfer the driver asks for a space-available signal;
/// posting it through the same op channel puts it behind any sends that
/// arrived during the transfer, so those sends enqueue (and evict stale
/// backlog) before the next head is written.
async fn link_loop<R, W>(
    mut driver: StreamDriver<R, W>,
    mut ops_rx: mpsc::UnboundedReceiver<LinkOp>,
    ops_tx: mpsc::UnboundedSender<LinkOp>,
    report_tx: mpsc::UnboundedSender<Bytes>,
) where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    loop {
        tokio::select! {
            biased;
            op = ops_rx.recv() => match op {
                Some(LinkOp::Send(payload)) => {
                    if driver.submit(payload).await {
                        let _ = ops_tx.send(LinkOp::SpaceAvailable);
                    }
                }
                Some(LinkOp::SpaceAvailable) => {
                    if driver.space_available().await {
                        let _ = ops_tx.send(LinkOp::SpaceAvailable);
                    }
                }
                Some(LinkOp::Close) | None => {
                    driver.shutdown().await;
                    return;
                }
            },
            header = driver.fill_header(), if driver.wants_read() => {
                if let Some(len) = header {
                    if let Some(report) = driver.read_payload(len).await {
                        let _ = report_tx.send(report);
                    }
                }
            }
        }
    }
}

/// Report delivery context: decouples observer callbacks from device I/O
/// while preserving decode order.
async fn notify_loop(mut report_rx: mpsc::UnboundedReceiver<Bytes>, observers: Arc<ObserverSet>) {
    while let Some(report) = report_rx.recv().await {
        observers.notify_report(report);
    }
}
