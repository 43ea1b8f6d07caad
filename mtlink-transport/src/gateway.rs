//! Transport gateway.
//!
//! Composes the frame codec and the connection state machine into a duplex
//! channel. A single supervisor task owns the lifecycle:
//!
//! ```text
//!   connect cycle ──► established ──► read loop ──► lost ──┐
//!        ▲  (round-robin endpoints, fixed delay)           │
//!        └─────────────────── retry delay ◄────────────────┘
//! ```
//!
//! `send` runs on the caller's task and is serialized against the current
//! socket slot, which the supervisor replaces wholesale on every reconnect.

use crate::config::GatewayConfig;
use crate::endpoint::{Datacenter, Endpoint};
use crate::error::TransportError;
use crate::handler::{ChannelHandler, TransportEvent, TransportHandler};
use crate::state::{ConnectionState, RetryCursor};
use mtlink_protocol::{Frame, FrameDecoder, FrameEncoder};
use parking_lot::{Mutex, ReentrantMutex};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

/// Snapshot of gateway counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayStats {
    pub connect_attempts: u64,
    pub connects: u64,
    pub disconnects: u64,
    pub frames_sent: u64,
    pub frames_received: u64,
    /// Inbound frames dropped for a bad checksum.
    pub frames_dropped: u64,
    /// Sequence number of the last valid inbound frame.
    pub last_inbound_sequence: Option<u32>,
}

#[derive(Debug, Default)]
struct Stats {
    connect_attempts: AtomicU64,
    connects: AtomicU64,
    disconnects: AtomicU64,
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
    /// Sequence + 1; zero means nothing received yet.
    last_inbound_sequence: AtomicU64,
}

impl Stats {
    fn snapshot(&self) -> GatewayStats {
        let last = self.last_inbound_sequence.load(Ordering::Relaxed);
        GatewayStats {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            last_inbound_sequence: last.checked_sub(1).map(|s| s as u32),
        }
    }
}

/// Write side of one connection generation.
struct LiveSocket {
    writer: OwnedWriteHalf,
    encoder: FrameEncoder,
    /// Wakes the read loop when a send fails. Dropping it has the same effect.
    lost: Option<oneshot::Sender<()>>,
}

struct Inner {
    config: GatewayConfig,
    handler: Arc<dyn TransportHandler>,
    state: Mutex<ConnectionState>,
    socket: AsyncMutex<Option<LiveSocket>>,
    endpoint: Mutex<Option<Endpoint>>,
    /// Held while a notification is delivered, and by `dispose`.
    notify_gate: ReentrantMutex<()>,
    shutdown: watch::Sender<bool>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    stats: Stats,
}

/// Duplex framed channel over a self-healing TCP connection.
pub struct TransportGateway {
    inner: Arc<Inner>,
}

impl TransportGateway {
    /// Creates a gateway in the `Init` state.
    pub fn new(config: GatewayConfig, handler: Arc<dyn TransportHandler>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                config,
                handler,
                state: Mutex::new(ConnectionState::Init),
                socket: AsyncMutex::new(None),
                endpoint: Mutex::new(None),
                notify_gate: ReentrantMutex::new(()),
                shutdown,
                supervisor: Mutex::new(None),
                stats: Stats::default(),
            }),
        }
    }

    /// Creates a gateway whose notifications arrive on a channel.
    pub fn with_channel(
        config: GatewayConfig,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (handler, events) = ChannelHandler::new();
        (Self::new(config, Arc::new(handler)), events)
    }

    /// Connects to the first reachable endpoint of `datacenter`.
    ///
    /// Makes at most `max_retries + 1` attempts, moving round-robin through the
    /// endpoints with the configured delay in between. Resolves once the
    /// connection is established. If the gateway is disposed meanwhile, this
    /// resolves with `Ok(())` and nothing further happens.
    ///
    /// After an established connection is lost the gateway reconnects on its
    /// own with a fresh budget of `max_retries`.
    pub async fn connect(
        &self,
        datacenter: &Datacenter,
        max_retries: u32,
    ) -> Result<(), TransportError> {
        if datacenter.is_empty() {
            return Err(TransportError::NoEndpoints);
        }

        let ready = {
            let mut supervisor = self.inner.supervisor.lock();
            match self.state() {
                ConnectionState::Disposed => return Err(TransportError::Disposed),
                ConnectionState::Established => return Err(TransportError::AlreadyConnected),
                _ => {}
            }
            if supervisor.as_ref().is_some_and(|h| !h.is_finished()) {
                return Err(TransportError::AlreadyConnecting);
            }

            tracing::info!(
                "transport gateway connecting ({} endpoint(s), {} retries)",
                datacenter.len(),
                max_retries
            );

            let (ready_tx, ready_rx) = oneshot::channel();
            let inner = self.inner.clone();
            let datacenter = datacenter.clone();
            *supervisor = Some(tokio::spawn(async move {
                supervise(inner, datacenter, max_retries, ready_tx).await;
            }));
            ready_rx
        };

        match ready.await {
            Ok(result) => result,
            Err(_) if self.inner.is_disposed() => Ok(()),
            Err(_) => Err(TransportError::NotConnected),
        }
    }

    /// Frames `payload` and writes it to the current connection.
    ///
    /// Either a complete frame is written or the call fails. A write failure
    /// drops the connection and starts reconnection.
    pub async fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        if self.inner.is_disposed() {
            return Err(TransportError::Disposed);
        }

        let mut slot = self.inner.socket.lock().await;
        let socket = slot.as_mut().ok_or_else(|| {
            tracing::debug!("send while not connected");
            TransportError::NotConnected
        })?;

        let sequence = socket.encoder.next_sequence();
        let frame = socket.encoder.encode(payload)?;
        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(
                "sending frame seq={} ({} bytes): {}",
                sequence,
                frame.len(),
                hex::encode(&frame)
            );
        }

        let mut shutdown = self.inner.shutdown.subscribe();
        let result = tokio::select! {
            result = socket.writer.write_all(&frame) => Some(result),
            _ = disposed(&mut shutdown) => None,
        };
        let Some(result) = result else {
            // The write may have been cut mid-frame; the socket must not be reused.
            tracing::debug!("send interrupted by dispose, closing socket");
            slot.take();
            return Err(TransportError::Disposed);
        };
        if let Err(e) = result {
            tracing::warn!("send failed, dropping connection: {}", e);
            if let Some(mut dead) = slot.take() {
                if let Some(lost) = dead.lost.take() {
                    let _ = lost.send(());
                }
            }
            return Err(TransportError::SendFailed(e));
        }

        self.inner.stats.frames_sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Stops the gateway for good.
    ///
    /// Closes the live socket, cancels pending retries and guarantees that no
    /// notification is delivered once this returns. Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Established
    }

    /// Endpoint of the established connection, if any.
    pub fn current_endpoint(&self) -> Option<Endpoint> {
        self.inner.endpoint.lock().clone()
    }

    pub fn stats(&self) -> GatewayStats {
        self.inner.stats.snapshot()
    }
}

impl Drop for TransportGateway {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl Inner {
    fn is_disposed(&self) -> bool {
        *self.state.lock() == ConnectionState::Disposed
    }

    fn transition(&self, next: ConnectionState) -> bool {
        let mut state = self.state.lock();
        if !state.can_transition_to(next) {
            tracing::debug!("ignoring state transition {} -> {}", *state, next);
            return false;
        }
        tracing::debug!("state {} -> {}", *state, next);
        *state = next;
        true
    }

    fn dispose(&self) {
        let _gate = self.notify_gate.lock();
        {
            let mut state = self.state.lock();
            if *state == ConnectionState::Disposed {
                return;
            }
            *state = ConnectionState::Disposed;
        }
        tracing::info!("transport gateway disposed");

        self.shutdown.send_replace(true);
        // A send in flight keeps the slot; the supervisor clears it on exit.
        if let Ok(mut slot) = self.socket.try_lock() {
            slot.take();
        }
    }

    /// Delivers a notification unless the gateway has been disposed.
    fn notify<F>(&self, f: F)
    where
        F: FnOnce(&dyn TransportHandler),
    {
        let _gate = self.notify_gate.lock();
        if self.is_disposed() {
            return;
        }
        let handler = self.handler.as_ref();
        if catch_unwind(AssertUnwindSafe(|| f(handler))).is_err() {
            tracing::error!("transport handler panicked, notification dropped");
        }
    }

    fn dispatch(&self, frame: Frame) {
        self.stats.frames_received.fetch_add(1, Ordering::Relaxed);
        self.stats
            .last_inbound_sequence
            .store(frame.sequence as u64 + 1, Ordering::Relaxed);
        tracing::debug!(
            "inbound frame seq={} ({} bytes)",
            frame.sequence,
            frame.payload.len()
        );

        let payload = frame.payload;
        self.notify(move |h| h.on_payload(payload));
    }
}

enum CycleOutcome {
    Connected { stream: TcpStream, index: usize },
    Exhausted { attempts: u32 },
    Disposed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    PeerClosed,
    ReadError,
    SendFailed,
    Framing,
    Disposed,
}

/// Resolves once the gateway is disposed.
async fn disposed(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

async fn supervise(
    inner: Arc<Inner>,
    datacenter: Datacenter,
    max_retries: u32,
    ready: oneshot::Sender<Result<(), TransportError>>,
) {
    let mut ready = Some(ready);
    let mut shutdown = inner.shutdown.subscribe();
    let mut decoder =
        FrameDecoder::with_capacity(inner.config.input_capacity, inner.config.max_input_capacity);
    let mut start_index = 0;
    let mut delay_first = false;

    loop {
        let outcome = connect_cycle(
            &inner,
            &datacenter,
            max_retries,
            start_index,
            delay_first,
            &mut shutdown,
        )
        .await;

        let (stream, index) = match outcome {
            CycleOutcome::Connected { stream, index } => (stream, index),
            CycleOutcome::Exhausted { attempts } => {
                match ready.take() {
                    Some(tx) => {
                        let _ = tx.send(Err(TransportError::ConnectFailed { attempts }));
                    }
                    None => {
                        tracing::error!("reconnect failed after {} attempt(s), giving up", attempts)
                    }
                }
                return;
            }
            CycleOutcome::Disposed => {
                if let Some(tx) = ready.take() {
                    let _ = tx.send(Ok(()));
                }
                return;
            }
        };

        let endpoint = datacenter.endpoints[index].clone();
        let (reader, writer) = stream.into_split();
        let (lost_tx, lost_rx) = oneshot::channel();
        decoder.clear();

        // Sends wait on the slot until the state and the connected
        // notification are both in place.
        let mut slot = inner.socket.lock().await;
        if !inner.transition(ConnectionState::Established) {
            drop(slot);
            if let Some(tx) = ready.take() {
                let _ = tx.send(Ok(()));
            }
            return;
        }

        *slot = Some(LiveSocket {
            writer,
            encoder: FrameEncoder::new(),
            lost: Some(lost_tx),
        });
        *inner.endpoint.lock() = Some(endpoint.clone());
        inner.stats.connects.fetch_add(1, Ordering::Relaxed);
        tracing::info!("connected to {}", endpoint);
        inner.notify(|h| h.on_connected());
        drop(slot);

        if let Some(tx) = ready.take() {
            let _ = tx.send(Ok(()));
        }

        let exit = read_loop(&inner, reader, &mut decoder, lost_rx, &mut shutdown).await;

        inner.socket.lock().await.take();
        *inner.endpoint.lock() = None;

        if exit == LoopExit::Disposed || !inner.transition(ConnectionState::Init) {
            tracing::debug!("supervisor stopping after disposal");
            return;
        }

        inner.stats.disconnects.fetch_add(1, Ordering::Relaxed);
        tracing::info!("disconnected from {} ({:?}), reconnecting", endpoint, exit);
        inner.notify(|h| h.on_disconnected());

        start_index = index + 1;
        delay_first = true;
    }
}

async fn connect_cycle(
    inner: &Inner,
    datacenter: &Datacenter,
    max_retries: u32,
    start_index: usize,
    delay_first: bool,
    shutdown: &mut watch::Receiver<bool>,
) -> CycleOutcome {
    let mut cursor = RetryCursor::new(datacenter.len(), start_index, max_retries);
    let mut wait = delay_first;

    loop {
        if wait {
            tokio::select! {
                _ = tokio::time::sleep(inner.config.retry_delay()) => {}
                _ = disposed(shutdown) => return CycleOutcome::Disposed,
            }
        }
        wait = true;

        if !inner.transition(ConnectionState::Connecting) {
            return CycleOutcome::Disposed;
        }

        let endpoint = &datacenter.endpoints[cursor.index()];
        cursor.record_attempt();
        inner.stats.connect_attempts.fetch_add(1, Ordering::Relaxed);
        tracing::info!("connecting to {} (attempt {})", endpoint, cursor.attempts());

        let result = tokio::select! {
            result = open(endpoint, &inner.config) => result,
            _ = disposed(shutdown) => return CycleOutcome::Disposed,
        };

        match result {
            Ok(stream) => {
                return CycleOutcome::Connected {
                    stream,
                    index: cursor.index(),
                }
            }
            Err(e) => {
                tracing::info!("connection to {} failed: {}", endpoint, e);
                if !inner.transition(ConnectionState::Init) {
                    return CycleOutcome::Disposed;
                }
                if !cursor.advance() {
                    tracing::info!("connect failed after {} attempt(s)", cursor.attempts());
                    return CycleOutcome::Exhausted {
                        attempts: cursor.attempts(),
                    };
                }
                tracing::info!("reconnect, remaining retries: {}", cursor.remaining());
            }
        }
    }
}

async fn open(endpoint: &Endpoint, config: &GatewayConfig) -> Result<TcpStream, TransportError> {
    let connect = TcpStream::connect((endpoint.host.as_str(), endpoint.port));
    let stream = match config.connect_timeout() {
        Some(timeout) => tokio::time::timeout(timeout, connect)
            .await
            .map_err(|_| TransportError::Timeout)??,
        None => connect.await?,
    };

    if config.nodelay {
        stream.set_nodelay(true).ok();
    }
    Ok(stream)
}

async fn read_loop(
    inner: &Inner,
    mut reader: OwnedReadHalf,
    decoder: &mut FrameDecoder,
    mut lost: oneshot::Receiver<()>,
    shutdown: &mut watch::Receiver<bool>,
) -> LoopExit {
    let mut buf = vec![0u8; inner.config.read_buffer_size];

    loop {
        if inner.is_disposed() {
            return LoopExit::Disposed;
        }

        let n = tokio::select! {
            result = reader.read(&mut buf) => match result {
                Ok(0) => {
                    tracing::debug!("connection closed by peer");
                    return LoopExit::PeerClosed;
                }
                Ok(n) => n,
                Err(e) => {
                    tracing::info!("read error: {}", e);
                    return LoopExit::ReadError;
                }
            },
            _ = &mut lost => {
                if inner.is_disposed() {
                    return LoopExit::Disposed;
                }
                return LoopExit::SendFailed;
            }
            _ = disposed(shutdown) => return LoopExit::Disposed,
        };

        tracing::debug!("received {} bytes", n);
        match decoder.feed(&buf[..n], |frame| inner.dispatch(frame)) {
            Ok(stats) => {
                if stats.dropped > 0 {
                    inner
                        .stats
                        .frames_dropped
                        .fetch_add(stats.dropped as u64, Ordering::Relaxed);
                }
            }
            Err(e) => {
                tracing::error!("framing error, dropping connection: {}", e);
                return LoopExit::Framing;
            }
        }
    }
}
