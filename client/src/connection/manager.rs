//! Connection manager
//!
//! A single tokio task owns the socket, the outbound queue, the reconnect
//! counter and the stream assembler. [`ConnectionManager`] is the cloneable
//! handle the rest of the client talks to; commands reach the task over an
//! mpsc channel and the lifecycle state is published on a watch channel and
//! mirrored into the store.

use super::backoff::{ReconnectPolicy, ReconnectState};
use super::dispatcher::FrameDispatcher;
use super::queue::OutboundQueue;
use super::state::ConnectionState;
use super::transport::{Connector, Socket, TransportError};
use crate::config::ConnectionConfig;
use crate::events::{EventBus, Toast};
use crate::protocol::ClientMessage;
use crate::state::Store;
use futures_util::Stream;
use std::future::{pending, Future};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

type OpenFuture = Pin<Box<dyn Future<Output = Result<Box<dyn Socket>, TransportError>> + Send>>;

enum Command {
    Connect,
    Disconnect(oneshot::Sender<()>),
    Send(ClientMessage),
    QueueLen(oneshot::Sender<usize>),
}

/// Handle to the connection task
///
/// Dropping every clone stops the task and closes the socket.
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Connect => f.write_str("Connect"),
            Command::Disconnect(_) => f.write_str("Disconnect"),
            Command::Send(message) => write!(f, "Send({})", message.kind()),
            Command::QueueLen(_) => f.write_str("QueueLen"),
        }
    }
}

impl ConnectionManager {
    /// Start the connection task; must be called inside a tokio runtime
    ///
    /// The task starts `Disconnected`; nothing is opened until
    /// [`connect`](Self::connect).
    pub fn spawn(
        config: &ConnectionConfig,
        connector: Arc<dyn Connector>,
        store: Store,
        events: EventBus,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);

        let worker = Worker {
            url: config.endpoint_url.clone(),
            connector,
            dispatcher: FrameDispatcher::new(
                store.clone(),
                events.clone(),
                config.stream_idle_timeout,
            ),
            store,
            events,
            state_tx,
            queue: OutboundQueue::new(config.queue_capacity),
            reconnect: ReconnectState::new(ReconnectPolicy::new(
                config.reconnect_delays.clone(),
                config.max_reconnect_attempts,
            )),
            max_attempts: config.max_reconnect_attempts,
            socket: None,
            pending_open: None,
            retry_at: None,
        };
        tokio::spawn(worker.run(command_rx));

        Self { commands, state }
    }

    /// Open the connection
    ///
    /// Ignored while connected or while an open is in flight. Cancels a
    /// pending reconnect timer. From `Error` the retry budget starts over.
    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    /// Close the connection without reconnecting and drop queued messages
    ///
    /// Idempotent. Returns once the task has processed the request.
    pub async fn disconnect(&self) {
        let (ack, done) = oneshot::channel();
        self.command(Command::Disconnect(ack));
        let _ = done.await;
    }

    /// Send now if connected, otherwise queue
    ///
    /// A full queue drops the message with a warning; the caller is never
    /// told.
    pub fn send(&self, message: ClientMessage) {
        self.command(Command::Send(message));
    }

    /// Messages waiting for the socket to open
    pub async fn queued(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        self.command(Command::QueueLen(tx));
        rx.await.unwrap_or(0)
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver notified on every state change
    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Wait until the lifecycle reaches `target`
    pub async fn wait_for(&self, target: ConnectionState) -> Result<(), TransportError> {
        let mut rx = self.state.clone();
        rx.wait_for(|state| *state == target)
            .await
            .map(|_| ())
            .map_err(|_| TransportError::Closed)
    }

    /// Current state followed by every change
    pub fn state_changes(&self) -> impl Stream<Item = ConnectionState> + Send + 'static {
        let mut rx = self.state.clone();
        async_stream::stream! {
            let current = *rx.borrow_and_update();
            yield current;
            while rx.changed().await.is_ok() {
                let next = *rx.borrow_and_update();
                yield next;
            }
        }
    }

    fn command(&self, command: Command) {
        if let Err(e) = self.commands.send(command) {
            warn!(command = ?e.0, "Connection task is gone, dropping command");
        }
    }
}

struct Worker {
    url: String,
    connector: Arc<dyn Connector>,
    store: Store,
    events: EventBus,
    state_tx: watch::Sender<ConnectionState>,
    queue: OutboundQueue<ClientMessage>,
    reconnect: ReconnectState,
    max_attempts: u32,
    dispatcher: FrameDispatcher,
    socket: Option<Box<dyn Socket>>,
    pending_open: Option<OpenFuture>,
    retry_at: Option<Instant>,
}

impl Worker {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        debug!(url = %self.url, "Connection task started");
        loop {
            let idle_at = self.dispatcher.idle_deadline();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                result = poll_open(&mut self.pending_open) => {
                    self.pending_open = None;
                    self.on_open_result(result).await;
                }
                frame = recv_frame(&mut self.socket) => self.on_frame(frame),
                _ = sleep_until_opt(self.retry_at) => {
                    self.retry_at = None;
                    self.start_open();
                }
                _ = sleep_until_opt(idle_at) => self.dispatcher.on_idle_timeout(),
            }
        }
        self.shutdown().await;
        debug!("Connection task stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.connect(),
            Command::Disconnect(ack) => {
                self.shutdown().await;
                let _ = ack.send(());
            }
            Command::Send(message) => self.send(message).await,
            Command::QueueLen(reply) => {
                let _ = reply.send(self.queue.len());
            }
        }
    }

    fn connect(&mut self) {
        let current = self.current_state();
        if current == ConnectionState::Connected || self.pending_open.is_some() {
            debug!(state = %current, "Connect ignored");
            return;
        }
        if current == ConnectionState::Error {
            info!("Retrying after exhausted reconnect budget");
            self.reconnect.reset();
            self.store.update(|state| {
                state.reconnect_attempts = 0;
                state.error = None;
            });
        }
        if self.retry_at.take().is_some() {
            debug!("Pending reconnect replaced by an immediate attempt");
        }
        self.start_open();
    }

    fn start_open(&mut self) {
        info!(url = %self.url, attempt = self.reconnect.attempts(), "Opening connection");
        self.set_state(ConnectionState::Connecting);
        let connector = Arc::clone(&self.connector);
        let url = self.url.clone();
        self.pending_open = Some(Box::pin(async move { connector.connect(&url).await }));
    }

    async fn on_open_result(&mut self, result: Result<Box<dyn Socket>, TransportError>) {
        match result {
            Ok(socket) => {
                self.socket = Some(socket);
                self.reconnect.reset();
                self.set_state(ConnectionState::Connected);
                self.store.update(|state| {
                    state.reconnect_attempts = 0;
                    state.error = None;
                });
                info!(url = %self.url, "Connection established");

                self.authenticate().await;
                let backlog = self.queue.drain();
                if !backlog.is_empty() {
                    info!(count = backlog.len(), "Flushing queued messages");
                }
                for message in backlog {
                    self.transmit(message).await;
                }
                self.events.toast(Toast::success("Connected to server"));
            }
            Err(e) => {
                warn!(url = %self.url, error = %e, "Connection attempt failed");
                self.on_connection_lost();
            }
        }
    }

    fn on_frame(&mut self, frame: Option<Result<String, TransportError>>) {
        match frame {
            Some(Ok(text)) => self.dispatcher.handle_frame(&text),
            Some(Err(e)) => {
                warn!(error = %e, "Socket read failed");
                self.on_connection_lost();
            }
            None => {
                warn!("Connection closed by peer");
                self.on_connection_lost();
            }
        }
    }

    /// Open failure and unexpected close: schedule a retry or give up
    fn on_connection_lost(&mut self) {
        self.socket = None;
        self.dispatcher.reset();
        self.set_state(ConnectionState::Disconnected);

        match self.reconnect.next_delay() {
            Some((attempt, delay)) => {
                info!(
                    attempt = attempt,
                    max_attempts = self.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling reconnect"
                );
                self.retry_at = Some(Instant::now() + delay);
                self.store
                    .update(|state| state.reconnect_attempts = attempt);
                self.events.toast(Toast::warning(format!(
                    "Connection lost. Reconnecting ({}/{})...",
                    attempt, self.max_attempts
                )));
            }
            None => {
                error!(
                    attempts = self.reconnect.attempts(),
                    "Reconnect budget exhausted"
                );
                self.set_state(ConnectionState::Error);
                self.store.update(|state| {
                    state.error = Some("Unable to connect to the server".to_string())
                });
                self.events
                    .toast(Toast::error("Unable to connect to the server. Try again."));
            }
        }
    }

    async fn send(&mut self, message: ClientMessage) {
        if self.current_state() == ConnectionState::Connected && self.socket.is_some() {
            self.transmit(message).await;
            return;
        }
        let kind = message.kind();
        if self.queue.enqueue(message) {
            debug!(kind = kind, queued = self.queue.len(), "Message queued until connected");
        } else {
            warn!(
                kind = kind,
                capacity = self.queue.capacity(),
                "Outbound queue full, dropping message"
            );
        }
    }

    async fn authenticate(&mut self) {
        let user = self.store.get().user.clone();
        match user {
            Some(user) => {
                self.transmit(ClientMessage::Authenticate {
                    user_id: user.id,
                    session_id: user.session_id,
                    token: user.token,
                })
                .await
            }
            None => warn!("Connected without a user session, skipping authenticate"),
        }
    }

    async fn transmit(&mut self, message: ClientMessage) {
        let kind = message.kind();
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                error!(kind = kind, error = %e, "Failed to encode outbound frame");
                return;
            }
        };
        let Some(socket) = self.socket.as_mut() else {
            warn!(kind = kind, "No open socket, dropping frame");
            return;
        };
        match socket.send(text).await {
            Ok(()) => debug!(kind = kind, "Frame sent"),
            Err(e) => warn!(kind = kind, error = %e, "Failed to send frame"),
        }
    }

    /// Intentional close: no retry, nothing kept
    async fn shutdown(&mut self) {
        self.retry_at = None;
        if self.pending_open.take().is_some() {
            debug!("Cancelled in-flight connection attempt");
        }
        if let Some(mut socket) = self.socket.take() {
            if let Err(e) = socket.close().await {
                debug!(error = %e, "Error while closing socket");
            }
            info!("Connection closed");
        }
        let dropped = self.queue.len();
        if dropped > 0 {
            info!(count = dropped, "Discarding queued messages");
        }
        self.queue.clear();
        self.reconnect.reset();
        self.dispatcher.reset();
        self.set_state(ConnectionState::Disconnected);
        self.store.update(|state| state.reconnect_attempts = 0);
    }

    fn current_state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&mut self, next: ConnectionState) {
        let previous = self.current_state();
        if previous == next {
            return;
        }
        info!(from = %previous, to = %next, "Connection state changed");
        self.state_tx.send_replace(next);
        self.store.update(|state| state.connection_status = next);
    }
}

async fn poll_open(pending_open: &mut Option<OpenFuture>) -> Result<Box<dyn Socket>, TransportError> {
    match pending_open {
        Some(open) => open.await,
        None => pending().await,
    }
}

async fn recv_frame(socket: &mut Option<Box<dyn Socket>>) -> Option<Result<String, TransportError>> {
    match socket {
        Some(socket) => socket.recv().await,
        None => pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
