//! In-memory transport shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use centli_client::config::ConnectionConfig;
use centli_client::connection::{Connector, Socket, TransportError};
use centli_client::state::{StatePatch, Store, UserSession};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Connector whose outcomes are scripted by the test
pub struct MockConnector {
    script: Mutex<VecDeque<bool>>,
    refuse_by_default: AtomicBool,
    attempts: Mutex<Vec<Instant>>,
    accepted: mpsc::UnboundedSender<ServerEnd>,
}

impl MockConnector {
    /// Connector accepting every attempt, plus the stream of server ends
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (accepted, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            refuse_by_default: AtomicBool::new(false),
            attempts: Mutex::new(Vec::new()),
            accepted,
        });
        (connector, rx)
    }

    /// Refuse every attempt not covered by the script
    pub fn refuse_all(&self, refuse: bool) {
        self.refuse_by_default.store(refuse, Ordering::SeqCst);
    }

    /// Outcome of the next attempts, in order (`true` = accept)
    pub fn script(&self, outcomes: &[bool]) {
        self.script.lock().unwrap().extend(outcomes.iter().copied());
    }

    /// Number of connection attempts so far
    pub fn attempts(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    /// Gaps between consecutive attempts
    pub fn gaps(&self) -> Vec<Duration> {
        let attempts = self.attempts.lock().unwrap();
        attempts.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn Socket>, TransportError> {
        self.attempts.lock().unwrap().push(Instant::now());
        let accept = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(!self.refuse_by_default.load(Ordering::SeqCst));
        if !accept {
            return Err(TransportError::Connect("connection refused".to_string()));
        }

        let (client_tx, client_rx) = mpsc::unbounded_channel();
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let _ = self.accepted.send(ServerEnd {
            sent: client_rx,
            outgoing: Some(server_tx),
        });
        Ok(Box::new(MockSocket {
            outgoing: client_tx,
            incoming: server_rx,
        }))
    }
}

struct MockSocket {
    outgoing: mpsc::UnboundedSender<String>,
    incoming: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Socket for MockSocket {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.outgoing
            .send(text)
            .map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        self.incoming.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.incoming.close();
        Ok(())
    }
}

/// The backend's side of one accepted connection
pub struct ServerEnd {
    sent: mpsc::UnboundedReceiver<String>,
    outgoing: Option<mpsc::UnboundedSender<String>>,
}

impl ServerEnd {
    /// Push a text frame to the client
    pub fn push(&self, text: impl Into<String>) {
        if let Some(outgoing) = &self.outgoing {
            outgoing.send(text.into()).unwrap();
        }
    }

    /// Close the connection from the server side
    pub fn close(&mut self) {
        self.outgoing = None;
    }

    /// Next frame the client sent, parsed as JSON
    pub async fn next_frame(&mut self) -> Value {
        let text = self.sent.recv().await.expect("client side closed");
        serde_json::from_str(&text).expect("client sent invalid JSON")
    }

    /// Next frame, or None if the client sends nothing within `wait`
    pub async fn try_next_frame(&mut self, wait: Duration) -> Option<Value> {
        match tokio::time::timeout(wait, self.sent.recv()).await {
            Ok(Some(text)) => serde_json::from_str(&text).ok(),
            _ => None,
        }
    }

    /// Resolves once the client dropped its socket
    pub async fn closed_by_client(&mut self) {
        while self.sent.recv().await.is_some() {}
    }
}

/// Connection settings with the production defaults and a fake endpoint
pub fn connection_config() -> ConnectionConfig {
    ConnectionConfig {
        endpoint_url: "ws://backend.test/ws".to_string(),
        ..ConnectionConfig::default()
    }
}

/// Store with a logged-in user
pub fn store_with_user() -> Store {
    let store = Store::new(50);
    store.merge(StatePatch {
        user: Some(Some(UserSession {
            id: "user-1".to_string(),
            session_id: "session_1".to_string(),
            token: Some("token-1".to_string()),
        })),
        ..StatePatch::default()
    });
    store
}

/// Let the connection task catch up
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Yield to the runtime until `condition` holds, without moving the clock
pub async fn until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
