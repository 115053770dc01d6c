//! The OVSDB JSON-RPC connection.
//!
//! One stream (UNIX socket or TCP loopback) carries newline-delimited
//! JSON-RPC 2.0 frames. Requests get monotonic u64 ids; the reply for each
//! id is routed back to the originating caller through a pending-request
//! table and delivered exactly once. Replies arrive in whatever order the
//! server produces them; unknown ids are logged and discarded. There is no
//! per-request timeout: a request fails only when the connection drops, and
//! in-flight transactions are never retried automatically.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{OvsdbError, Result};
use crate::message::{TransactMessage, transact_params};

/// Database name used for every transaction.
pub const OVSDB_DATABASE: &str = "Open_vSwitch";

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    TransportFailure,
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>>;
type Writer = Arc<tokio::sync::Mutex<Option<Box<dyn AsyncWrite + Send + Unpin>>>>;

/// A connection to an OVSDB server.
pub struct OvsdbConnection {
    next_id: AtomicU64,
    pending: Pending,
    writer: Writer,
    state: Arc<Mutex<ConnectionState>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Default for OvsdbConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl OvsdbConnection {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Arc::new(Mutex::new(HashMap::new())),
            writer: Arc::new(tokio::sync::Mutex::new(None)),
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            reader: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(ConnectionState::Disconnected)
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn set_state(&self, state: ConnectionState) {
        if let Ok(mut s) = self.state.lock() {
            *s = state;
        }
    }

    /// Connect to the OVSDB UNIX socket at `path`.
    pub async fn connect_unix(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.set_state(ConnectionState::Connecting);
        match UnixStream::connect(path).await {
            Ok(stream) => {
                info!(path = %path.display(), "connected to OVSDB");
                let (read, write) = stream.into_split();
                self.attach(read, write).await;
                Ok(())
            }
            Err(err) => {
                self.set_state(ConnectionState::TransportFailure);
                warn!(path = %path.display(), %err, "OVSDB connection failed");
                Err(err.into())
            }
        }
    }

    /// Connect to an OVSDB server listening on loopback TCP.
    pub async fn connect_tcp(&self, port: u16) -> Result<()> {
        self.set_state(ConnectionState::Connecting);
        match TcpStream::connect(("127.0.0.1", port)).await {
            Ok(stream) => {
                info!(port, "connected to OVSDB");
                let (read, write) = stream.into_split();
                self.attach(read, write).await;
                Ok(())
            }
            Err(err) => {
                self.set_state(ConnectionState::TransportFailure);
                warn!(port, %err, "OVSDB connection failed");
                Err(err.into())
            }
        }
    }

    /// Adopt an already-connected stream (tests connect a socketpair).
    pub async fn attach(
        &self,
        read: impl AsyncRead + Send + Unpin + 'static,
        write: impl AsyncWrite + Send + Unpin + 'static,
    ) {
        {
            let mut writer = self.writer.lock().await;
            *writer = Some(Box::new(write));
        }
        self.set_state(ConnectionState::Connected);
        let pending = self.pending.clone();
        let writer = self.writer.clone();
        let state = self.state.clone();
        let handle = tokio::spawn(read_loop(read, pending, writer, state));
        if let Ok(mut reader) = self.reader.lock() {
            if let Some(old) = reader.replace(handle) {
                old.abort();
            }
        }
    }

    /// Drop the connection, failing every pending request.
    pub async fn disconnect(&self) {
        let handle = self.reader.lock().ok().and_then(|mut r| r.take());
        if let Some(handle) = handle {
            handle.abort();
        }
        {
            let mut writer = self.writer.lock().await;
            if let Some(mut w) = writer.take() {
                let _ = w.shutdown().await;
            }
        }
        self.set_state(ConnectionState::Disconnected);
        fail_pending(&self.pending);
    }

    /// Send one transaction and await the array of per-operation results.
    pub async fn transact(&self, requests: &[TransactMessage]) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "method": "transact",
            "params": transact_params(OVSDB_DATABASE, requests),
            "id": id,
        });
        let mut line = serde_json::to_string(&request)?.into_bytes();
        line.push(b'\n');

        let (tx, rx) = oneshot::channel();
        {
            let Ok(mut pending) = self.pending.lock() else {
                return Err(OvsdbError::Disconnected);
            };
            pending.insert(id, tx);
        }

        {
            let mut writer = self.writer.lock().await;
            let Some(w) = writer.as_mut() else {
                remove_pending(&self.pending, id);
                return Err(OvsdbError::NotConnected);
            };
            if let Err(err) = w.write_all(&line).await {
                remove_pending(&self.pending, id);
                return Err(err.into());
            }
        }
        debug!(id, ops = requests.len(), "sent OVSDB transaction");

        rx.await.map_err(|_| OvsdbError::Disconnected)?
    }
}

fn remove_pending(pending: &Pending, id: u64) {
    if let Ok(mut pending) = pending.lock() {
        pending.remove(&id);
    }
}

fn fail_pending(pending: &Pending) {
    let senders: Vec<oneshot::Sender<Result<Value>>> = match pending.lock() {
        Ok(mut pending) => pending.drain().map(|(_, tx)| tx).collect(),
        Err(_) => return,
    };
    for tx in senders {
        let _ = tx.send(Err(OvsdbError::Disconnected));
    }
}

async fn read_loop(
    read: impl AsyncRead + Unpin,
    pending: Pending,
    writer: Writer,
    state: Arc<Mutex<ConnectionState>>,
) {
    let mut lines = BufReader::new(read).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Value>(&line) {
                    Ok(message) => handle_message(message, &pending, &writer).await,
                    Err(err) => warn!(%err, "could not parse OVSDB message"),
                }
            }
            Ok(None) => {
                info!("OVSDB connection closed");
                break;
            }
            Err(err) => {
                warn!(%err, "OVSDB read error");
                break;
            }
        }
    }
    if let Ok(mut s) = state.lock() {
        *s = ConnectionState::Disconnected;
    }
    {
        let mut writer = writer.lock().await;
        *writer = None;
    }
    fail_pending(&pending);
}

async fn handle_message(message: Value, pending: &Pending, writer: &Writer) {
    // The server probes liveness with echo requests; answer in kind.
    if message.get("method").and_then(Value::as_str) == Some("echo") {
        let reply = json!({
            "result": message.get("params").cloned().unwrap_or_else(|| json!([])),
            "error": null,
            "id": message.get("id").cloned().unwrap_or(Value::Null),
        });
        let mut line = match serde_json::to_string(&reply) {
            Ok(line) => line.into_bytes(),
            Err(_) => return,
        };
        line.push(b'\n');
        let mut writer = writer.lock().await;
        if let Some(w) = writer.as_mut() {
            let _ = w.write_all(&line).await;
        }
        return;
    }
    if message.get("method").is_some() {
        debug!("ignoring unsolicited OVSDB notification");
        return;
    }

    let Some(id) = message.get("id").and_then(Value::as_u64) else {
        warn!("OVSDB reply without a usable id");
        return;
    };
    let sender = match pending.lock() {
        Ok(mut pending) => pending.remove(&id),
        Err(_) => None,
    };
    let Some(sender) = sender else {
        warn!(id, "unable to find request for reply id");
        return;
    };

    let error = message.get("error").filter(|e| !e.is_null());
    let outcome = match error {
        Some(err) => Err(OvsdbError::Server(err.to_string())),
        None => Ok(message.get("result").cloned().unwrap_or(Value::Null)),
    };
    let _ = sender.send(outcome);
}
