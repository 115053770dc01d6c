//! The notification server.
//!
//! Listens on a UNIX stream socket, tracks per-session subscription sets,
//! and fans typed JSON notifications out to subscribed sessions. Each
//! session has its own outbound queue draining into the socket; the encoded
//! notification buffer is shared across subscribers. A session that
//! violates the framing protocol, sends malformed JSON-RPC, or fails a
//! write is closed without affecting its peers.

use std::collections::{HashMap, HashSet};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mac_address::MacAddress;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::frame::{self, Decoder};
use crate::limiter::RateLimiter;

/// Duplicate virtual-ip announcements are elided within this window.
const VIP_RATE_WINDOW: Duration = Duration::from_secs(10);

const READ_BUF_SIZE: usize = 2048;

/// Socket placement and ownership settings.
#[derive(Debug, Clone, Default)]
pub struct NotifServerConfig {
    pub socket_path: PathBuf,
    pub socket_owner: Option<String>,
    pub socket_group: Option<String>,
    /// Permission bits as octal text, e.g. `"666"`.
    pub socket_permissions: Option<String>,
}

struct Session {
    subscriptions: Arc<Mutex<HashSet<String>>>,
    tx: mpsc::UnboundedSender<Arc<[u8]>>,
    task: JoinHandle<()>,
}

type SessionMap = Arc<Mutex<HashMap<u64, Session>>>;

/// Notification server over a UNIX stream socket.
pub struct NotifServer {
    config: NotifServerConfig,
    sessions: SessionMap,
    next_session: Arc<AtomicU64>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    vip_limiter: RateLimiter,
}

impl NotifServer {
    pub fn new(config: NotifServerConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            next_session: Arc::new(AtomicU64::new(1)),
            accept_task: Mutex::new(None),
            vip_limiter: RateLimiter::new(VIP_RATE_WINDOW),
        })
    }

    /// Bind the socket (unlinking any stale file), apply ownership and
    /// permissions, and start accepting sessions.
    pub fn start(&self) -> std::io::Result<()> {
        let path = &self.config.socket_path;
        let _ = std::fs::remove_file(path);
        let listener = UnixListener::bind(path)?;
        apply_socket_security(path, &self.config);
        info!(path = %path.display(), "listening for notification clients");

        let sessions = self.sessions.clone();
        let next_session = self.next_session.clone();
        let task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => add_session(&sessions, &next_session, stream),
                    Err(err) => {
                        warn!(%err, "could not accept notification client");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        });
        if let Ok(mut accept_task) = self.accept_task.lock() {
            if let Some(old) = accept_task.replace(task) {
                old.abort();
            }
        }
        Ok(())
    }

    /// Stop accepting, close every session and unlink the socket file.
    pub fn stop(&self) {
        if let Ok(mut accept_task) = self.accept_task.lock() {
            if let Some(task) = accept_task.take() {
                task.abort();
            }
        }
        let drained: Vec<Session> = match self.sessions.lock() {
            Ok(mut sessions) => sessions.drain().map(|(_, s)| s).collect(),
            Err(_) => Vec::new(),
        };
        for session in drained {
            session.task.abort();
        }
        let _ = std::fs::remove_file(&self.config.socket_path);
    }

    /// Publish `{"method": type, "params": ...}` to every session
    /// subscribed to `notif_type`. The encoded buffer is shared across
    /// subscribers.
    pub fn dispatch(&self, notif_type: &str, params: Value) {
        let message = json!({"method": notif_type, "params": params});
        let data: Arc<[u8]> = match frame::encode(&message) {
            Ok(data) => data.into(),
            Err(err) => {
                error!(%err, "could not encode notification");
                return;
            }
        };

        let handles: Vec<(Arc<Mutex<HashSet<String>>>, mpsc::UnboundedSender<Arc<[u8]>>)> =
            match self.sessions.lock() {
                Ok(sessions) => sessions
                    .values()
                    .map(|s| (s.subscriptions.clone(), s.tx.clone()))
                    .collect(),
                Err(_) => return,
            };
        for (subscriptions, tx) in handles {
            let Ok(subscriptions) = subscriptions.lock() else {
                continue;
            };
            if subscriptions.contains(notif_type) {
                let _ = tx.send(data.clone());
            }
        }
    }

    /// Announce ownership of a virtual IP, rate-limited per `(mac, ip)`.
    pub fn dispatch_virtual_ip(&self, uuids: &HashSet<String>, mac: MacAddress, ip: &str) {
        if !self.vip_limiter.event(&format!("{mac}|{ip}")) {
            return;
        }
        let mut uuid_list: Vec<&str> = uuids.iter().map(String::as_str).collect();
        uuid_list.sort_unstable();
        self.dispatch(
            "virtual-ip",
            json!({
                "uuid": uuid_list,
                "mac": mac.to_string(),
                "ip": ip,
            }),
        );
    }
}

fn add_session(sessions: &SessionMap, next_session: &AtomicU64, stream: UnixStream) {
    let id = next_session.fetch_add(1, Ordering::Relaxed);
    let (read_half, write_half) = stream.into_split();
    let (tx, rx) = mpsc::unbounded_channel();
    let subscriptions = Arc::new(Mutex::new(HashSet::new()));

    tokio::spawn(write_session(write_half, rx));
    let task = tokio::spawn(run_session(
        id,
        read_half,
        subscriptions.clone(),
        tx.clone(),
        sessions.clone(),
    ));

    if let Ok(mut sessions) = sessions.lock() {
        sessions.insert(
            id,
            Session {
                subscriptions,
                tx,
                task,
            },
        );
    }
}

fn apply_socket_security(path: &Path, config: &NotifServerConfig) {
    use nix::unistd::{Gid, Group, Uid, User, chown, getegid, geteuid};

    let mut uid: Option<Uid> = None;
    let mut gid: Option<Gid> = None;
    if let Some(owner) = &config.socket_owner {
        match User::from_name(owner) {
            Ok(Some(user)) => uid = Some(user.uid),
            _ => warn!(owner = owner.as_str(), "could not find user"),
        }
    }
    if let Some(group) = &config.socket_group {
        match Group::from_name(group) {
            Ok(Some(group)) => gid = Some(group.gid),
            _ => warn!(group = group.as_str(), "could not find group"),
        }
    }
    if let Some(perms) = &config.socket_permissions {
        match u32::from_str_radix(perms, 8) {
            Ok(mode) => {
                if let Err(err) =
                    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
                {
                    warn!(path = %path.display(), %err, "could not set socket permissions");
                }
            }
            Err(_) => warn!(perms = perms.as_str(), "invalid socket permissions"),
        }
    }
    if uid.is_some() || gid.is_some() {
        let uid = uid.unwrap_or_else(geteuid);
        let gid = gid.unwrap_or_else(getegid);
        if let Err(err) = chown(path, Some(uid), Some(gid)) {
            warn!(path = %path.display(), %err, "could not change socket ownership");
        }
    }
}

async fn write_session(mut write_half: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Arc<[u8]>>) {
    while let Some(data) = rx.recv().await {
        if let Err(err) = write_half.write_all(&data).await {
            warn!(%err, "could not write to notification socket");
            break;
        }
    }
}

async fn run_session(
    id: u64,
    mut read_half: OwnedReadHalf,
    subscriptions: Arc<Mutex<HashSet<String>>>,
    tx: mpsc::UnboundedSender<Arc<[u8]>>,
    sessions: SessionMap,
) {
    info!(id, "new notification connection");
    let mut decoder = Decoder::new();
    let mut buf = [0u8; READ_BUF_SIZE];
    'session: loop {
        let n = match read_half.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                warn!(id, %err, "could not read from notification socket");
                break;
            }
        };
        let messages = match decoder.feed(buf.get(..n).unwrap_or_default()) {
            Ok(messages) => messages,
            Err(err) => {
                error!(id, %err, "notification protocol violation");
                break;
            }
        };
        for message in messages {
            if handle_request(&message, &subscriptions, &tx).is_err() {
                break 'session;
            }
        }
    }
    if let Ok(mut sessions) = sessions.lock() {
        sessions.remove(&id);
    }
    debug!(id, "notification session closed");
}

/// Handle one request; `Err` closes the session.
///
/// The subscription set is updated and the reply queued under the same
/// lock `dispatch` takes, so a subscriber never sees a notification ahead
/// of its own subscribe reply.
fn handle_request(
    message: &Value,
    subscriptions: &Arc<Mutex<HashSet<String>>>,
    tx: &mpsc::UnboundedSender<Arc<[u8]>>,
) -> Result<(), ()> {
    let method = message.get("method").and_then(Value::as_str);
    let params = message.get("params").filter(|p| p.is_object());
    let (Some(method), Some(params)) = (method, params) else {
        error!("malformed notification request");
        return Err(());
    };

    let subscribe = match method {
        "subscribe" => true,
        "unsubscribe" => false,
        _ => return Ok(()),
    };

    let Ok(mut subs) = subscriptions.lock() else {
        return Err(());
    };
    if let Some(types) = params.get("type").and_then(Value::as_array) {
        for notif_type in types.iter().filter_map(Value::as_str) {
            if subscribe {
                debug!(notif_type, "subscribed");
                subs.insert(notif_type.to_string());
            } else {
                debug!(notif_type, "unsubscribed");
                subs.remove(notif_type);
            }
        }
    }
    if let Some(id) = message.get("id") {
        let reply = json!({"result": {}, "id": id});
        match frame::encode(&reply) {
            Ok(data) => {
                let _ = tx.send(data.into());
            }
            Err(_) => return Err(()),
        }
    }
    Ok(())
}
