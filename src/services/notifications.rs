use std::{
    collections::HashMap,
    convert::Infallible,
    fmt::Display,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, RwLock, Weak,
    },
    task::{Context, Poll},
    time::Duration,
};

use axum::response::sse::Event;
use chrono::Utc;
use futures::Stream;
use serde::Serialize;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};

use crate::{
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{DataType, SnapshotEntry, SseEvent},
};

use super::payloads::PayloadBuilders;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one push connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Write side of one open event stream
///
/// Clones share the same id and closed flag. Once closed a handle stays
/// closed and the hub refuses to register it again.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    sender: mpsc::Sender<Event>,
    closed: Arc<AtomicBool>,
}

impl Connection {
    /// Creates a handle and the receiver its events arrive on
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Event>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let connection = Self {
            id: ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)),
            sender,
            closed: Arc::new(AtomicBool::new(false)),
        };
        (connection, receiver)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Non-blocking write; a full buffer counts as a dead client
    fn try_write(&self, event: Event) -> Result<(), &'static str> {
        self.sender.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => "buffer full",
            TrySendError::Closed(_) => "receiver closed",
        })
    }
}

/// A live-set entry: the handle plus the heartbeat that runs while it is registered
struct Registration {
    connection: Connection,
    heartbeat: JoinHandle<()>,
}

/// Result of writing one event to the live set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastOutcome {
    pub delivered: usize,
    pub dropped: usize,
}

/// What one successful announce cached and how the broadcast went
#[derive(Debug, Clone, PartialEq)]
pub struct Announcement {
    pub entry: SnapshotEntry,
    pub outcome: BroadcastOutcome,
}

/// Tunables for the hub
#[derive(Debug, Clone, Copy)]
pub struct HubSettings {
    pub heartbeat_interval: Duration,
    pub connection_buffer: usize,
    pub snapshot_ttl_secs: u64,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            connection_buffer: 64,
            snapshot_ttl_secs: 86_400,
        }
    }
}

/// Real-time notification hub
///
/// Owns the live connection set and the last snapshot per data type. Locks
/// are held only while the maps change or while senders are cloned out,
/// never across a write, so one slow client cannot stall the rest.
pub struct NotificationHub {
    connections: Mutex<HashMap<ConnectionId, Registration>>,
    snapshots: RwLock<HashMap<DataType, SnapshotEntry>>,
    builders: PayloadBuilders,
    settings: HubSettings,
    mirror: Option<Cache>,
}

impl NotificationHub {
    pub fn new(builders: PayloadBuilders, settings: HubSettings) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            snapshots: RwLock::new(HashMap::new()),
            builders,
            settings,
            mirror: None,
        }
    }

    /// Mirrors every new snapshot to Redis
    pub fn with_mirror(mut self, cache: Cache) -> Self {
        self.mirror = Some(cache);
        self
    }

    fn live(&self) -> MutexGuard<'_, HashMap<ConnectionId, Registration>> {
        self.connections.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds `connection` to the live set and starts its heartbeat
    ///
    /// Returns false for a closed handle. Registering the same handle twice
    /// keeps a single entry and a single heartbeat. Must be called from
    /// within the tokio runtime.
    pub fn register_connection(self: &Arc<Self>, connection: &Connection) -> bool {
        let mut live = self.live();

        // unregister closes under this same lock
        if connection.is_closed() {
            tracing::debug!(connection = %connection.id, "Refusing to register closed connection");
            return false;
        }
        if live.contains_key(&connection.id) {
            return true;
        }

        let heartbeat = tokio::spawn(heartbeat_loop(
            Arc::downgrade(self),
            connection.id,
            self.settings.heartbeat_interval,
        ));
        live.insert(
            connection.id,
            Registration {
                connection: connection.clone(),
                heartbeat,
            },
        );
        tracing::debug!(connection = %connection.id, live = live.len(), "Connection registered");
        true
    }

    /// Removes a connection, closes its handle and stops its heartbeat; unknown ids are ignored
    pub fn unregister_connection(&self, id: ConnectionId) {
        let removed = {
            let mut live = self.live();
            live.remove(&id).map(|registration| {
                registration.connection.close();
                (registration, live.len())
            })
        };

        if let Some((registration, remaining)) = removed {
            registration.heartbeat.abort();
            tracing::debug!(connection = %id, live = remaining, "Connection unregistered");
        }
    }

    pub fn connection_count(&self) -> usize {
        self.live().len()
    }

    pub fn is_registered(&self, id: ConnectionId) -> bool {
        self.live().contains_key(&id)
    }

    /// Drops every live connection so open streams end
    pub fn close_all(&self) {
        let drained: Vec<Registration> = self
            .live()
            .drain()
            .map(|(_, registration)| {
                registration.connection.close();
                registration
            })
            .collect();

        for registration in &drained {
            registration.heartbeat.abort();
        }
        tracing::info!(closed = drained.len(), "Closed all live connections");
    }

    /// Writes `event` to every live connection
    ///
    /// Connections whose write fails are unregistered; the others still
    /// receive the event. Never fails.
    pub fn broadcast(&self, event: &SseEvent) -> BroadcastOutcome {
        let Some(wire) = encode(event) else {
            return BroadcastOutcome::default();
        };
        let targets: Vec<Connection> = self
            .live()
            .values()
            .map(|registration| registration.connection.clone())
            .collect();

        let mut outcome = BroadcastOutcome::default();
        for connection in targets {
            // unregistered since the targets were taken
            if connection.is_closed() {
                continue;
            }

            match connection.try_write(wire.clone()) {
                Ok(()) => outcome.delivered += 1,
                Err(reason) => {
                    tracing::debug!(connection = %connection.id, reason, "Dropping connection after failed write");
                    self.unregister_connection(connection.id);
                    outcome.dropped += 1;
                }
            }
        }

        outcome
    }

    /// Writes `event` to one live connection. False if it is not (or no longer) registered.
    pub fn send_to(&self, id: ConnectionId, event: &SseEvent) -> bool {
        let Some(connection) = self
            .live()
            .get(&id)
            .map(|registration| registration.connection.clone())
        else {
            return false;
        };
        if connection.is_closed() {
            return false;
        }
        let Some(wire) = encode(event) else {
            return false;
        };

        match connection.try_write(wire) {
            Ok(()) => true,
            Err(reason) => {
                tracing::debug!(connection = %id, reason, "Dropping connection after failed write");
                self.unregister_connection(id);
                false
            }
        }
    }

    /// Recomputes the snapshot for `data_type`, caches it, then pushes it to every connection
    ///
    /// Fails without broadcasting when no builder is registered or the
    /// builder fails; the previous snapshot is kept in that case.
    pub async fn announce(&self, data_type: DataType) -> AppResult<Announcement> {
        let builder = self.builders.get(data_type).ok_or_else(|| {
            AppError::PayloadBuild(format!("no payload builder registered for {}", data_type))
        })?;

        let payload = builder.build().await.map_err(|e| match e {
            err @ AppError::DataAccess(_) => err,
            other => AppError::PayloadBuild(format!("{} builder failed: {}", data_type, other)),
        })?;

        let entry = SnapshotEntry {
            payload,
            computed_at: Utc::now(),
        };
        self.store_snapshot(data_type, entry.clone());

        let outcome = self.broadcast(&SseEvent::update(data_type, &entry));

        tracing::info!(
            data_type = %data_type,
            delivered = outcome.delivered,
            dropped = outcome.dropped,
            "Announced data change"
        );

        Ok(Announcement { entry, outcome })
    }

    fn store_snapshot(&self, data_type: DataType, entry: SnapshotEntry) {
        if let Some(mirror) = &self.mirror {
            mirror.set_in_background(
                &CacheKey::Snapshot(data_type),
                &entry,
                self.settings.snapshot_ttl_secs,
            );
        }

        self.snapshots
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(data_type, entry);
    }

    /// Last snapshot computed in this process
    pub fn snapshot(&self, data_type: DataType) -> Option<SnapshotEntry> {
        self.snapshots
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&data_type)
            .cloned()
    }

    /// Last snapshot, falling back to the Redis mirror (e.g. after a restart)
    pub async fn load_snapshot(&self, data_type: DataType) -> AppResult<Option<SnapshotEntry>> {
        if let Some(entry) = self.snapshot(data_type) {
            return Ok(Some(entry));
        }

        match &self.mirror {
            Some(mirror) => mirror.get_from_cache(&CacheKey::Snapshot(data_type)).await,
            None => Ok(None),
        }
    }

    /// Data types with a snapshot in this process, in stable order
    pub fn cached_data_types(&self) -> Vec<DataType> {
        let mut types: Vec<DataType> = self
            .snapshots
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .copied()
            .collect();
        types.sort();
        types
    }

    /// Data types that can be announced
    pub fn announceable_data_types(&self) -> Vec<DataType> {
        self.builders.data_types()
    }

    /// Opens a push connection
    ///
    /// The `connected` event is queued before the connection joins the live
    /// set, so it is always the first event on the stream.
    pub fn connect(self: &Arc<Self>) -> LiveConnection {
        let (connection, receiver) = Connection::channel(self.settings.connection_buffer);
        let id = connection.id();

        if let Some(connected) = encode(&SseEvent::connected(Utc::now())) {
            if let Err(reason) = connection.try_write(connected) {
                tracing::warn!(connection = %id, reason, "Failed to queue connected event");
            }
        }
        self.register_connection(&connection);
        // the hub's clone is now the only sender left
        drop(connection);

        tracing::info!(connection = %id, live = self.connection_count(), "Client connected");

        LiveConnection {
            id,
            receiver,
            hub: Arc::clone(self),
        }
    }
}

fn encode(event: &SseEvent) -> Option<Event> {
    match event.to_event() {
        Ok(wire) => Some(wire),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode event");
            None
        }
    }
}

async fn heartbeat_loop(hub: Weak<NotificationHub>, id: ConnectionId, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(hub) = hub.upgrade() else {
            break;
        };
        if !hub.send_to(id, &SseEvent::heartbeat(Utc::now())) {
            tracing::debug!(connection = %id, "Heartbeat stopped");
            break;
        }
    }
}

/// Read side of a push connection, streamed as the SSE response body
///
/// Dropping it (client went away, response finished, server shutdown)
/// unregisters the connection and stops its heartbeat before `drop` returns.
pub struct LiveConnection {
    id: ConnectionId,
    receiver: mpsc::Receiver<Event>,
    hub: Arc<NotificationHub>,
}

impl LiveConnection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Stream for LiveConnection {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx).map(|event| event.map(Ok))
    }
}

impl Drop for LiveConnection {
    fn drop(&mut self) {
        self.hub.unregister_connection(self.id);
        tracing::info!(connection = %self.id, "Client disconnected");
    }
}
