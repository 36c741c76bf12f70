//! The store engine: canonical in-memory state plus the machinery that
//! keeps it durable locally and mirrored remotely. All reads come out of
//! memory; mutations apply synchronously, then a debounced background
//! flush persists and pushes the new state. Inbound remote pushes replace
//! state wholesale unless they carry our own last write's stamp.

mod mutations;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec;
use crate::error::Result;
use crate::local::{LocalStore, ITEMS_KEY, ORDERS_KEY, USERS_KEY};
use crate::models::{Envelope, Item, Order, StoreData, User, MAX_ORDERS};
use crate::remote::RemoteStore;
use crate::seed;
use crate::util::{default_device_label, IdGen};

/// Quiet period after the last mutation before the flush fires.
pub const DEBOUNCE: Duration = Duration::from_secs(2);
/// How long startup waits on the remote before falling back to local.
pub const REMOTE_LOAD_TIMEOUT: Duration = Duration::from_secs(3);

/// Where the session's initial state came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Remote,
    Local,
    Seed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncStatus {
    /// Whether the most recent remote operation succeeded.
    pub connected: bool,
    /// When state last reached the remote store, in either direction.
    pub last_sync: Option<DateTime<Utc>>,
    pub source: DataSource,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Label recorded on each order placed from this device.
    pub device_label: String,
    /// Max orders retained in canonical state.
    pub retention_cap: usize,
    pub debounce: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            device_label: default_device_label().to_string(),
            retention_cap: MAX_ORDERS,
            debounce: DEBOUNCE,
        }
    }
}

pub(crate) struct Inner {
    pub(crate) state: RwLock<StoreData>,
    pub(crate) current_user: RwLock<User>,
    pub(crate) status: RwLock<SyncStatus>,
    /// Stamp of our last accepted remote write; pushes carrying it are
    /// echoes of our own save and get dropped.
    pub(crate) last_stamp: RwLock<Option<String>>,
    pub(crate) changes: watch::Sender<u64>,
    pub(crate) local: Arc<dyn LocalStore>,
    pub(crate) remote: Arc<dyn RemoteStore>,
    pub(crate) ids: IdGen,
    pub(crate) cfg: EngineConfig,
}

pub struct StoreEngine {
    pub(crate) inner: Arc<Inner>,
    pub(crate) dirty_tx: mpsc::UnboundedSender<()>,
    shutdown: CancellationToken,
    tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl StoreEngine {
    /// Loads initial state (remote, then local, then built-in seed data),
    /// spawns the flush and subscription workers, and returns a running
    /// engine. Infallible: every load failure has a fallback.
    pub async fn start(
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        cfg: EngineConfig,
    ) -> Self {
        let (data, source, stamp) = load_initial(local.as_ref(), remote.as_ref()).await;
        info!(source = ?source, "store engine starting");

        let connected = source == DataSource::Remote;
        let current_user = data.users.first().cloned().unwrap_or_default();
        let (changes, _) = watch::channel(0);

        let inner = Arc::new(Inner {
            state: RwLock::new(data),
            current_user: RwLock::new(current_user),
            status: RwLock::new(SyncStatus {
                connected,
                last_sync: if connected { Some(Utc::now()) } else { None },
                source,
            }),
            last_stamp: RwLock::new(stamp),
            changes,
            local,
            remote,
            ids: IdGen::new(),
            cfg,
        });

        if connected {
            // Remote adoption writes through so a later offline start
            // resumes from this state.
            inner.write_local(&inner.state.read());
        }

        let (dirty_tx, dirty_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let mut tasks = Vec::new();

        // When we started from local or seed data the remote is behind
        // (or empty); push once so other devices see this state.
        if source != DataSource::Remote {
            let inner = inner.clone();
            tasks.push(tokio::spawn(async move {
                let snapshot = inner.state.read().clone();
                match inner.remote.save(&snapshot).await {
                    Some(stamp) => {
                        *inner.last_stamp.write() = Some(stamp);
                        let mut status = inner.status.write();
                        status.connected = true;
                        status.last_sync = Some(Utc::now());
                    }
                    None => debug!("initial remote push skipped, store unreachable"),
                }
            }));
        }

        tasks.push(tokio::spawn(flush_worker(
            inner.clone(),
            dirty_rx,
            shutdown.clone(),
        )));
        // Subscribe before returning so no push lands unobserved between
        // startup and the worker's first poll.
        let pushes = inner.remote.subscribe().await;
        tasks.push(tokio::spawn(subscription_worker(
            inner.clone(),
            pushes,
            shutdown.clone(),
        )));

        StoreEngine {
            inner,
            dirty_tx,
            shutdown,
            tasks: parking_lot::Mutex::new(tasks),
        }
    }

    pub fn data(&self) -> StoreData {
        self.inner.state.read().clone()
    }

    pub fn items(&self) -> Vec<Item> {
        self.inner.state.read().items.clone()
    }

    pub fn orders(&self) -> Vec<Order> {
        self.inner.state.read().orders.clone()
    }

    pub fn users(&self) -> Vec<User> {
        self.inner.state.read().users.clone()
    }

    pub fn status(&self) -> SyncStatus {
        self.inner.status.read().clone()
    }

    pub fn current_user(&self) -> User {
        self.inner.current_user.read().clone()
    }

    /// Version counter bumped on every observable state change. Inbound
    /// pushes we suppress as our own echo do not bump it.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.inner.changes.subscribe()
    }

    /// Flushes immediately, skipping any pending debounce window.
    /// Returns whether the remote write succeeded.
    pub async fn force_sync(&self) -> bool {
        self.inner.flush().await;
        self.inner.status.read().connected
    }

    /// Reloads from the remote store and adopts whatever it returns,
    /// even if older than local state. Returns false when the remote is
    /// unreachable or times out; local state is untouched in that case.
    pub async fn force_refresh(&self) -> bool {
        let loaded = tokio::time::timeout(REMOTE_LOAD_TIMEOUT, self.inner.remote.load()).await;
        match loaded {
            Ok(Some(envelope)) => {
                self.inner.adopt(envelope);
                true
            }
            _ => {
                self.inner.status.write().connected = false;
                false
            }
        }
    }

    /// Current state in the unified backup format.
    pub fn export_backup(&self) -> String {
        codec::encode(&self.inner.state.read())
    }

    /// Replaces all state from a backup document and flushes right away.
    pub async fn import_backup(&self, text: &str) -> Result<()> {
        let mut data = codec::decode(text)?;
        data.orders.truncate(self.inner.cfg.retention_cap);
        {
            let mut state = self.inner.state.write();
            *state = data;
            let mut current = self.inner.current_user.write();
            if !state.users.iter().any(|u| u.id == current.id) {
                *current = state.users.first().cloned().unwrap_or_default();
            }
        }
        self.inner.bump();
        self.inner.flush().await;
        Ok(())
    }

    /// Clears everything, locally and remotely.
    pub async fn reset(&self) {
        {
            let mut state = self.inner.state.write();
            *state = StoreData::default();
            *self.inner.current_user.write() = User::default();
        }
        self.inner.bump();
        self.inner.flush().await;
    }

    /// Stops the background workers. Mutations not yet flushed are
    /// dropped from the remote mirror; local writes already happened.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles: Vec<_> = self.tasks.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }
}

impl Inner {
    /// Persists and pushes a snapshot of current state.
    pub(crate) async fn flush(&self) {
        let snapshot = {
            let mut state = self.state.write();
            let cap = self.cfg.retention_cap;
            if state.orders.len() > cap {
                state.orders.truncate(cap);
            }
            state.clone()
        };
        self.write_local(&snapshot);
        match self.remote.save(&snapshot).await {
            Some(stamp) => {
                *self.last_stamp.write() = Some(stamp);
                let mut status = self.status.write();
                status.connected = true;
                status.last_sync = Some(Utc::now());
            }
            None => {
                warn!("remote save failed, keeping local state authoritative");
                self.status.write().connected = false;
            }
        }
    }

    /// Handles a pushed document: drop it if it echoes our own write,
    /// otherwise adopt it wholesale.
    pub(crate) fn apply_inbound(&self, envelope: Envelope) {
        if self.last_stamp.read().as_deref() == Some(envelope.updated_at.as_str()) {
            debug!("suppressing echo of our own write");
            return;
        }
        self.adopt(envelope);
    }

    /// Replaces state with a remote document, persists it locally, and
    /// records its stamp so the matching push gets suppressed. Never
    /// schedules a remote write: adopting must not echo back.
    pub(crate) fn adopt(&self, envelope: Envelope) {
        let Envelope { mut data, updated_at } = envelope;
        data.orders.truncate(self.cfg.retention_cap);
        {
            let mut state = self.state.write();
            *state = data;
            let mut current = self.current_user.write();
            if !state.users.iter().any(|u| u.id == current.id) {
                *current = state.users.first().cloned().unwrap_or_default();
            }
        }
        *self.last_stamp.write() = Some(updated_at);
        self.write_local(&self.state.read());
        {
            let mut status = self.status.write();
            status.connected = true;
            status.last_sync = Some(Utc::now());
        }
        self.bump();
    }

    pub(crate) fn write_local(&self, data: &StoreData) {
        for (key, value) in [
            (ITEMS_KEY, serde_json::to_string(&data.items)),
            (ORDERS_KEY, serde_json::to_string(&data.orders)),
            (USERS_KEY, serde_json::to_string(&data.users)),
        ] {
            match value {
                Ok(json) => {
                    self.local.write(key, &json);
                }
                Err(e) => warn!("serializing {key} for local store failed: {e}"),
            }
        }
    }

    pub(crate) fn bump(&self) {
        self.changes.send_modify(|v| *v = v.wrapping_add(1));
    }
}

/// Startup load order: remote (bounded), then local, then seed.
async fn load_initial(
    local: &dyn LocalStore,
    remote: &dyn RemoteStore,
) -> (StoreData, DataSource, Option<String>) {
    match tokio::time::timeout(REMOTE_LOAD_TIMEOUT, remote.load()).await {
        Ok(Some(envelope)) if !envelope.data.items.is_empty() => {
            let Envelope { mut data, updated_at } = envelope;
            data.orders.truncate(MAX_ORDERS);
            return (data, DataSource::Remote, Some(updated_at));
        }
        Ok(Some(_)) => debug!("remote document empty, falling back to local"),
        Ok(None) => debug!("remote load failed, falling back to local"),
        Err(_) => debug!("remote load timed out, falling back to local"),
    }

    let items: Option<Vec<Item>> = read_key(local, ITEMS_KEY);
    let orders: Option<Vec<Order>> = read_key(local, ORDERS_KEY);
    let users: Option<Vec<User>> = read_key(local, USERS_KEY);

    if items.is_none() && orders.is_none() && users.is_none() {
        let data = StoreData {
            items: seed::default_items(),
            orders: Vec::new(),
            users: seed::default_users(),
        };
        return (data, DataSource::Seed, None);
    }

    // Per-key fallback: any key that is missing or corrupt gets its
    // seeded default while the others keep their stored values.
    let mut data = StoreData {
        items: items.unwrap_or_else(seed::default_items),
        orders: orders.unwrap_or_default(),
        users: users.unwrap_or_else(seed::default_users),
    };
    data.orders.truncate(MAX_ORDERS);
    (data, DataSource::Local, None)
}

fn read_key<T: serde::de::DeserializeOwned>(local: &dyn LocalStore, key: &str) -> Option<T> {
    let raw = local.read(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("stored value under {key} failed to parse, reseeding: {e}");
            None
        }
    }
}

/// Debounced flush loop: each dirty signal re-arms the timer, and the
/// flush fires once the state has been quiet for the full window. The
/// flush reads state at fire time, so a burst of mutations costs one
/// remote write carrying the final state.
async fn flush_worker(
    inner: Arc<Inner>,
    mut dirty_rx: mpsc::UnboundedReceiver<()>,
    shutdown: CancellationToken,
) {
    let mut deadline: Option<Instant> = None;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                if deadline.is_some() =>
            {
                deadline = None;
                inner.flush().await;
            }
            msg = dirty_rx.recv() => {
                match msg {
                    Some(()) => deadline = Some(Instant::now() + inner.cfg.debounce),
                    None => break,
                }
            }
        }
    }
}

async fn subscription_worker(
    inner: Arc<Inner>,
    mut pushes: mpsc::Receiver<Envelope>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            envelope = pushes.recv() => {
                match envelope {
                    Some(envelope) => inner.apply_inbound(envelope),
                    None => break,
                }
            }
        }
    }
}
