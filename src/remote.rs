//! Remote sync adapters. The remote store holds a single `Envelope`
//! document, replaced wholesale on every write. Adapters never panic
//! or error across this boundary: failures come back as `None`, and the
//! subscription channel simply goes quiet.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

use crate::error::{Error, Result};
use crate::models::{Envelope, StoreData};

/// Bound on any single remote request; callers must never block longer.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);
/// Change-detection poll interval for the HTTP adapter.
const POLL_INTERVAL: Duration = Duration::from_secs(5);

fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Point read of the whole document. `None` on any error; the caller
    /// additionally bounds this with its own timeout.
    async fn load(&self) -> Option<Envelope>;

    /// Full-document replace. Stamps `updatedAt` with the write-time
    /// clock and returns the stamp on success, `None` on failure.
    async fn save(&self, data: &StoreData) -> Option<String>;

    /// Push channel for document changes, including changes caused by
    /// this adapter's own writes. Delivery is at-least-once; consumers
    /// must be idempotent. Dropping the receiver unsubscribes.
    async fn subscribe(&self) -> mpsc::Receiver<Envelope>;
}

/// In-process remote store: one shared document plus a broadcast channel
/// fanning out every write. Used by tests and single-process demos; also
/// doubles as a fault-injection point (failing saves, slow loads).
pub struct MemoryRemote {
    doc: parking_lot::Mutex<Option<Envelope>>,
    events: broadcast::Sender<Envelope>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
    load_delay: parking_lot::Mutex<Option<Duration>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(32);
        MemoryRemote {
            doc: parking_lot::Mutex::new(None),
            events,
            saves: AtomicUsize::new(0),
            fail_saves: AtomicBool::new(false),
            load_delay: parking_lot::Mutex::new(None),
        }
    }

    /// Preloads the document without notifying subscribers.
    pub fn seed(&self, envelope: Envelope) {
        *self.doc.lock() = Some(envelope);
    }

    /// Replaces the document and notifies subscribers, as another device
    /// writing to the same store would.
    pub fn push(&self, envelope: Envelope) {
        *self.doc.lock() = Some(envelope.clone());
        let _ = self.events.send(envelope);
    }

    pub fn document(&self) -> Option<Envelope> {
        self.doc.lock().clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn set_load_delay(&self, delay: Duration) {
        *self.load_delay.lock() = Some(delay);
    }
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn load(&self) -> Option<Envelope> {
        let delay = *self.load_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.doc.lock().clone()
    }

    async fn save(&self, data: &StoreData) -> Option<String> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return None;
        }
        let envelope = Envelope::new(data.clone(), now_stamp());
        *self.doc.lock() = Some(envelope.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        let stamp = envelope.updated_at.clone();
        let _ = self.events.send(envelope);
        Some(stamp)
    }

    async fn subscribe(&self) -> mpsc::Receiver<Envelope> {
        let mut events = self.events.subscribe();
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(envelope) => {
                        if tx.send(envelope).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("remote subscription lagged {n} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        rx
    }
}

#[derive(Debug, Default, Deserialize)]
struct DataResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: StoreData,
    #[serde(default, rename = "lastModified")]
    last_modified: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SaveResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    timestamp: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: StoreData,
}

#[derive(Debug, Serialize)]
struct UploadRequest<'a> {
    #[serde(rename = "csvContent")]
    csv_content: &'a str,
}

/// Adapter for the flat-file HTTP surface: `GET/POST {base}/data` carry
/// the full document, `download`/`upload` carry the backup text.
#[derive(Clone)]
pub struct HttpRemote {
    base: String,
    client: reqwest::Client,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Remote(e.to_string()))?;
        Ok(HttpRemote {
            base: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn fetch(&self) -> Option<(StoreData, Option<String>)> {
        let response = match self
            .client
            .get(format!("{}/data", self.base))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("remote fetch failed: {e}");
                return None;
            }
        };
        let body: DataResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!("remote fetch returned malformed body: {e}");
                return None;
            }
        };
        if !body.success {
            return None;
        }
        Some((body.data, body.last_modified))
    }

    /// Streams the current backup file, `None` when the store has none.
    pub async fn download_backup(&self) -> Option<String> {
        let response = self
            .client
            .get(format!("{}/data/download", self.base))
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.text().await.ok()
    }

    /// Replaces the remote store with raw backup text; returns the
    /// decoded collections as the server parsed them.
    pub async fn upload_backup(&self, csv_content: &str) -> Result<StoreData> {
        let response = self
            .client
            .post(format!("{}/data/upload", self.base))
            .json(&UploadRequest { csv_content })
            .send()
            .await
            .map_err(|e| Error::Remote(e.to_string()))?;
        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| Error::Remote(e.to_string()))?;
        if !body.success {
            return Err(Error::Remote("upload rejected".to_string()));
        }
        Ok(body.data)
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn load(&self) -> Option<Envelope> {
        let (data, last_modified) = self.fetch().await?;
        Some(Envelope::new(data, last_modified.unwrap_or_default()))
    }

    async fn save(&self, data: &StoreData) -> Option<String> {
        let response = match self
            .client
            .post(format!("{}/data", self.base))
            .json(data)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("remote save failed: {e}");
                return None;
            }
        };
        let body: SaveResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!("remote save returned malformed body: {e}");
                return None;
            }
        };
        if !body.success {
            return None;
        }
        Some(body.timestamp.unwrap_or_else(now_stamp))
    }

    async fn subscribe(&self) -> mpsc::Receiver<Envelope> {
        let (tx, rx) = mpsc::channel(16);
        let probe = self.clone();
        tokio::spawn(async move {
            let mut last_seen: Option<String> = None;
            let mut ticker = tokio::time::interval(POLL_INTERVAL);
            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    break;
                }
                if let Some((data, last_modified)) = probe.fetch().await {
                    let stamp = last_modified.unwrap_or_default();
                    if last_seen.as_deref() != Some(stamp.as_str()) {
                        last_seen = Some(stamp.clone());
                        if tx.send(Envelope::new(data, stamp)).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
        rx
    }
}
