use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::sync::RwLock;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::models::CatalogItem;
use crate::models::CatalogSnapshot;
use crate::models::DrmKey;
use crate::models::SnapshotSource;
use crate::models::StreamEndpoint;
use crate::models::StreamProtocol;

#[derive(Debug, Error)]
pub enum FetchError {
  #[error("catalog request failed: {0}")]
  Http(#[from] reqwest::Error),
  #[error("catalog source returned {0}")]
  Status(StatusCode),
  #[error("catalog payload malformed: {0}")]
  Envelope(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct Envelope {
  #[serde(default)]
  channels: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct WireChannel {
  name: String,
  #[serde(default)]
  category: Vec<String>,
  #[serde(default)]
  description: Option<String>,
  #[serde(default)]
  url: Option<String>,
  #[serde(default)]
  dash_url: Option<String>,
  #[serde(default)]
  drm: Option<WireDrm>,
}

#[derive(Debug, Deserialize)]
struct WireDrm {
  #[serde(default)]
  clearkey: Option<WireClearkey>,
}

#[derive(Debug, Deserialize)]
struct WireClearkey {
  #[serde(rename = "keyId")]
  key_id: String,
  key: String,
}

impl WireChannel {
  fn into_item(self) -> Result<CatalogItem, &'static str> {
    let name = self.name.trim().to_string();
    if name.is_empty() {
      return Err("empty name");
    }

    let mut endpoints = Vec::new();
    if let Some(url) = self.url.filter(|u| !u.trim().is_empty()) {
      endpoints.push(StreamEndpoint {
        protocol: StreamProtocol::Hls,
        url,
      });
    }
    if let Some(url) = self.dash_url.filter(|u| !u.trim().is_empty()) {
      endpoints.push(StreamEndpoint {
        protocol: StreamProtocol::Dash,
        url,
      });
    }
    if endpoints.is_empty() {
      return Err("no stream endpoints");
    }

    let drm = self.drm.and_then(|d| d.clearkey).map(|clearkey| DrmKey {
      key_id: clearkey.key_id,
      key: clearkey.key,
    });

    Ok(CatalogItem {
      name,
      categories: self.category,
      description: self.description.filter(|d| !d.trim().is_empty()),
      endpoints,
      drm,
    })
  }
}

/// Decode the catalog envelope, skipping items that fail to decode or violate
/// the item invariants. Fails only when the envelope itself is unreadable.
pub(crate) fn parse_catalog(raw: &str) -> Result<Vec<CatalogItem>, serde_json::Error> {
  let envelope: Envelope = serde_json::from_str(raw)?;
  let mut items = Vec::with_capacity(envelope.channels.len());
  for value in envelope.channels {
    match serde_json::from_value::<WireChannel>(value) {
      Ok(wire) => match wire.into_item() {
        Ok(item) => items.push(item),
        Err(reason) => warn!(reason, "skipping invalid catalog item"),
      },
      Err(err) => warn!(error = %err, "skipping malformed catalog item"),
    }
  }
  Ok(items)
}

/// Fetches and caches the item catalog. Refreshes coalesce behind a single
/// in-flight fetch and always yield a snapshot: remote on success, the last
/// persisted cache payload on failure, an empty cache snapshot as last resort.
pub struct CatalogStore {
  http: reqwest::Client,
  source_url: String,
  bearer_token: Option<String>,
  cache_path: PathBuf,
  ttl: Duration,
  version: AtomicU64,
  current: RwLock<Option<Arc<CatalogSnapshot>>>,
  refresh_gate: Mutex<()>,
}

impl CatalogStore {
  pub fn new(
    source_url: String,
    bearer_token: Option<String>,
    cache_path: PathBuf,
    ttl: Duration,
    fetch_timeout: Duration,
  ) -> Result<Self> {
    let http = reqwest::Client::builder().timeout(fetch_timeout).build()?;
    Ok(Self {
      http,
      source_url,
      bearer_token,
      cache_path,
      ttl,
      version: AtomicU64::new(0),
      current: RwLock::new(None),
      refresh_gate: Mutex::new(()),
    })
  }

  async fn installed(&self) -> Option<Arc<CatalogSnapshot>> {
    self.current.read().await.clone()
  }

  /// Most recent snapshot; fetches synchronously only when none exists yet.
  pub async fn current(&self) -> Arc<CatalogSnapshot> {
    match self.installed().await {
      Some(snapshot) => snapshot,
      None => self.refresh().await,
    }
  }

  /// Freshness-policy entry point: reuse the installed snapshot while it is
  /// younger than the configured TTL, refresh otherwise.
  pub async fn fresh(&self) -> Arc<CatalogSnapshot> {
    if let Some(snapshot) = self.installed().await
      && (Utc::now() - snapshot.fetched_at)
        .to_std()
        .map(|age| age < self.ttl)
        .unwrap_or(false)
    {
      return snapshot;
    }
    self.refresh().await
  }

  /// Best-effort refresh; never fails the caller.
  #[instrument(skip(self))]
  pub async fn refresh(&self) -> Arc<CatalogSnapshot> {
    let seen = self.installed().await.map(|s| s.version);
    let _gate = self.refresh_gate.lock().await;

    // A refresh that completed while we waited on the gate counts as ours.
    if let Some(snapshot) = self.installed().await
      && Some(snapshot.version) != seen
    {
      return snapshot;
    }

    let snapshot = match self.fetch_remote().await {
      Ok((raw, items)) => {
        if let Err(err) = tokio::fs::write(&self.cache_path, &raw).await {
          warn!(error = %err, path = %self.cache_path.display(), "failed to persist catalog cache");
        }
        self.install(SnapshotSource::Remote, items).await
      },
      Err(err) => {
        warn!(error = %err, "remote catalog fetch failed, falling back to cache");
        let items = self.load_cache().await;
        self.install(SnapshotSource::Cache, items).await
      },
    };

    info!(
      version = snapshot.version,
      source = snapshot.source.as_str(),
      item_count = snapshot.items.len(),
      "installed catalog snapshot"
    );
    snapshot
  }

  async fn fetch_remote(&self) -> Result<(String, Vec<CatalogItem>), FetchError> {
    let mut request = self.http.get(&self.source_url);
    if let Some(token) = &self.bearer_token {
      request = request.bearer_auth(token);
    }
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
      return Err(FetchError::Status(status));
    }
    let raw = response.text().await?;
    let items = parse_catalog(&raw)?;
    Ok((raw, items))
  }

  async fn load_cache(&self) -> Vec<CatalogItem> {
    let raw = match tokio::fs::read_to_string(&self.cache_path).await {
      Ok(raw) => raw,
      Err(err) => {
        warn!(error = %err, path = %self.cache_path.display(), "no catalog cache available");
        return Vec::new();
      },
    };
    match parse_catalog(&raw) {
      Ok(items) => items,
      Err(err) => {
        warn!(error = %err, path = %self.cache_path.display(), "catalog cache is unreadable");
        Vec::new()
      },
    }
  }

  async fn install(&self, source: SnapshotSource, items: Vec<CatalogItem>) -> Arc<CatalogSnapshot> {
    let snapshot = Arc::new(CatalogSnapshot {
      version: self.version.fetch_add(1, Ordering::Relaxed) + 1,
      fetched_at: Utc::now(),
      source,
      items,
    });
    *self.current.write().await = Some(Arc::clone(&snapshot));
    snapshot
  }
}
