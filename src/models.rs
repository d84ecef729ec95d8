use chrono::DateTime;
use chrono::Utc;

/// Delivery protocols the catalog source can announce for an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamProtocol {
  Hls,
  Dash,
}

impl StreamProtocol {
  pub fn as_str(self) -> &'static str {
    match self {
      StreamProtocol::Hls => "hls",
      StreamProtocol::Dash => "dash",
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      StreamProtocol::Hls => "HLS",
      StreamProtocol::Dash => "DASH",
    }
  }

  pub fn parse(raw: &str) -> Option<Self> {
    match raw {
      "hls" => Some(StreamProtocol::Hls),
      "dash" => Some(StreamProtocol::Dash),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEndpoint {
  pub protocol: StreamProtocol,
  pub url: String,
}

/// Clearkey DRM descriptor carried verbatim from the source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrmKey {
  pub key_id: String,
  pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
  pub name: String,
  pub categories: Vec<String>,
  pub description: Option<String>,
  pub endpoints: Vec<StreamEndpoint>,
  pub drm: Option<DrmKey>,
}

impl CatalogItem {
  pub fn endpoint(&self, protocol: StreamProtocol) -> Option<&StreamEndpoint> {
    self.endpoints.iter().find(|e| e.protocol == protocol)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
  Remote,
  Cache,
}

impl SnapshotSource {
  pub fn as_str(self) -> &'static str {
    match self {
      SnapshotSource::Remote => "remote",
      SnapshotSource::Cache => "cache",
    }
  }
}

/// Immutable view of the catalog at one refresh. Replaced wholesale on every
/// refresh; `version` is process-monotonic and is what callbacks and the
/// search index hold on to instead of the snapshot itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSnapshot {
  pub version: u64,
  pub fetched_at: DateTime<Utc>,
  pub source: SnapshotSource,
  pub items: Vec<CatalogItem>,
}

impl CatalogSnapshot {
  pub fn find(&self, name: &str) -> Option<&CatalogItem> {
    self.items.iter().find(|item| item.name == name)
  }
}
