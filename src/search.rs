use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::models::CatalogItem;
use crate::models::CatalogSnapshot;

pub const MAX_SEARCH_RESULTS: usize = 10;

struct Haystack {
  name: String,
  description: String,
  categories: Vec<String>,
}

impl Haystack {
  fn contains(&self, needle: &str) -> bool {
    self.name.contains(needle)
      || self.description.contains(needle)
      || self.categories.iter().any(|c| c.contains(needle))
  }
}

struct IndexState {
  snapshot: Arc<CatalogSnapshot>,
  haystacks: Vec<Haystack>,
}

/// Case-insensitive substring search over the current catalog snapshot. The
/// lowercase haystacks are rebuilt at most once per snapshot version, on the
/// first search that observes a newer snapshot.
pub struct SearchIndex {
  state: RwLock<Option<IndexState>>,
}

impl SearchIndex {
  pub fn new() -> Self {
    Self {
      state: RwLock::new(None),
    }
  }

  pub async fn search(
    &self,
    snapshot: &Arc<CatalogSnapshot>,
    query: &str,
    max_results: usize,
  ) -> Vec<CatalogItem> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
      return Vec::new();
    }

    self.ensure_current(snapshot).await;

    let state = self.state.read().await;
    let Some(state) = state.as_ref() else {
      return Vec::new();
    };

    let mut results = Vec::new();
    for (item, haystack) in state.snapshot.items.iter().zip(&state.haystacks) {
      if results.len() >= max_results {
        break;
      }
      if haystack.contains(&needle) {
        results.push(item.clone());
      }
    }
    results
  }

  async fn ensure_current(&self, snapshot: &Arc<CatalogSnapshot>) {
    if let Some(state) = self.state.read().await.as_ref()
      && state.snapshot.version == snapshot.version
    {
      return;
    }

    let mut state = self.state.write().await;
    if let Some(existing) = state.as_ref()
      && existing.snapshot.version == snapshot.version
    {
      return;
    }

    debug!(version = snapshot.version, item_count = snapshot.items.len(), "rebuilding search index");
    let haystacks = snapshot
      .items
      .iter()
      .map(|item| Haystack {
        name: item.name.to_lowercase(),
        description: item.description.as_deref().unwrap_or_default().to_lowercase(),
        categories: item.categories.iter().map(|c| c.to_lowercase()).collect(),
      })
      .collect();
    *state = Some(IndexState {
      snapshot: Arc::clone(snapshot),
      haystacks,
    });
  }
}
