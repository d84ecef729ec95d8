use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use teloxide::types::UserId;
use tokio::sync::Mutex;
use tokio::sync::RwLock;
use tracing::debug;

pub const MAX_SESSIONS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionMode {
  #[default]
  Idle,
  AwaitingSearchTerm,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionEntry {
  pub mode: SessionMode,
  pub authorized: bool,
  pub last_snapshot_version: u64,
  pub pending_channel: Option<String>,
  pub last_active: Instant,
}

impl SessionEntry {
  fn idle() -> Self {
    Self {
      mode: SessionMode::Idle,
      authorized: false,
      last_snapshot_version: 0,
      pending_channel: None,
      last_active: Instant::now(),
    }
  }
}

/// Per-user transient interaction state. The outer lock is held only long
/// enough to fetch or insert the per-user entry; mutation of one user's entry
/// is serialized on that entry's own mutex, so users never block each other.
pub struct SessionStore {
  capacity: usize,
  entries: RwLock<HashMap<UserId, Arc<Mutex<SessionEntry>>>>,
}

impl SessionStore {
  pub fn new() -> Self {
    Self::with_capacity(MAX_SESSIONS)
  }

  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      capacity,
      entries: RwLock::new(HashMap::new()),
    }
  }

  async fn entry(&self, user: UserId) -> Arc<Mutex<SessionEntry>> {
    if let Some(entry) = self.entries.read().await.get(&user) {
      return Arc::clone(entry);
    }

    let mut entries = self.entries.write().await;
    if let Some(entry) = entries.get(&user) {
      return Arc::clone(entry);
    }

    if entries.len() >= self.capacity {
      evict_stalest(&mut entries);
    }

    let entry = Arc::new(Mutex::new(SessionEntry::idle()));
    entries.insert(user, Arc::clone(&entry));
    entry
  }

  /// Read-with-default: an unknown user gets a fresh idle entry.
  pub async fn get(&self, user: UserId) -> SessionEntry {
    let entry = self.entry(user).await;
    let mut guard = entry.lock().await;
    guard.last_active = Instant::now();
    guard.clone()
  }

  pub async fn transition(
    &self,
    user: UserId,
    mode: SessionMode,
    snapshot_version: u64,
    pending_channel: Option<String>,
  ) {
    let entry = self.entry(user).await;
    let mut guard = entry.lock().await;
    guard.mode = mode;
    guard.last_snapshot_version = snapshot_version;
    guard.pending_channel = pending_channel;
    guard.last_active = Instant::now();
    debug!(user_id = user.0, mode = ?guard.mode, "session transition");
  }

  pub async fn set_authorized(&self, user: UserId, authorized: bool) {
    let entry = self.entry(user).await;
    let mut guard = entry.lock().await;
    guard.authorized = authorized;
    guard.last_active = Instant::now();
  }

  pub async fn reset(&self, user: UserId) {
    let entry = self.entry(user).await;
    let mut guard = entry.lock().await;
    guard.mode = SessionMode::Idle;
    guard.pending_channel = None;
    guard.last_active = Instant::now();
  }
}

/// Drop the entry with the oldest `last_active`. Entries currently locked by
/// a live handler are treated as active and skipped.
fn evict_stalest(entries: &mut HashMap<UserId, Arc<Mutex<SessionEntry>>>) {
  let mut stalest: Option<(UserId, Instant)> = None;
  for (user, entry) in entries.iter() {
    let Ok(guard) = entry.try_lock() else {
      continue;
    };
    if stalest.is_none_or(|(_, seen)| guard.last_active < seen) {
      stalest = Some((*user, guard.last_active));
    }
  }
  if let Some((user, _)) = stalest {
    debug!(user_id = user.0, "evicting stale session entry");
    entries.remove(&user);
  }
}

#[cfg(test)]
mod tests {
  use teloxide::types::UserId;

  use super::SessionMode;
  use super::SessionStore;

  #[tokio::test]
  async fn unknown_user_defaults_to_idle() {
    let store = SessionStore::new();
    let entry = store.get(UserId(1)).await;
    assert_eq!(entry.mode, SessionMode::Idle);
    assert!(!entry.authorized);
    assert!(entry.pending_channel.is_none());
  }

  #[tokio::test]
  async fn transition_is_idempotent() {
    let store = SessionStore::new();
    let user = UserId(1);

    store
      .transition(user, SessionMode::AwaitingSearchTerm, 3, Some("CNN".to_string()))
      .await;
    let once = store.get(user).await;
    store
      .transition(user, SessionMode::AwaitingSearchTerm, 3, Some("CNN".to_string()))
      .await;
    let twice = store.get(user).await;

    assert_eq!(once.mode, twice.mode);
    assert_eq!(once.last_snapshot_version, twice.last_snapshot_version);
    assert_eq!(once.pending_channel, twice.pending_channel);
  }

  #[tokio::test]
  async fn reset_returns_to_idle_and_clears_context() {
    let store = SessionStore::new();
    let user = UserId(1);
    store
      .transition(user, SessionMode::AwaitingSearchTerm, 7, Some("CNN".to_string()))
      .await;
    store.reset(user).await;

    let entry = store.get(user).await;
    assert_eq!(entry.mode, SessionMode::Idle);
    assert!(entry.pending_channel.is_none());
    // version bookkeeping survives a reset
    assert_eq!(entry.last_snapshot_version, 7);
  }

  #[tokio::test]
  async fn authorization_survives_mode_transitions() {
    let store = SessionStore::new();
    let user = UserId(1);
    store.set_authorized(user, true).await;
    store.transition(user, SessionMode::AwaitingSearchTerm, 1, None).await;
    assert!(store.get(user).await.authorized);
    store.reset(user).await;
    assert!(store.get(user).await.authorized);
  }

  #[tokio::test]
  async fn capacity_evicts_least_recently_active_user() {
    let store = SessionStore::with_capacity(2);
    let first = UserId(1);
    let second = UserId(2);

    store.transition(first, SessionMode::AwaitingSearchTerm, 1, None).await;
    store.transition(second, SessionMode::AwaitingSearchTerm, 1, None).await;
    // touch the first user so the second becomes stalest
    store.get(first).await;

    let third = UserId(3);
    store.get(third).await;

    assert_eq!(store.get(first).await.mode, SessionMode::AwaitingSearchTerm);
    // the evicted user comes back as a fresh idle entry
    assert_eq!(store.get(second).await.mode, SessionMode::Idle);
  }
}
