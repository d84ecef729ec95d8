use crate::catalog::CatalogStore;
use crate::membership::MembershipGate;
use crate::search::SearchIndex;
use crate::session::SessionStore;

/// Shared state handed to every handler through dptree dependencies.
pub struct AppContext {
  catalog: CatalogStore,
  index: SearchIndex,
  sessions: SessionStore,
  gate: MembershipGate,
  required_channel: String,
  admins: Vec<i64>,
}

impl AppContext {
  pub fn new(
    catalog: CatalogStore,
    index: SearchIndex,
    sessions: SessionStore,
    gate: MembershipGate,
    required_channel: String,
    admins: Vec<i64>,
  ) -> Self {
    Self {
      catalog,
      index,
      sessions,
      gate,
      required_channel,
      admins,
    }
  }

  pub fn catalog(&self) -> &CatalogStore {
    &self.catalog
  }

  pub fn index(&self) -> &SearchIndex {
    &self.index
  }

  pub fn sessions(&self) -> &SessionStore {
    &self.sessions
  }

  pub fn gate(&self) -> &MembershipGate {
    &self.gate
  }

  pub fn required_channel(&self) -> &str {
    &self.required_channel
  }

  /// Public join link, derivable only for `@username` channels.
  pub fn join_url(&self) -> Option<String> {
    self
      .required_channel
      .strip_prefix('@')
      .map(|name| format!("https://t.me/{name}"))
  }

  pub fn admins(&self) -> &[i64] {
    &self.admins
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use teloxide::types::ChatId;
  use teloxide::types::Recipient;

  use super::AppContext;
  use crate::catalog::CatalogStore;
  use crate::membership::MembershipGate;
  use crate::search::SearchIndex;
  use crate::session::SessionStore;

  fn context(channel: &str) -> AppContext {
    let catalog = CatalogStore::new(
      "http://127.0.0.1:9/catalog.json".to_string(),
      None,
      std::env::temp_dir().join("ctx-test-cache.json"),
      Duration::from_secs(300),
      Duration::from_secs(2),
    )
    .expect("store builds");
    AppContext::new(
      catalog,
      SearchIndex::new(),
      SessionStore::new(),
      MembershipGate::new(Recipient::Id(ChatId(-100)), Duration::from_secs(2)),
      channel.to_string(),
      Vec::new(),
    )
  }

  #[test]
  fn join_url_only_for_username_channels() {
    assert_eq!(
      context("@streams").join_url(),
      Some("https://t.me/streams".to_string())
    );
    assert_eq!(context("-1001234").join_url(), None);
  }
}
