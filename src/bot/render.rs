use teloxide::types::InlineKeyboardButton;
use teloxide::types::InlineKeyboardMarkup;
use tracing::warn;

use crate::bot::callback::CallbackCommand;
use crate::models::CatalogItem;
use crate::models::CatalogSnapshot;
use crate::models::SnapshotSource;
use crate::models::StreamEndpoint;
use crate::models::StreamProtocol;

pub const MAIN_MENU_TEXT: &str = "📡 Channel directory. What would you like to do?";
pub const SEARCH_PROMPT_TEXT: &str = "🔍 Send a search term (channel name, category, or description):";

const PLACEHOLDER: &str = "N/A";
const CATALOG_ROW_WIDTH: usize = 3;
pub const PAGE_BUTTONS: usize = 24;
// callback data is capped at 64 bytes; "server_dash_" is the longest prefix
const MAX_CALLBACK_NAME: usize = 52;

pub fn welcome_text() -> String {
  "🤖 Welcome to the channel directory!\n\n\
   • 📺 browse the full channel list\n\
   • 🔍 search by name, category, or description\n\n\
   Commands: /start, /search <term>, /help"
    .to_string()
}

pub fn help_text() -> String {
  "📖 Help\n\n\
   Search tips:\n\
   - Use /search with a keyword, or the 🔍 button\n\
   - Channels match by name, description, or category\n\
   - Pick a channel, then a stream server, to get the playback link\n\n\
   Example searches:\n\
   /search sports\n\
   /search news\n\
   /search movies"
    .to_string()
}

pub fn join_prompt_text(channel: &str) -> String {
  format!(
    "🔒 This bot is available to members of {channel} only.\n\nJoin the channel and send /start again."
  )
}

pub fn join_prompt_keyboard(join_url: Option<&str>) -> InlineKeyboardMarkup {
  let mut rows = Vec::new();
  if let Some(url) = join_url.and_then(|u| reqwest::Url::parse(u).ok()) {
    rows.push(vec![InlineKeyboardButton::url("📣 Join channel", url)]);
  }
  rows.push(vec![InlineKeyboardButton::callback(
    "📨 Request access",
    CallbackCommand::RequestAccess.encode(),
  )]);
  InlineKeyboardMarkup::new(rows)
}

pub fn main_menu_keyboard() -> InlineKeyboardMarkup {
  InlineKeyboardMarkup::new(vec![
    vec![InlineKeyboardButton::callback(
      "📺 All channels",
      CallbackCommand::ShowChannels.encode(),
    )],
    vec![InlineKeyboardButton::callback(
      "🔍 Search channels",
      CallbackCommand::SearchChannels.encode(),
    )],
  ])
}

pub fn page_count(total: usize) -> usize {
  total.div_ceil(PAGE_BUTTONS).max(1)
}

pub fn channel_list_text(snapshot: &CatalogSnapshot, page: usize) -> String {
  // paged over the same filtered list as channels_page_keyboard
  let selectable = snapshot.items.iter().filter(|item| item.name.len() <= MAX_CALLBACK_NAME).count();
  let pages = page_count(selectable);
  let mut text = format!(
    "📺 Channels ({}) — page {}/{}",
    snapshot.items.len(),
    page.min(pages - 1) + 1,
    pages
  );
  if snapshot.items.is_empty() {
    text.push_str("\n\nThe catalog is empty right now, try again later.");
  }
  if snapshot.source == SnapshotSource::Cache {
    text.push_str("\n\n⚠️ Showing the cached catalog; the source is unreachable.");
  }
  text
}

/// Catalog listing: rows of three name buttons, a prev/next row when there is
/// more than one page, and a back-to-menu row.
pub fn channels_page_keyboard(items: &[CatalogItem], page: usize) -> InlineKeyboardMarkup {
  let selectable: Vec<&CatalogItem> = items.iter().filter(|item| fits_callback(&item.name)).collect();
  let pages = page_count(selectable.len());
  let page = page.min(pages - 1);
  let visible = &selectable[page * PAGE_BUTTONS .. ((page + 1) * PAGE_BUTTONS).min(selectable.len())];

  let mut rows: Vec<Vec<InlineKeyboardButton>> = Vec::new();
  for chunk in visible.chunks(CATALOG_ROW_WIDTH) {
    rows.push(
      chunk
        .iter()
        .map(|item| {
          InlineKeyboardButton::callback(
            format!("📺 {}", item.name),
            CallbackCommand::Channel(item.name.clone()).encode(),
          )
        })
        .collect(),
    );
  }

  let mut nav = Vec::new();
  if page > 0 {
    nav.push(InlineKeyboardButton::callback(
      "⬅️ Prev",
      CallbackCommand::Page(page - 1).encode(),
    ));
  }
  if page + 1 < pages {
    nav.push(InlineKeyboardButton::callback(
      "Next ➡️",
      CallbackCommand::Page(page + 1).encode(),
    ));
  }
  if !nav.is_empty() {
    rows.push(nav);
  }

  rows.push(vec![InlineKeyboardButton::callback(
    "⬅️ Main menu",
    CallbackCommand::MainMenu.encode(),
  )]);
  InlineKeyboardMarkup::new(rows)
}

pub fn search_results_text(query: &str, count: usize) -> String {
  format!("Found {count} channel(s) matching '{query}':")
}

pub fn no_results_text(query: &str) -> String {
  format!("No channels found matching '{query}'.")
}

/// Search results get one button per row; result labels run long.
pub fn search_results_keyboard(items: &[CatalogItem]) -> InlineKeyboardMarkup {
  let rows = items
    .iter()
    .filter(|item| fits_callback(&item.name))
    .map(|item| {
      vec![InlineKeyboardButton::callback(
        format!("📺 {}", item.name),
        CallbackCommand::Channel(item.name.clone()).encode(),
      )]
    })
    .collect::<Vec<_>>();
  InlineKeyboardMarkup::new(rows)
}

pub fn stream_menu_text(item: &CatalogItem) -> String {
  let categories = if item.categories.is_empty() {
    PLACEHOLDER.to_string()
  } else {
    item.categories.join(", ")
  };
  format!(
    "📺 {}\n\nDescription: {}\nCategories: {}\n\nPick a stream server:",
    item.name,
    item.description.as_deref().unwrap_or(PLACEHOLDER),
    categories
  )
}

/// Stream-server sub-menu: one button per available protocol plus a back
/// control to the channel list.
pub fn stream_menu_keyboard(item: &CatalogItem) -> InlineKeyboardMarkup {
  let mut rows: Vec<Vec<InlineKeyboardButton>> = item
    .endpoints
    .iter()
    .map(|endpoint| {
      vec![InlineKeyboardButton::callback(
        format!("▶️ {}", endpoint.protocol.label()),
        CallbackCommand::Server(endpoint.protocol, item.name.clone()).encode(),
      )]
    })
    .collect();
  rows.push(vec![InlineKeyboardButton::callback(
    "⬅️ Channels",
    CallbackCommand::ShowChannels.encode(),
  )]);
  InlineKeyboardMarkup::new(rows)
}

pub fn stream_details_text(item: &CatalogItem, endpoint: &StreamEndpoint) -> String {
  let mut text = format!(
    "📺 {}\n\nProtocol: {}\nURL: {}",
    item.name,
    endpoint.protocol.label(),
    endpoint.url
  );
  if endpoint.protocol == StreamProtocol::Dash {
    match &item.drm {
      Some(drm) => {
        text.push_str(&format!("\n\nClearkey key id: {}\nClearkey key: {}", drm.key_id, drm.key));
      },
      None => text.push_str("\n\nDRM: none"),
    }
  }
  text
}

pub fn channel_not_found_text(name: &str) -> String {
  format!("❓ Channel '{name}' is no longer in the catalog.")
}

pub fn endpoint_missing_text(name: &str, protocol: StreamProtocol) -> String {
  format!("❓ Channel '{name}' has no {} stream.", protocol.label())
}

fn fits_callback(name: &str) -> bool {
  if name.len() > MAX_CALLBACK_NAME {
    warn!(name, "channel name too long for callback data, hiding button");
    return false;
  }
  true
}

#[cfg(test)]
mod tests {
  use chrono::Utc;

  use super::*;
  use crate::models::DrmKey;
  use crate::models::SnapshotSource;

  fn item(name: &str) -> CatalogItem {
    CatalogItem {
      name: name.to_string(),
      categories: Vec::new(),
      description: None,
      endpoints: vec![
        StreamEndpoint {
          protocol: StreamProtocol::Hls,
          url: format!("http://example/{name}.m3u8"),
        },
        StreamEndpoint {
          protocol: StreamProtocol::Dash,
          url: format!("http://example/{name}.mpd"),
        },
      ],
      drm: None,
    }
  }

  #[test]
  fn catalog_keyboard_uses_rows_of_three_with_back_row() {
    let items: Vec<_> = (0 .. 7).map(|i| item(&format!("Ch{i}"))).collect();
    let keyboard = channels_page_keyboard(&items, 0);
    let rows = &keyboard.inline_keyboard;

    // 3 + 3 + 1 item rows, then the back row
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0].len(), 3);
    assert_eq!(rows[1].len(), 3);
    assert_eq!(rows[2].len(), 1);
    assert_eq!(rows[3][0].text, "⬅️ Main menu");
  }

  #[test]
  fn catalog_keyboard_paginates_past_the_page_size() {
    let items: Vec<_> = (0 .. PAGE_BUTTONS + 1).map(|i| item(&format!("Ch{i}"))).collect();

    let first = channels_page_keyboard(&items, 0);
    let nav_row = &first.inline_keyboard[first.inline_keyboard.len() - 2];
    assert_eq!(nav_row.len(), 1);
    assert_eq!(nav_row[0].text, "Next ➡️");

    let second = channels_page_keyboard(&items, 1);
    let nav_row = &second.inline_keyboard[second.inline_keyboard.len() - 2];
    assert_eq!(nav_row[0].text, "⬅️ Prev");
    // out-of-range pages clamp to the last page
    let clamped = channels_page_keyboard(&items, 99);
    assert_eq!(clamped.inline_keyboard, second.inline_keyboard);
  }

  #[test]
  fn search_results_use_one_button_per_row() {
    let items = vec![item("CNN International"), item("BBC World News")];
    let keyboard = search_results_keyboard(&items);
    assert_eq!(keyboard.inline_keyboard.len(), 2);
    assert!(keyboard.inline_keyboard.iter().all(|row| row.len() == 1));
  }

  #[test]
  fn oversized_names_are_hidden_from_keyboards() {
    let items = vec![item(&"x".repeat(80)), item("CNN")];
    let keyboard = search_results_keyboard(&items);
    assert_eq!(keyboard.inline_keyboard.len(), 1);
  }

  #[test]
  fn stream_menu_substitutes_placeholders() {
    let text = stream_menu_text(&item("CNN"));
    assert!(text.contains("Description: N/A"));
    assert!(text.contains("Categories: N/A"));
  }

  #[test]
  fn stream_menu_offers_each_endpoint_and_back() {
    let keyboard = stream_menu_keyboard(&item("CNN"));
    assert_eq!(keyboard.inline_keyboard.len(), 3);
    assert_eq!(keyboard.inline_keyboard[0][0].text, "▶️ HLS");
    assert_eq!(keyboard.inline_keyboard[1][0].text, "▶️ DASH");
    assert_eq!(keyboard.inline_keyboard[2][0].text, "⬅️ Channels");
  }

  #[test]
  fn stream_details_include_clearkey_for_dash() {
    let mut channel = item("Arte");
    channel.drm = Some(DrmKey {
      key_id: "kid".to_string(),
      key: "k".to_string(),
    });
    let endpoint = channel.endpoint(StreamProtocol::Dash).cloned().expect("dash endpoint");
    let text = stream_details_text(&channel, &endpoint);
    assert!(text.contains("Clearkey key id: kid"));

    let hls = channel.endpoint(StreamProtocol::Hls).cloned().expect("hls endpoint");
    assert!(!stream_details_text(&channel, &hls).contains("Clearkey"));
  }

  #[test]
  fn listing_header_pages_match_the_keyboard_when_names_are_hidden() {
    // PAGE_BUTTONS visible items plus one hidden oversized name: one page
    let mut items: Vec<_> = (0 .. PAGE_BUTTONS).map(|i| item(&format!("Ch{i}"))).collect();
    items.push(item(&"x".repeat(80)));
    let snapshot = CatalogSnapshot {
      version: 1,
      fetched_at: Utc::now(),
      source: SnapshotSource::Remote,
      items,
    };

    assert!(channel_list_text(&snapshot, 0).contains("page 1/1"));
    let keyboard = channels_page_keyboard(&snapshot.items, 0);
    let nav_row = &keyboard.inline_keyboard[keyboard.inline_keyboard.len() - 2];
    assert!(nav_row.iter().all(|button| button.text != "Next ➡️"));
  }

  #[test]
  fn cached_snapshot_is_flagged_in_the_listing() {
    let snapshot = CatalogSnapshot {
      version: 1,
      fetched_at: Utc::now(),
      source: SnapshotSource::Cache,
      items: vec![item("CNN")],
    };
    assert!(channel_list_text(&snapshot, 0).contains("cached catalog"));
  }
}
