use std::sync::Arc;

use anyhow::Context;
use teloxide::ApiError;
use teloxide::RequestError;
use teloxide::dispatching::UpdateHandler;
use teloxide::dptree;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use teloxide::types::ChatId;
use teloxide::types::InlineKeyboardMarkup;
use teloxide::types::Message;
use teloxide::types::MessageId;
use teloxide::types::UserId;
use teloxide::utils::command::BotCommands;
use tracing::debug;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::bot::Command;
use crate::bot::HandlerResult;
use crate::bot::callback::CallbackCommand;
use crate::bot::context::AppContext;
use crate::bot::render;
use crate::models::CatalogItem;
use crate::models::StreamEndpoint;
use crate::models::StreamProtocol;
use crate::search::MAX_SEARCH_RESULTS;
use crate::session::SessionMode;

type SharedContext = Arc<AppContext>;

const JOIN_FIRST_TEXT: &str = "🔒 Join the channel first, then send /start.";

pub fn build_schema() -> UpdateHandler<anyhow::Error> {
  let message_handler = Update::filter_message()
    .branch(command_branch())
    .branch(dptree::endpoint(handle_text_message));

  let callback_handler = Update::filter_callback_query().endpoint(handle_callback_query);

  dptree::entry().branch(message_handler).branch(callback_handler)
}

fn command_branch() -> UpdateHandler<anyhow::Error> {
  dptree::entry()
    .filter_command::<Command>()
    .branch(dptree::case![Command::Start].endpoint(handle_start))
    .branch(dptree::case![Command::Search(term)].endpoint(handle_search_command))
    .branch(dptree::case![Command::Help].endpoint(handle_help))
}

#[instrument(skip(bot, ctx, msg))]
async fn handle_start(bot: Bot, ctx: SharedContext, msg: Message) -> HandlerResult {
  let user = msg.from.as_ref().context("message missing sender")?;
  ctx.sessions().reset(user.id).await;
  info!(user_id = user.id.0, chat_id = %msg.chat.id, "received /start command");

  let membership = ctx.gate().check(&bot, user.id).await;
  ctx.sessions().set_authorized(user.id, membership.allows()).await;

  if membership.allows() {
    bot
      .send_message(msg.chat.id, render::welcome_text())
      .reply_markup(render::main_menu_keyboard())
      .await?;
  } else {
    info!(user_id = user.id.0, ?membership, "gated /start, sending join prompt");
    bot
      .send_message(msg.chat.id, render::join_prompt_text(ctx.required_channel()))
      .reply_markup(render::join_prompt_keyboard(ctx.join_url().as_deref()))
      .await?;
  }
  Ok(())
}

#[instrument(skip(bot, ctx, msg, term))]
async fn handle_search_command(bot: Bot, ctx: SharedContext, msg: Message, term: String) -> HandlerResult {
  let user = msg.from.as_ref().context("message missing sender")?;
  let entry = ctx.sessions().get(user.id).await;
  if !entry.authorized {
    bot.send_message(msg.chat.id, JOIN_FIRST_TEXT).await?;
    return Ok(());
  }

  let term = term.trim();
  if term.is_empty() {
    let version = ctx.catalog().current().await.version;
    ctx
      .sessions()
      .transition(user.id, SessionMode::AwaitingSearchTerm, version, None)
      .await;
    bot.send_message(msg.chat.id, render::SEARCH_PROMPT_TEXT).await?;
    return Ok(());
  }

  run_search(&bot, &ctx, msg.chat.id, user.id, term).await
}

#[instrument(skip(bot, msg))]
async fn handle_help(bot: Bot, msg: Message) -> HandlerResult {
  info!(chat_id = %msg.chat.id, "received /help command");
  let mut text = Command::descriptions().to_string();
  text.push_str("\n\n");
  text.push_str(&render::help_text());
  bot.send_message(msg.chat.id, text).await?;
  Ok(())
}

#[instrument(skip(bot, ctx, msg))]
async fn handle_text_message(bot: Bot, ctx: SharedContext, msg: Message) -> HandlerResult {
  let Some(user) = msg.from.as_ref() else {
    return Ok(());
  };
  let Some(text) = msg.text().map(str::trim).filter(|t| !t.is_empty()) else {
    return Ok(());
  };

  let entry = ctx.sessions().get(user.id).await;
  match entry.mode {
    SessionMode::AwaitingSearchTerm => run_search(&bot, &ctx, msg.chat.id, user.id, text).await,
    SessionMode::Idle => {
      debug!(user_id = user.id.0, chat_id = %msg.chat.id, "ignoring free text outside search mode");
      Ok(())
    },
  }
}

async fn run_search(bot: &Bot, ctx: &SharedContext, chat: ChatId, user: UserId, term: &str) -> HandlerResult {
  let results = resolve_search(ctx, user, term).await;
  info!(user_id = user.0, chat_id = %chat, term, result_count = results.len(), "search executed");

  if results.is_empty() {
    bot.send_message(chat, render::no_results_text(term)).await?;
  } else {
    bot
      .send_message(chat, render::search_results_text(term, results.len()))
      .reply_markup(render::search_results_keyboard(&results))
      .await?;
  }
  Ok(())
}

/// Search against the freshest snapshot; the session always lands in Idle.
async fn resolve_search(ctx: &AppContext, user: UserId, term: &str) -> Vec<CatalogItem> {
  let snapshot = ctx.catalog().fresh().await;
  let results = ctx.index().search(&snapshot, term, MAX_SEARCH_RESULTS).await;
  ctx
    .sessions()
    .transition(user, SessionMode::Idle, snapshot.version, None)
    .await;
  results
}

enum ChannelLookup {
  Found(CatalogItem),
  Missing,
}

/// Revalidate a name-keyed callback against the live snapshot; stale names
/// reset the session instead of dereferencing blindly.
async fn resolve_channel(ctx: &AppContext, user: UserId, name: &str) -> ChannelLookup {
  let snapshot = ctx.catalog().current().await;
  match snapshot.find(name) {
    Some(item) => {
      let item = item.clone();
      ctx
        .sessions()
        .transition(user, SessionMode::Idle, snapshot.version, Some(item.name.clone()))
        .await;
      ChannelLookup::Found(item)
    },
    None => {
      warn!(user_id = user.0, name, "callback referenced a channel missing from the catalog");
      ctx.sessions().reset(user).await;
      ChannelLookup::Missing
    },
  }
}

enum ServerLookup {
  Found(CatalogItem, StreamEndpoint),
  NoEndpoint(CatalogItem),
  Missing,
}

async fn resolve_server(ctx: &AppContext, user: UserId, protocol: StreamProtocol, name: &str) -> ServerLookup {
  let snapshot = ctx.catalog().current().await;
  let Some(item) = snapshot.find(name).cloned() else {
    warn!(user_id = user.0, name, "server callback referenced a missing channel");
    ctx.sessions().reset(user).await;
    return ServerLookup::Missing;
  };

  ctx
    .sessions()
    .transition(user, SessionMode::Idle, snapshot.version, Some(item.name.clone()))
    .await;

  match item.endpoint(protocol).cloned() {
    Some(endpoint) => ServerLookup::Found(item, endpoint),
    None => ServerLookup::NoEndpoint(item),
  }
}

#[instrument(skip(bot, ctx, query))]
async fn handle_callback_query(bot: Bot, ctx: SharedContext, query: CallbackQuery) -> HandlerResult {
  let user_id = query.from.id;
  let message_ctx = query.message.as_ref().map(|message| (message.chat().id, message.id()));
  let raw = query.data.as_deref().unwrap_or("<empty>");

  let mut callback_text: Option<String> = None;
  match query.data.as_deref().and_then(CallbackCommand::parse) {
    None => {
      info!(user_id = user_id.0, data = raw, "dropping unrecognized callback");
    },
    Some(command) => {
      info!(user_id = user_id.0, command = ?command, "handling callback");
      match command {
        CallbackCommand::MainMenu => {
          if ctx.sessions().get(user_id).await.authorized {
            ctx.sessions().reset(user_id).await;
            if let Some((chat, message_id)) = message_ctx {
              edit_menu(
                &bot,
                chat,
                message_id,
                render::MAIN_MENU_TEXT.to_string(),
                render::main_menu_keyboard(),
              )
              .await?;
            }
          } else {
            callback_text = Some(JOIN_FIRST_TEXT.to_string());
          }
        },
        CallbackCommand::ShowChannels => {
          callback_text = show_channel_page(&bot, &ctx, user_id, message_ctx, 0).await?;
        },
        CallbackCommand::Page(page) => {
          callback_text = show_channel_page(&bot, &ctx, user_id, message_ctx, page).await?;
        },
        CallbackCommand::SearchChannels => {
          if ctx.sessions().get(user_id).await.authorized {
            let version = ctx.catalog().current().await.version;
            ctx
              .sessions()
              .transition(user_id, SessionMode::AwaitingSearchTerm, version, None)
              .await;
            if let Some((chat, _)) = message_ctx {
              bot.send_message(chat, render::SEARCH_PROMPT_TEXT).await?;
            }
            callback_text = Some("🔍 Waiting for a search term.".to_string());
          } else {
            callback_text = Some(JOIN_FIRST_TEXT.to_string());
          }
        },
        CallbackCommand::Channel(name) => match resolve_channel(&ctx, user_id, &name).await {
          ChannelLookup::Found(item) => {
            if let Some((chat, message_id)) = message_ctx {
              edit_menu(
                &bot,
                chat,
                message_id,
                render::stream_menu_text(&item),
                render::stream_menu_keyboard(&item),
              )
              .await?;
            }
          },
          ChannelLookup::Missing => {
            if let Some((chat, _)) = message_ctx {
              bot.send_message(chat, render::channel_not_found_text(&name)).await?;
            }
            callback_text = Some("❓ Channel not found".to_string());
          },
        },
        CallbackCommand::Server(protocol, name) => match resolve_server(&ctx, user_id, protocol, &name).await {
          ServerLookup::Found(item, endpoint) => {
            if let Some((chat, _)) = message_ctx {
              bot.send_message(chat, render::stream_details_text(&item, &endpoint)).await?;
            }
          },
          ServerLookup::NoEndpoint(item) => {
            if let Some((chat, _)) = message_ctx {
              bot
                .send_message(chat, render::endpoint_missing_text(&item.name, protocol))
                .await?;
            }
            callback_text = Some("❓ Stream not available".to_string());
          },
          ServerLookup::Missing => {
            if let Some((chat, _)) = message_ctx {
              bot.send_message(chat, render::channel_not_found_text(&name)).await?;
            }
            callback_text = Some("❓ Channel not found".to_string());
          },
        },
        CallbackCommand::RequestAccess => {
          info!(user_id = user_id.0, username = query.from.username.as_deref().unwrap_or("-"), "access request received");
          notify_admins(&bot, &ctx, user_id, query.from.username.as_deref()).await;
          callback_text = Some("📨 Your request was passed along.".to_string());
        },
      }
    },
  }

  if let Some(text) = callback_text {
    bot.answer_callback_query(query.id).text(text).await?;
  } else {
    bot.answer_callback_query(query.id).await?;
  }
  Ok(())
}

/// Paginated catalog listing; returns the callback-answer text, if any.
async fn show_channel_page(
  bot: &Bot,
  ctx: &SharedContext,
  user_id: UserId,
  message_ctx: Option<(ChatId, MessageId)>,
  page: usize,
) -> anyhow::Result<Option<String>> {
  if !ctx.sessions().get(user_id).await.authorized {
    return Ok(Some(JOIN_FIRST_TEXT.to_string()));
  }

  let snapshot = ctx.catalog().fresh().await;
  ctx
    .sessions()
    .transition(user_id, SessionMode::Idle, snapshot.version, None)
    .await;
  if let Some((chat, message_id)) = message_ctx {
    edit_menu(
      bot,
      chat,
      message_id,
      render::channel_list_text(&snapshot, page),
      render::channels_page_keyboard(&snapshot.items, page),
    )
    .await?;
  }
  Ok(None)
}

/// Fire-and-forget: a failed admin notification never fails the interaction.
async fn notify_admins(bot: &Bot, ctx: &SharedContext, user: UserId, username: Option<&str>) {
  let note = format!(
    "📨 Access request from user {} (@{}).",
    user.0,
    username.unwrap_or("-")
  );
  for admin in ctx.admins() {
    if let Err(err) = bot.send_message(ChatId(*admin), note.clone()).await {
      warn!(error = %err, admin_id = admin, "failed to notify admin about access request");
    }
  }
}

async fn edit_menu(
  bot: &Bot,
  chat: ChatId,
  message_id: MessageId,
  text: String,
  keyboard: InlineKeyboardMarkup,
) -> HandlerResult {
  let request = bot.edit_message_text(chat, message_id, text).reply_markup(keyboard);
  match request.await {
    Ok(_) => Ok(()),
    Err(RequestError::Api(ApiError::MessageNotModified)) => {
      debug!(chat_id = %chat, message_id = %message_id, "menu already current");
      Ok(())
    },
    Err(err) => Err(err.into()),
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use teloxide::types::ChatId;
  use teloxide::types::Recipient;
  use teloxide::types::UserId;

  use super::ChannelLookup;
  use super::ServerLookup;
  use super::resolve_channel;
  use super::resolve_search;
  use super::resolve_server;
  use crate::bot::context::AppContext;
  use crate::catalog::CatalogStore;
  use crate::membership::MembershipGate;
  use crate::models::StreamProtocol;
  use crate::search::SearchIndex;
  use crate::session::SessionMode;
  use crate::session::SessionStore;

  const CNN_DOC: &str = r#"{"channels":[{"name":"CNN","url":"http://a","category":["news"]}]}"#;

  /// Context backed by an unreachable remote, so the catalog comes from the
  /// seeded cache file (or ends up empty).
  fn seeded_context(doc: Option<&str>) -> (tempfile::TempDir, AppContext) {
    let dir = tempfile::tempdir().expect("tempdir");
    let cache_path = dir.path().join("cache.json");
    if let Some(doc) = doc {
      std::fs::write(&cache_path, doc).expect("seed cache");
    }
    let catalog = CatalogStore::new(
      "http://127.0.0.1:9/catalog.json".to_string(),
      None,
      cache_path,
      Duration::from_secs(300),
      Duration::from_secs(2),
    )
    .expect("store builds");
    let ctx = AppContext::new(
      catalog,
      SearchIndex::new(),
      SessionStore::new(),
      MembershipGate::new(Recipient::Id(ChatId(-100)), Duration::from_secs(2)),
      "@gate".to_string(),
      Vec::new(),
    );
    (dir, ctx)
  }

  #[tokio::test]
  async fn search_term_yields_single_result_and_resets_mode() {
    let (_dir, ctx) = seeded_context(Some(CNN_DOC));
    let user = UserId(1);
    ctx
      .sessions()
      .transition(user, SessionMode::AwaitingSearchTerm, 0, None)
      .await;

    let results = resolve_search(&ctx, user, "cnn").await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].name, "CNN");
    assert_eq!(ctx.sessions().get(user).await.mode, SessionMode::Idle);
  }

  #[tokio::test]
  async fn stale_channel_callback_reports_missing_without_breaking_state() {
    let (_dir, ctx) = seeded_context(None);
    let user = UserId(1);

    let lookup = resolve_channel(&ctx, user, "CNN").await;
    assert!(matches!(lookup, ChannelLookup::Missing));
    assert_eq!(ctx.sessions().get(user).await.mode, SessionMode::Idle);
  }

  #[tokio::test]
  async fn known_channel_resolves_and_records_pending_selection() {
    let (_dir, ctx) = seeded_context(Some(CNN_DOC));
    let user = UserId(1);

    let lookup = resolve_channel(&ctx, user, "CNN").await;
    let ChannelLookup::Found(item) = lookup else {
      panic!("expected CNN to resolve");
    };
    assert_eq!(item.name, "CNN");

    let entry = ctx.sessions().get(user).await;
    assert_eq!(entry.pending_channel.as_deref(), Some("CNN"));
    assert!(entry.last_snapshot_version > 0);
  }

  #[tokio::test]
  async fn server_callback_reports_missing_endpoint() {
    let (_dir, ctx) = seeded_context(Some(CNN_DOC));
    let user = UserId(1);

    let hls = resolve_server(&ctx, user, StreamProtocol::Hls, "CNN").await;
    assert!(matches!(hls, ServerLookup::Found(_, _)));

    let dash = resolve_server(&ctx, user, StreamProtocol::Dash, "CNN").await;
    assert!(matches!(dash, ServerLookup::NoEndpoint(_)));

    let gone = resolve_server(&ctx, user, StreamProtocol::Hls, "BBC").await;
    assert!(matches!(gone, ServerLookup::Missing));
  }
}
