mod app;
mod bot;
mod catalog;
mod config;
mod membership;
mod models;
mod search;
mod session;
mod telemetry;

use anyhow::Result;
use teloxide::prelude::Bot;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
  telemetry::init()?;
  let config = config::Config::from_env()?;
  info!(
    channel = %config.required_channel,
    cache_path = %config.cache_path.display(),
    "starting channel directory bot"
  );

  let bot = Bot::new(config.bot_token.clone());
  let app = app::App::new(bot, config)?;
  app.run().await
}
