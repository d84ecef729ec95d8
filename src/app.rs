use std::sync::Arc;

use teloxide::dispatching::UpdateHandler;
use teloxide::dptree;
use teloxide::prelude::*;

use crate::bot;
use crate::bot::AppContext;
use crate::catalog::CatalogStore;
use crate::config;
use crate::config::Config;
use crate::membership::MembershipGate;
use crate::search::SearchIndex;
use crate::session::SessionStore;

pub struct App {
  bot: Bot,
  context: Arc<AppContext>,
  handler: UpdateHandler<anyhow::Error>,
}

impl App {
  pub fn new(bot: Bot, config: Config) -> anyhow::Result<Self> {
    let catalog = CatalogStore::new(
      config.catalog_url,
      config.catalog_token,
      config.cache_path,
      config.catalog_ttl,
      config.fetch_timeout,
    )?;
    let gate = MembershipGate::new(config::parse_channel(&config.required_channel)?, config.fetch_timeout);
    let context = Arc::new(AppContext::new(
      catalog,
      SearchIndex::new(),
      SessionStore::new(),
      gate,
      config.required_channel,
      config.admins,
    ));
    let handler = bot::build_schema();
    Ok(Self { bot, context, handler })
  }

  pub async fn run(self) -> anyhow::Result<()> {
    // warm the snapshot so the first interaction never blocks on the source
    self.context.catalog().refresh().await;

    let me = self.bot.get_me().await?;

    Dispatcher::builder(self.bot.clone(), self.handler)
      .dependencies(dptree::deps![self.context.clone(), me])
      .enable_ctrlc_handler()
      .build()
      .dispatch()
      .await;

    Ok(())
  }
}
