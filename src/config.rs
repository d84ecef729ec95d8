use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use teloxide::types::ChatId;
use teloxide::types::Recipient;

const DEFAULT_CACHE_PATH: &str = "catalog_cache.json";
const DEFAULT_CATALOG_TTL_SECS: u64 = 300;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct Config {
  pub bot_token: String,
  pub catalog_url: String,
  pub catalog_token: Option<String>,
  pub required_channel: String,
  pub cache_path: PathBuf,
  pub catalog_ttl: Duration,
  pub fetch_timeout: Duration,
  pub admins: Vec<i64>,
}

impl Config {
  pub fn from_env() -> Result<Self> {
    let bot_token = env::var("BOT_TOKEN")
      .or_else(|_| env::var("TELOXIDE_TOKEN"))
      .context("BOT_TOKEN or TELOXIDE_TOKEN must be set")?;
    let catalog_url = env::var("CATALOG_URL").context("CATALOG_URL must be set")?;
    let catalog_token = env::var("CATALOG_TOKEN").ok().filter(|t| !t.trim().is_empty());
    let required_channel = env::var("REQUIRED_CHANNEL").context("REQUIRED_CHANNEL must be set")?;
    let cache_path = env::var("CACHE_PATH")
      .unwrap_or_else(|_| DEFAULT_CACHE_PATH.to_string())
      .into();
    let catalog_ttl = Duration::from_secs(parse_secs("CATALOG_TTL_SECS", DEFAULT_CATALOG_TTL_SECS));
    let fetch_timeout = Duration::from_secs(parse_secs("FETCH_TIMEOUT_SECS", DEFAULT_FETCH_TIMEOUT_SECS));
    let admins_raw = env::var("ADMIN_IDS").unwrap_or_default();
    let admins = parse_admins(&admins_raw);

    Ok(Self {
      bot_token,
      catalog_url,
      catalog_token,
      required_channel,
      cache_path,
      catalog_ttl,
      fetch_timeout,
      admins,
    })
  }
}

/// `@username` channels address by name, anything else must be a chat id.
pub fn parse_channel(raw: &str) -> Result<Recipient> {
  let trimmed = raw.trim();
  if trimmed.starts_with('@') {
    return Ok(Recipient::ChannelUsername(trimmed.to_string()));
  }
  match trimmed.parse::<i64>() {
    Ok(id) => Ok(Recipient::Id(ChatId(id))),
    Err(_) => bail!("REQUIRED_CHANNEL must be an @username or a numeric chat id, got '{raw}'"),
  }
}

fn parse_secs(var: &str, default: u64) -> u64 {
  match env::var(var) {
    Err(_) => default,
    Ok(raw) => match raw.trim().parse::<u64>() {
      Ok(value) => value,
      Err(err) => {
        tracing::warn!(var, value = raw.as_str(), error = %err, "invalid duration, using default");
        default
      },
    },
  }
}

fn parse_admins(raw: &str) -> Vec<i64> {
  raw
    .split(',')
    .filter_map(|id| {
      let trimmed = id.trim();
      if trimmed.is_empty() {
        return None;
      }
      match trimmed.parse::<i64>() {
        Ok(value) => Some(value),
        Err(err) => {
          tracing::warn!(value = trimmed, error = %err, "invalid ADMIN_IDS entry");
          None
        },
      }
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use teloxide::types::ChatId;
  use teloxide::types::Recipient;

  use super::parse_admins;
  use super::parse_channel;

  #[test]
  fn parses_valid_admins() {
    let admins = parse_admins("1, 2 ,3");
    assert_eq!(admins, vec![1, 2, 3]);
  }

  #[test]
  fn skips_invalid_entries() {
    let admins = parse_admins("42,abc,  7");
    assert_eq!(admins, vec![42, 7]);
  }

  #[test]
  fn empty_input_yields_empty_list() {
    let admins = parse_admins("");
    assert!(admins.is_empty());
  }

  #[test]
  fn channel_accepts_username_or_id() {
    assert_eq!(
      parse_channel("@streams").unwrap(),
      Recipient::ChannelUsername("@streams".to_string())
    );
    assert_eq!(
      parse_channel("-1001234567").unwrap(),
      Recipient::Id(ChatId(-1001234567))
    );
    assert!(parse_channel("not-a-channel").is_err());
  }
}
