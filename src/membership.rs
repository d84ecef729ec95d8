use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ChatMemberStatus;
use teloxide::types::Recipient;
use teloxide::types::UserId;
use tracing::instrument;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
  Authorized,
  Unauthorized,
  Indeterminate,
}

impl Membership {
  /// Fail closed: only an explicit membership opens the gate.
  pub fn allows(self) -> bool {
    matches!(self, Membership::Authorized)
  }
}

pub fn classify(status: ChatMemberStatus) -> Membership {
  match status {
    ChatMemberStatus::Owner | ChatMemberStatus::Administrator | ChatMemberStatus::Member => Membership::Authorized,
    _ => Membership::Unauthorized,
  }
}

/// Channel-membership gate. A transport failure or timeout yields
/// `Indeterminate`, which callers must treat like `Unauthorized`.
pub struct MembershipGate {
  channel: Recipient,
  timeout: Duration,
}

impl MembershipGate {
  pub fn new(channel: Recipient, timeout: Duration) -> Self {
    Self { channel, timeout }
  }

  #[instrument(skip(self, bot))]
  pub async fn check(&self, bot: &Bot, user: UserId) -> Membership {
    let request = bot.get_chat_member(self.channel.clone(), user);
    match tokio::time::timeout(self.timeout, request).await {
      Ok(Ok(member)) => classify(member.status()),
      Ok(Err(err)) => {
        warn!(error = %err, user_id = user.0, "membership lookup failed");
        Membership::Indeterminate
      },
      Err(_) => {
        warn!(user_id = user.0, "membership lookup timed out");
        Membership::Indeterminate
      },
    }
  }
}
