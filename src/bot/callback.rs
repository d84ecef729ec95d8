use crate::models::StreamProtocol;

/// Closed set of callback-data commands. Raw data is decoded exactly once at
/// the router boundary; handlers never re-parse strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackCommand {
  MainMenu,
  ShowChannels,
  SearchChannels,
  RequestAccess,
  Page(usize),
  Channel(String),
  Server(StreamProtocol, String),
}

impl CallbackCommand {
  /// Exact literals first, then known prefixes. Unknown data decodes to
  /// `None` and is dropped by the router.
  pub fn parse(data: &str) -> Option<Self> {
    match data {
      "main_menu" => return Some(Self::MainMenu),
      "show_channels" => return Some(Self::ShowChannels),
      "search_channels" => return Some(Self::SearchChannels),
      "request_access" => return Some(Self::RequestAccess),
      _ => {},
    }

    if let Some(name) = data.strip_prefix("channel_") {
      if name.is_empty() {
        return None;
      }
      return Some(Self::Channel(name.to_string()));
    }

    if let Some(rest) = data.strip_prefix("server_") {
      let (protocol, name) = rest.split_once('_')?;
      let protocol = StreamProtocol::parse(protocol)?;
      if name.is_empty() {
        return None;
      }
      return Some(Self::Server(protocol, name.to_string()));
    }

    if let Some(page) = data.strip_prefix("page_") {
      return page.parse().ok().map(Self::Page);
    }

    None
  }

  pub fn encode(&self) -> String {
    match self {
      Self::MainMenu => "main_menu".to_string(),
      Self::ShowChannels => "show_channels".to_string(),
      Self::SearchChannels => "search_channels".to_string(),
      Self::RequestAccess => "request_access".to_string(),
      Self::Page(page) => format!("page_{page}"),
      Self::Channel(name) => format!("channel_{name}"),
      Self::Server(protocol, name) => format!("server_{}_{name}", protocol.as_str()),
    }
  }
}
