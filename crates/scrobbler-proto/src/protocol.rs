use serde::{Deserialize, Serialize};
use std::fmt;

use crate::connector::Connector;
use crate::mode::ControllerMode;
use crate::song::{PageState, SongInfo, SongPatch};

/// Current protocol version. Bump this when the wire format changes in a
/// breaking way. The host shim checks it in `Hello`.
pub const PROTOCOL_VERSION: u32 = 1;

/// Browser tab identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub u32);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Keyboard/UI shortcuts. They carry no tab id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    #[serde(rename = "toggle-connector")]
    ToggleConnector,
    #[serde(rename = "love-song")]
    LoveSong,
    #[serde(rename = "unlove-song")]
    UnloveSong,
}

impl Command {
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "toggle-connector" => Some(Self::ToggleConnector),
            "love-song" => Some(Self::LoveSong),
            "unlove-song" => Some(Self::UnloveSong),
            _ => None,
        }
    }

    pub fn id(self) -> &'static str {
        match self {
            Self::ToggleConnector => "toggle-connector",
            Self::LoveSong => "love-song",
            Self::UnloveSong => "unlove-song",
        }
    }
}

/// One-shot, tab-addressed requests from extension pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    GetTrack,
    GetConnectorLabel,
    CorrectTrack {
        data: SongPatch,
    },
    ToggleLove {
        #[serde(rename = "isLoved")]
        is_loved: bool,
    },
    SkipTrack,
    ResetTrack,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Track {
        song: Option<SongInfo>,
    },
    ConnectorLabel {
        label: String,
    },
    Loved {
        #[serde(rename = "isLoved")]
        is_loved: bool,
    },
    /// Request handled, nothing to return.
    Done,
    /// No session for the addressed tab, or nothing to report.
    Empty,
}

/// Fire-and-forget events on a tab's persistent connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PortEvent {
    StateChanged { data: PageState },
}

/// Browser tab lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TabEvent {
    Focused { tab_id: TabId },
    Navigated { tab_id: TabId, url: String },
    Closed { tab_id: TabId },
}

/// Outcome of trying to inject a connector into a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InjectResult {
    /// The page already runs the right connector.
    Injected,
    /// No connector for this page; any session for the tab is stale.
    NoMatch,
    /// The page was newly bound to a connector.
    Matched,
}

/// What the shared action icon shows for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionView {
    pub tab_id: TabId,
    pub mode: ControllerMode,
    pub label: String,
    pub song: Option<SongInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: u32,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum CallReply {
    Injection { result: InjectResult },
    Love { ok: bool, error: Option<String> },
}

/// Messages sent from the host shim to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg")]
pub enum HostMessage {
    Tab(TabEvent),
    Command {
        command: Command,
    },
    Request {
        request_id: u64,
        tab_id: TabId,
        request: Request,
    },
    Port {
        tab_id: TabId,
        event: PortEvent,
    },
    MenuClicked {
        item_id: u32,
    },
    /// Answer to a `DaemonMessage` that carried a `call_id`.
    Reply {
        call_id: u64,
        reply: CallReply,
    },
}

/// Messages sent from the daemon to the host shim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg")]
pub enum DaemonMessage {
    Hello {
        protocol_version: u32,
    },
    Response {
        request_id: u64,
        response: Response,
    },
    Render {
        view: ActionView,
    },
    ResetUi,
    LoveIndicator {
        is_loved: bool,
        song: Option<SongInfo>,
    },
    MenuRemoveAll,
    MenuAddItem {
        item: MenuItem,
    },
    TrackUpdated {
        tab_id: TabId,
        song: SongInfo,
    },
    Ready {
        tab_id: TabId,
    },
    Inject {
        call_id: u64,
        tab_id: TabId,
        connector: Option<Connector>,
    },
    ToggleLove {
        call_id: u64,
        song: SongInfo,
        is_loved: bool,
    },
    Log {
        message: String,
    },
}

/// Wrapper for socket communication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Host(HostMessage),
    Daemon(DaemonMessage),
}

impl Message {
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        let len = u32::try_from(json.len())?;
        let mut result = Vec::with_capacity(4 + json.len());
        result.extend_from_slice(&len.to_be_bytes());
        result.extend_from_slice(&json);
        Ok(result)
    }

    /// Decode one length-prefixed frame from the front of `data`.
    ///
    /// Returns `None` while the frame is incomplete. Otherwise returns the
    /// parse result together with the number of bytes the frame occupied, so
    /// a malformed frame can be skipped.
    pub fn decode(data: &[u8]) -> Option<(anyhow::Result<Self>, usize)> {
        if data.len() < 4 {
            return None;
        }
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if data.len() < 4 + len {
            return None;
        }
        let msg = serde_json::from_slice(&data[4..4 + len]).map_err(anyhow::Error::from);
        Some((msg, 4 + len))
    }
}

impl From<HostMessage> for Message {
    fn from(msg: HostMessage) -> Self {
        Message::Host(msg)
    }
}

impl From<DaemonMessage> for Message {
    fn from(msg: DaemonMessage) -> Self {
        Message::Daemon(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_frame_decode() {
        let msg = Message::from(HostMessage::Request {
            request_id: 7,
            tab_id: TabId(5),
            request: Request::ToggleLove { is_loved: true },
        });
        let encoded = msg.encode().unwrap();
        let (decoded, len) = Message::decode(&encoded).unwrap();
        assert_eq!(len, encoded.len());
        assert_eq!(decoded.unwrap(), msg);
    }

    #[test]
    fn test_partial_frame_waits_for_more() {
        let encoded = Message::from(DaemonMessage::ResetUi).encode().unwrap();
        assert!(Message::decode(&encoded[..2]).is_none());
        assert!(Message::decode(&encoded[..encoded.len() - 1]).is_none());
    }

    #[test]
    fn test_malformed_frame_is_skippable() {
        let body = b"{\"msg\":\"Nope\"}";
        let mut frame = (body.len() as u32).to_be_bytes().to_vec();
        frame.extend_from_slice(body);
        frame.extend(Message::from(DaemonMessage::ResetUi).encode().unwrap());

        let (first, used) = Message::decode(&frame).unwrap();
        assert!(first.is_err());
        let (second, _) = Message::decode(&frame[used..]).unwrap();
        assert_eq!(second.unwrap(), Message::Daemon(DaemonMessage::ResetUi));
    }

    #[test]
    fn test_command_ids() {
        let json = serde_json::to_string(&Command::ToggleConnector).unwrap();
        assert_eq!(json, "\"toggle-connector\"");
        assert_eq!(Command::from_id("unlove-song"), Some(Command::UnloveSong));
        assert_eq!(Command::from_id("love-song").map(Command::id), Some("love-song"));
        assert!(Command::from_id("play").is_none());
    }

    #[test]
    fn test_port_event_wire_shape() {
        let raw = r#"{"type":"StateChanged","data":{"artist":"A","track":"B","isPlaying":true}}"#;
        let PortEvent::StateChanged { data } = serde_json::from_str(raw).unwrap();
        assert_eq!(data.artist.as_deref(), Some("A"));
        assert!(data.is_playing);
    }
}
