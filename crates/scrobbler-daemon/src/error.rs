use scrobbler_proto::protocol::TabId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("controller for tab {0} is finished")]
    Finished(TabId),

    #[error("no current song in tab {0}")]
    NoSong(TabId),

    #[error("love service failed: {0}")]
    Love(String),
}

/// Failures talking to the browser-side host shim.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("host shim is not connected")]
    Disconnected,

    #[error("host call {0} timed out")]
    Timeout(u64),

    #[error("unexpected reply to host call {0}")]
    UnexpectedReply(u64),
}
