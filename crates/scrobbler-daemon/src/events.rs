use scrobbler_proto::connector::Connector;
use scrobbler_proto::mode::ControllerMode;
use scrobbler_proto::protocol::{Command, InjectResult, PortEvent, Request, Response, TabEvent, TabId};
use scrobbler_proto::song::SongInfo;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::orchestrator::TabsSnapshot;

// ── OrchestratorEvent ─────────────────────────────────────────────────────────

/// All inputs into the orchestrator loop.
#[derive(Debug)]
pub enum OrchestratorEvent {
    Tab(TabEvent),
    /// Result of an injection attempt started by a navigation.
    InjectionFinished {
        tab_id: TabId,
        /// Navigation generation the attempt belongs to.
        generation: u64,
        connector: Option<Connector>,
        result: InjectResult,
        /// Persisted enabled flag, read only for `Matched`.
        enabled: Option<bool>,
    },
    Session(SessionEvent),
    Command(Command),
    Request {
        tab_id: TabId,
        request: Request,
        reply: Option<oneshot::Sender<Response>>,
    },
    Port {
        tab_id: TabId,
        event: PortEvent,
    },
    MenuClicked {
        item_id: u32,
    },
    Snapshot(oneshot::Sender<TabsSnapshot>),
    Shutdown,
}

pub type EventSender = mpsc::UnboundedSender<OrchestratorEvent>;

// ── Session events ────────────────────────────────────────────────────────────

/// Something a controller wants the orchestrator to know.
#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub tab_id: TabId,
    /// Identifies the controller instance, so events from a replaced
    /// controller in the same tab can be told apart.
    pub session_id: u64,
    pub kind: SessionEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEventKind {
    SongUpdated,
    ModeChanged(ControllerMode),
    Controller(ControllerEvent),
}

/// Controller events forwarded untouched to registered listeners.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum ControllerEvent {
    NowPlaying { song: SongInfo },
    SongUnrecognized { song: SongInfo },
    SongSkipped { song: SongInfo },
    LoveToggled { is_loved: bool },
}

/// Handle a controller uses to publish its events.
#[derive(Debug, Clone)]
pub struct SessionEmitter {
    tab_id: TabId,
    session_id: u64,
    tx: EventSender,
}

impl SessionEmitter {
    pub fn new(tab_id: TabId, session_id: u64, tx: EventSender) -> Self {
        Self {
            tab_id,
            session_id,
            tx,
        }
    }

    pub fn emit(&self, kind: SessionEventKind) {
        // Receiver gone means the loop is shutting down
        let _ = self.tx.send(OrchestratorEvent::Session(SessionEvent {
            tab_id: self.tab_id,
            session_id: self.session_id,
            kind,
        }));
    }
}
