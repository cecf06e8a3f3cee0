/// Per-tab session state machine.
///
/// Holds the connector bound to the tab, the enabled flag, the current song
/// and the mode. Every observable change is published through its
/// `SessionEmitter`; the controller never reaches back into the orchestrator.
use std::sync::Arc;

use scrobbler_proto::connector::Connector;
use scrobbler_proto::mode::ControllerMode;
use scrobbler_proto::protocol::{ActionView, TabId};
use scrobbler_proto::song::{PageState, Song, SongPatch};
use tracing::{debug, info};

use crate::collab::LoveService;
use crate::error::ControllerError;
use crate::events::{ControllerEvent, SessionEmitter, SessionEventKind};

pub struct Controller {
    session_id: u64,
    tab_id: TabId,
    connector: Connector,
    enabled: bool,
    mode: ControllerMode,
    song: Option<Song>,
    love: Arc<dyn LoveService>,
    events: SessionEmitter,
    finished: bool,
}

impl Controller {
    pub fn new(
        session_id: u64,
        tab_id: TabId,
        connector: Connector,
        enabled: bool,
        love: Arc<dyn LoveService>,
        events: SessionEmitter,
    ) -> Self {
        let mode = if enabled {
            ControllerMode::Base
        } else {
            ControllerMode::Disabled
        };
        Self {
            session_id,
            tab_id,
            connector,
            enabled,
            mode,
            song: None,
            love,
            events,
            finished: false,
        }
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    pub fn connector(&self) -> &Connector {
        &self.connector
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn mode(&self) -> ControllerMode {
        self.mode
    }

    pub fn current_song(&self) -> Option<&Song> {
        self.song.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn view(&self) -> ActionView {
        ActionView {
            tab_id: self.tab_id,
            mode: self.mode,
            label: self.connector.label.clone(),
            song: self.song.as_ref().map(Song::info),
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.finished {
            return;
        }
        self.enabled = enabled;
        if enabled {
            self.set_mode(ControllerMode::Base);
        } else {
            self.song = None;
            self.set_mode(ControllerMode::Disabled);
        }
    }

    /// Entry point for raw page state coming over the tab's port.
    pub fn on_state_changed(&mut self, state: PageState) {
        if self.finished || !self.enabled {
            return;
        }

        if state.is_empty() {
            if self.song.take().is_some() {
                debug!("tab {}: song cleared", self.tab_id);
            }
            self.set_mode(ControllerMode::Base);
            return;
        }

        if let Some(song) = self.song.as_mut() {
            if state.track_key().as_deref() == Some(song.key()) {
                if song.update_playback(&state) {
                    self.events.emit(SessionEventKind::SongUpdated);
                }
                return;
            }
        }

        let Some(song) = Song::from_state(&state, &self.connector.label) else {
            return;
        };
        let info = song.info();
        let (mode, event) = if song.is_valid() {
            (ControllerMode::Playing, ControllerEvent::NowPlaying { song: info })
        } else {
            (
                ControllerMode::Unknown,
                ControllerEvent::SongUnrecognized { song: info },
            )
        };
        info!(
            "tab {}: new song {:?} - {:?}",
            self.tab_id,
            song.artist(),
            song.track()
        );
        self.song = Some(song);
        self.events.emit(SessionEventKind::SongUpdated);
        self.events.emit(SessionEventKind::Controller(event));
        self.set_mode(mode);
    }

    pub fn set_user_song_data(&mut self, patch: &SongPatch) {
        if self.finished {
            return;
        }
        let Some(song) = self.song.as_mut() else {
            debug!("tab {}: correction without a song", self.tab_id);
            return;
        };
        song.apply_patch(patch);
        let valid = song.is_valid();
        self.events.emit(SessionEventKind::SongUpdated);
        if valid && self.mode == ControllerMode::Unknown {
            self.set_mode(ControllerMode::Playing);
        }
    }

    /// Drop user corrections and fall back to what the page reported.
    pub fn reset_song_data(&mut self) {
        if self.finished {
            return;
        }
        let Some(song) = self.song.as_mut() else {
            return;
        };
        song.reset_user_data();
        let valid = song.is_valid();
        self.events.emit(SessionEventKind::SongUpdated);
        if !valid && self.mode == ControllerMode::Playing {
            self.set_mode(ControllerMode::Unknown);
        }
    }

    pub fn skip_current_song(&mut self) {
        if self.finished {
            return;
        }
        let Some(song) = self.song.as_mut() else {
            return;
        };
        song.flags.is_skipped = true;
        let info = song.info();
        self.events
            .emit(SessionEventKind::Controller(ControllerEvent::SongSkipped {
                song: info,
            }));
        self.set_mode(ControllerMode::Skipped);
    }

    pub async fn toggle_love(&mut self, is_loved: bool) -> Result<(), ControllerError> {
        if self.finished {
            return Err(ControllerError::Finished(self.tab_id));
        }
        let (key, info) = match self.song.as_ref() {
            Some(song) => (song.key().to_string(), song.info()),
            None => return Err(ControllerError::NoSong(self.tab_id)),
        };

        let love = Arc::clone(&self.love);
        love.toggle_love(&info, is_loved)
            .await
            .map_err(|e| ControllerError::Love(e.to_string()))?;

        // The song may have been replaced while the call was in flight
        if let Some(song) = self.song.as_mut().filter(|s| s.key() == key) {
            song.set_loved(is_loved);
            self.events.emit(SessionEventKind::SongUpdated);
        }
        self.events
            .emit(SessionEventKind::Controller(ControllerEvent::LoveToggled {
                is_loved,
            }));
        Ok(())
    }

    /// Release the session. Safe to call more than once.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.song = None;
        debug!("tab {}: controller finished", self.tab_id);
    }

    fn set_mode(&mut self, mode: ControllerMode) {
        if self.mode == mode {
            return;
        }
        debug!("tab {}: mode {:?} → {:?}", self.tab_id, self.mode, mode);
        self.mode = mode;
        self.events.emit(SessionEventKind::ModeChanged(mode));
    }
}
