/// Single-owner event loop for all per-tab sessions.
///
/// Owns the tab → controller registry and the two tab pointers:
/// `current_tab` (browser focus) and `active_tab` (owner of the shared
/// action icon). Every input arrives as an `OrchestratorEvent` and is handled
/// to completion before the next one.
///
/// Slow calls (injection, settings reads, broadcasts, settings writes) run in
/// spawned tasks. Injection results come back as events tagged with the tab's
/// navigation generation, so a result for a tab that was closed or navigated
/// again in the meantime is dropped. Controller events carry their session id
/// for the same reason.
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use scrobbler_proto::connector::Connector;
use scrobbler_proto::mode::ControllerMode;
use scrobbler_proto::protocol::{
    Command, InjectResult, PortEvent, Request, Response, TabEvent, TabId,
};
use scrobbler_proto::song::{Song, SongInfo};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::collab::{Collaborators, OrchestratorListener};
use crate::controller::Controller;
use crate::events::{EventSender, OrchestratorEvent, SessionEmitter, SessionEvent, SessionEventKind};
use crate::menu::{MenuAction, MenuPlan};
use crate::ownership;

/// Registry state exposed over the HTTP API.
#[derive(Debug, Clone, Serialize)]
pub struct TabsSnapshot {
    pub current_tab: Option<TabId>,
    pub active_tab: Option<TabId>,
    pub sessions: Vec<SessionSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub tab_id: TabId,
    pub connector_id: String,
    pub label: String,
    pub enabled: bool,
    pub mode: ControllerMode,
    pub song: Option<SongInfo>,
}

pub struct Orchestrator {
    collab: Collaborators,
    listeners: Vec<Arc<dyn OrchestratorListener>>,
    sessions: BTreeMap<TabId, Controller>,
    current_tab: Option<TabId>,
    active_tab: Option<TabId>,
    /// Latest navigation generation per open tab.
    navigations: HashMap<TabId, u64>,
    next_generation: u64,
    next_session_id: u64,
    menu: MenuPlan,
    event_tx: EventSender,
}

impl Orchestrator {
    pub fn new(collab: Collaborators) -> (Self, mpsc::UnboundedReceiver<OrchestratorEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let orchestrator = Self {
            collab,
            listeners: Vec::new(),
            sessions: BTreeMap::new(),
            current_tab: None,
            active_tab: None,
            navigations: HashMap::new(),
            next_generation: 0,
            next_session_id: 0,
            menu: MenuPlan::default(),
            event_tx,
        };
        (orchestrator, event_rx)
    }

    /// Sender for feeding events into the loop.
    pub fn sender(&self) -> EventSender {
        self.event_tx.clone()
    }

    pub fn register_listener(&mut self, listener: Arc<dyn OrchestratorListener>) {
        self.listeners.push(listener);
    }

    pub fn current_tab(&self) -> Option<TabId> {
        self.current_tab
    }

    pub fn active_tab(&self) -> Option<TabId> {
        self.active_tab
    }

    pub fn session(&self, tab_id: TabId) -> Option<&Controller> {
        self.sessions.get(&tab_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn menu(&self) -> &MenuPlan {
        &self.menu
    }

    pub fn snapshot(&self) -> TabsSnapshot {
        TabsSnapshot {
            current_tab: self.current_tab,
            active_tab: self.active_tab,
            sessions: self
                .sessions
                .values()
                .map(|ctrl| SessionSnapshot {
                    tab_id: ctrl.tab_id(),
                    connector_id: ctrl.connector().id.clone(),
                    label: ctrl.connector().label.clone(),
                    enabled: ctrl.is_enabled(),
                    mode: ctrl.mode(),
                    song: ctrl.current_song().map(Song::info),
                })
                .collect(),
        }
    }

    /// Run the loop until `Shutdown` arrives or every sender is gone.
    pub async fn run(mut self, mut event_rx: mpsc::UnboundedReceiver<OrchestratorEvent>) {
        info!("Orchestrator: starting event loop");
        for listener in &self.listeners {
            listener.on_started();
        }

        while let Some(evt) = event_rx.recv().await {
            if matches!(evt, OrchestratorEvent::Shutdown) {
                info!("Orchestrator: shutdown requested");
                break;
            }
            self.handle(evt).await;
        }

        let tabs: Vec<TabId> = self.sessions.keys().copied().collect();
        for tab_id in tabs {
            self.unload(tab_id);
        }
        info!("Orchestrator: event loop stopped");
    }

    pub async fn handle(&mut self, evt: OrchestratorEvent) {
        match evt {
            OrchestratorEvent::Tab(TabEvent::Focused { tab_id }) => self.on_tab_focused(tab_id),
            OrchestratorEvent::Tab(TabEvent::Navigated { tab_id, url }) => {
                self.on_tab_navigated(tab_id, &url)
            }
            OrchestratorEvent::Tab(TabEvent::Closed { tab_id }) => self.on_tab_closed(tab_id),
            OrchestratorEvent::InjectionFinished {
                tab_id,
                generation,
                connector,
                result,
                enabled,
            } => self.on_injection_finished(tab_id, generation, connector, result, enabled),
            OrchestratorEvent::Session(evt) => self.on_session_event(evt),
            OrchestratorEvent::Command(cmd) => self.on_command(cmd).await,
            OrchestratorEvent::Request {
                tab_id,
                request,
                reply,
            } => {
                let response = self.on_request(tab_id, request).await;
                if let Some(reply) = reply {
                    let _ = reply.send(response);
                }
            }
            OrchestratorEvent::Port { tab_id, event } => self.on_port_event(tab_id, event),
            OrchestratorEvent::MenuClicked { item_id } => self.on_menu_clicked(item_id),
            OrchestratorEvent::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            OrchestratorEvent::Shutdown => {}
        }
    }

    // ── tab lifecycle ─────────────────────────────────────────────────────────

    fn on_tab_focused(&mut self, tab_id: TabId) {
        debug!("Orchestrator: focus → tab {}", tab_id);
        self.current_tab = Some(tab_id);
        if self.should_take_ownership(tab_id) {
            self.take_ownership(tab_id);
        }
        self.rebuild_menu(tab_id);
    }

    fn on_tab_navigated(&mut self, tab_id: TabId, url: &str) {
        let connector = self.collab.matcher.match_url(url);
        self.next_generation += 1;
        let generation = self.next_generation;
        self.navigations.insert(tab_id, generation);

        debug!(
            "Orchestrator: tab {} navigated, candidate {:?} (gen {})",
            tab_id,
            connector.as_ref().map(|c| &c.id),
            generation
        );

        let injector = Arc::clone(&self.collab.injector);
        let settings = Arc::clone(&self.collab.settings);
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = injector.inject(tab_id, connector.as_ref()).await;
            let enabled = match (&result, connector.as_ref()) {
                (InjectResult::Matched, Some(c)) => Some(settings.is_connector_enabled(c).await),
                _ => None,
            };
            let _ = tx.send(OrchestratorEvent::InjectionFinished {
                tab_id,
                generation,
                connector,
                result,
                enabled,
            });
        });
    }

    fn on_injection_finished(
        &mut self,
        tab_id: TabId,
        generation: u64,
        connector: Option<Connector>,
        result: InjectResult,
        enabled: Option<bool>,
    ) {
        if self.navigations.get(&tab_id) != Some(&generation) {
            debug!(
                "Orchestrator: dropping stale injection result for tab {} (gen {})",
                tab_id, generation
            );
            return;
        }

        match result {
            InjectResult::Injected => {}
            InjectResult::NoMatch => self.drop_stale_session(tab_id),
            InjectResult::Matched => {
                let Some(connector) = connector else {
                    warn!(
                        "Orchestrator: tab {} matched without a connector candidate",
                        tab_id
                    );
                    self.drop_stale_session(tab_id);
                    return;
                };
                self.create_session(tab_id, connector, enabled.unwrap_or(true));
            }
        }
    }

    /// The page in `tab_id` no longer has a connector.
    fn drop_stale_session(&mut self, tab_id: TabId) {
        let was_owner = self.active_tab == Some(tab_id);
        if self.unload(tab_id) {
            if was_owner {
                self.elect_and_refresh();
            } else if self.current_tab == Some(tab_id) {
                self.rebuild_menu(tab_id);
            }
        }
    }

    fn on_tab_closed(&mut self, tab_id: TabId) {
        debug!("Orchestrator: tab {} closed", tab_id);
        self.navigations.remove(&tab_id);
        let was_owner = self.active_tab == Some(tab_id);
        self.unload(tab_id);
        if was_owner {
            self.elect_and_refresh();
        }
    }

    fn create_session(&mut self, tab_id: TabId, connector: Connector, enabled: bool) {
        let was_owner = self.active_tab == Some(tab_id);
        self.unload(tab_id);

        self.next_session_id += 1;
        let session_id = self.next_session_id;
        info!(
            "Orchestrator: tab {} bound to {} (enabled: {})",
            tab_id, connector.label, enabled
        );
        let ctrl = Controller::new(
            session_id,
            tab_id,
            connector,
            enabled,
            Arc::clone(&self.collab.love),
            SessionEmitter::new(tab_id, session_id, self.event_tx.clone()),
        );
        self.sessions.insert(tab_id, ctrl);

        if was_owner {
            // The replacement session inherits ownership of its tab.
            self.take_ownership(tab_id);
        } else if self.should_take_ownership(tab_id) {
            self.take_ownership(tab_id);
        }
        self.rebuild_menu(self.current_tab.unwrap_or(tab_id));

        let notifier = Arc::clone(&self.collab.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.ready(tab_id).await {
                debug!("ready notification for tab {} not delivered: {}", tab_id, e);
            }
        });
    }

    /// Finish and drop the session for `tab_id`. Returns whether one existed.
    fn unload(&mut self, tab_id: TabId) -> bool {
        let Some(mut ctrl) = self.sessions.remove(&tab_id) else {
            return false;
        };
        ctrl.finish();
        if self.active_tab == Some(tab_id) {
            self.active_tab = None;
        }
        info!("Orchestrator: unloaded session for tab {}", tab_id);
        true
    }

    // ── ownership ─────────────────────────────────────────────────────────────

    fn should_take_ownership(&self, tab_id: TabId) -> bool {
        ownership::should_take_ownership(&self.sessions, self.active_tab, self.current_tab, tab_id)
    }

    /// Hand the shared UI to `tab_id`. A tab without a session cannot own it,
    /// so ownership is cleared instead.
    fn take_ownership(&mut self, tab_id: TabId) {
        if self.sessions.contains_key(&tab_id) {
            self.active_tab = Some(tab_id);
        } else {
            self.active_tab = None;
        }
        self.refresh_ui(Some(tab_id));
    }

    fn elect_and_refresh(&mut self) {
        self.active_tab = ownership::elect(&self.sessions, self.current_tab);
        info!("Orchestrator: elected owner {:?}", self.active_tab);
        match self.active_tab {
            Some(tab_id) => {
                self.refresh_ui(Some(tab_id));
                self.rebuild_menu(tab_id);
            }
            None => {
                self.collab.ui.reset();
                self.clear_menu();
            }
        }
    }

    fn refresh_ui(&self, tab_id: Option<TabId>) {
        match tab_id.and_then(|t| self.sessions.get(&t)) {
            Some(ctrl) => self.collab.ui.render(&ctrl.view()),
            None => self.collab.ui.reset(),
        }
    }

    // ── context menu ──────────────────────────────────────────────────────────

    fn rebuild_menu(&mut self, tab_id: TabId) {
        let owner = self.active_tab.and_then(|t| self.sessions.get(&t));
        let plan = MenuPlan::build(tab_id, self.sessions.get(&tab_id), owner);

        self.collab.menu.remove_all();
        for item in plan.items() {
            self.collab.menu.add_item(item);
        }
        self.menu = plan;
    }

    fn clear_menu(&mut self) {
        self.collab.menu.remove_all();
        self.menu = MenuPlan::default();
    }

    fn on_menu_clicked(&mut self, item_id: u32) {
        let Some(action) = self.menu.action(item_id).cloned() else {
            warn!("Orchestrator: click on unknown menu item {}", item_id);
            return;
        };
        let Some(menu_tab) = self.menu.tab_id else {
            return;
        };

        match action {
            MenuAction::ToggleConnector {
                tab_id,
                session_id,
                enable,
            } => {
                if self.live_session(tab_id, session_id) {
                    self.set_connector_enabled(tab_id, enable);
                } else {
                    warn!("Orchestrator: menu item for a gone session in tab {}", tab_id);
                }
            }
            MenuAction::DisableUntilTabClosed { tab_id, session_id } => {
                if self.live_session(tab_id, session_id) {
                    if let Some(ctrl) = self.sessions.get_mut(&tab_id) {
                        ctrl.set_enabled(false);
                    }
                } else {
                    warn!("Orchestrator: menu item for a gone session in tab {}", tab_id);
                }
            }
        }

        self.rebuild_menu(menu_tab);
        if self.should_take_ownership(menu_tab) {
            self.take_ownership(menu_tab);
        }
    }

    fn live_session(&self, tab_id: TabId, session_id: u64) -> bool {
        self.sessions
            .get(&tab_id)
            .map(|c| c.session_id() == session_id)
            .unwrap_or(false)
    }

    /// Flip a session's connector and persist the new flag in the background.
    fn set_connector_enabled(&mut self, tab_id: TabId, enabled: bool) {
        let Some(ctrl) = self.sessions.get_mut(&tab_id) else {
            return;
        };
        ctrl.set_enabled(enabled);
        info!(
            "Orchestrator: connector {} {}",
            ctrl.connector().id,
            if enabled { "enabled" } else { "disabled" }
        );

        let connector = ctrl.connector().clone();
        let settings = Arc::clone(&self.collab.settings);
        tokio::spawn(async move {
            if let Err(e) = settings.set_connector_enabled(&connector, enabled).await {
                error!("Failed to persist state of {}: {}", connector.id, e);
            }
        });
    }

    // ── session events ────────────────────────────────────────────────────────

    fn on_session_event(&mut self, evt: SessionEvent) {
        let SessionEvent {
            tab_id,
            session_id,
            kind,
        } = evt;
        if !self.live_session(tab_id, session_id) {
            debug!("Orchestrator: dropping event from unloaded session in tab {}", tab_id);
            return;
        }

        match kind {
            SessionEventKind::SongUpdated => {
                let Some(song) = self
                    .sessions
                    .get(&tab_id)
                    .and_then(|c| c.current_song())
                    .map(Song::info)
                else {
                    return;
                };
                let notifier = Arc::clone(&self.collab.notifier);
                tokio::spawn(async move {
                    // No listener is a normal situation
                    if let Err(e) = notifier.track_updated(tab_id, &song).await {
                        debug!("track update for tab {} not delivered: {}", tab_id, e);
                    }
                });
            }
            SessionEventKind::ModeChanged(mode) => {
                debug!("Orchestrator: tab {} mode changed to {:?}", tab_id, mode);
                if self.active_tab != Some(tab_id) {
                    if !self.should_take_ownership(tab_id) {
                        // Someone else keeps the shared UI
                        return;
                    }
                    self.active_tab = Some(tab_id);
                    if let Some(focused) = self.current_tab {
                        self.rebuild_menu(focused);
                    }
                }
                let current_mode = self
                    .sessions
                    .get(&tab_id)
                    .map(Controller::mode)
                    .unwrap_or(mode);
                if current_mode.is_inactive() {
                    self.refresh_ui(self.current_tab);
                } else {
                    self.refresh_ui(Some(tab_id));
                }
            }
            SessionEventKind::Controller(event) => {
                for listener in &self.listeners {
                    listener.on_controller_event(tab_id, &event);
                }
            }
        }
    }

    // ── inbound routing ───────────────────────────────────────────────────────

    async fn on_command(&mut self, cmd: Command) {
        let target = [self.active_tab, self.current_tab]
            .into_iter()
            .flatten()
            .find(|t| self.sessions.contains_key(t));
        let Some(tab_id) = target else {
            warn!("Orchestrator: no session to receive command {}", cmd.id());
            return;
        };
        info!("Orchestrator: command {} → tab {}", cmd.id(), tab_id);

        match cmd {
            Command::ToggleConnector => {
                let enabled = self
                    .sessions
                    .get(&tab_id)
                    .map(|c| !c.is_enabled())
                    .unwrap_or(true);
                self.set_connector_enabled(tab_id, enabled);
                if let Some(focused) = self.current_tab {
                    self.rebuild_menu(focused);
                }
            }
            Command::LoveSong | Command::UnloveSong => {
                let is_loved = cmd == Command::LoveSong;
                let Some(ctrl) = self.sessions.get_mut(&tab_id) else {
                    return;
                };
                if let Err(e) = ctrl.toggle_love(is_loved).await {
                    warn!("Orchestrator: {} failed for tab {}: {}", cmd.id(), tab_id, e);
                    return;
                }
                let song = self
                    .sessions
                    .get(&tab_id)
                    .and_then(|c| c.current_song())
                    .map(Song::info);
                self.collab.ui.set_love_indicator(is_loved, song.as_ref());
            }
        }
    }

    async fn on_request(&mut self, tab_id: TabId, request: Request) -> Response {
        let Some(ctrl) = self.sessions.get_mut(&tab_id) else {
            warn!(
                "Orchestrator: {:?} for tab {} which has no session",
                request, tab_id
            );
            return Response::Empty;
        };

        match request {
            Request::GetTrack => Response::Track {
                song: ctrl.current_song().map(Song::info),
            },
            Request::GetConnectorLabel => Response::ConnectorLabel {
                label: ctrl.connector().label.clone(),
            },
            Request::CorrectTrack { data } => {
                ctrl.set_user_song_data(&data);
                Response::Done
            }
            Request::ToggleLove { is_loved } => match ctrl.toggle_love(is_loved).await {
                Ok(()) => Response::Loved { is_loved },
                Err(e) => {
                    warn!("Orchestrator: love toggle failed for tab {}: {}", tab_id, e);
                    Response::Empty
                }
            },
            Request::SkipTrack => {
                ctrl.skip_current_song();
                Response::Done
            }
            Request::ResetTrack => {
                ctrl.reset_song_data();
                Response::Done
            }
        }
    }

    fn on_port_event(&mut self, tab_id: TabId, event: PortEvent) {
        let Some(ctrl) = self.sessions.get_mut(&tab_id) else {
            warn!("Orchestrator: port event for tab {} which has no session", tab_id);
            return;
        };
        match event {
            PortEvent::StateChanged { data } => ctrl.on_state_changed(data),
        }
    }
}
