#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scrobbler_daemon::collab::{
    ActionUi, Collaborators, ConnectorSettings, ContextMenu, InjectionGateway, LoveService,
    Notifier, OrchestratorListener,
};
use scrobbler_daemon::events::{ControllerEvent, OrchestratorEvent};
use scrobbler_daemon::orchestrator::Orchestrator;
use scrobbler_proto::connector::{Connector, ConnectorCatalog};
use scrobbler_proto::mode::ControllerMode;
use scrobbler_proto::protocol::{
    ActionView, Command, InjectResult, MenuItem, PortEvent, Request, Response, TabEvent, TabId,
};
use scrobbler_proto::song::{PageState, SongInfo};
use tokio::sync::{mpsc, oneshot};

pub const YOUTUBE: &str = "https://www.youtube.com/watch?v=abc";
pub const SPOTIFY: &str = "https://open.spotify.com/track/42";
pub const ELSEWHERE: &str = "https://example.com/";

// ── fakes ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum UiCall {
    Render { tab_id: TabId, mode: ControllerMode },
    Reset,
    Love(bool),
}

#[derive(Default)]
pub struct RecordingUi {
    pub calls: Mutex<Vec<UiCall>>,
}

impl RecordingUi {
    pub fn last(&self) -> Option<UiCall> {
        self.calls.lock().unwrap().last().cloned()
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl ActionUi for RecordingUi {
    fn render(&self, view: &ActionView) {
        self.calls.lock().unwrap().push(UiCall::Render {
            tab_id: view.tab_id,
            mode: view.mode,
        });
    }

    fn reset(&self) {
        self.calls.lock().unwrap().push(UiCall::Reset);
    }

    fn set_love_indicator(&self, is_loved: bool, _song: Option<&SongInfo>) {
        self.calls.lock().unwrap().push(UiCall::Love(is_loved));
    }
}

/// Mirrors what the browser would show.
#[derive(Default)]
pub struct RecordingMenu {
    pub items: Mutex<Vec<MenuItem>>,
    /// Number of times the menu was cleared, i.e. rebuilt.
    pub rebuilds: Mutex<usize>,
}

impl RecordingMenu {
    pub fn titles(&self) -> Vec<String> {
        self.items
            .lock()
            .unwrap()
            .iter()
            .map(|i| i.title.clone())
            .collect()
    }
}

impl ContextMenu for RecordingMenu {
    fn remove_all(&self) {
        self.items.lock().unwrap().clear();
        *self.rebuilds.lock().unwrap() += 1;
    }

    fn add_item(&self, item: &MenuItem) {
        self.items.lock().unwrap().push(item.clone());
    }
}

/// Matched when a connector was found, NoMatch otherwise, unless overridden.
#[derive(Default)]
pub struct FakeInjector {
    pub overrides: Mutex<HashMap<TabId, InjectResult>>,
}

#[async_trait]
impl InjectionGateway for FakeInjector {
    async fn inject(&self, tab_id: TabId, connector: Option<&Connector>) -> InjectResult {
        if let Some(result) = self.overrides.lock().unwrap().get(&tab_id) {
            return *result;
        }
        match connector {
            Some(_) => InjectResult::Matched,
            None => InjectResult::NoMatch,
        }
    }
}

#[derive(Default)]
pub struct FakeSettings {
    pub flags: Mutex<HashMap<String, bool>>,
    pub writes: Mutex<Vec<(String, bool)>>,
}

#[async_trait]
impl ConnectorSettings for FakeSettings {
    async fn is_connector_enabled(&self, connector: &Connector) -> bool {
        self.flags
            .lock()
            .unwrap()
            .get(&connector.id)
            .copied()
            .unwrap_or(true)
    }

    async fn set_connector_enabled(
        &self,
        connector: &Connector,
        enabled: bool,
    ) -> anyhow::Result<()> {
        self.flags
            .lock()
            .unwrap()
            .insert(connector.id.clone(), enabled);
        self.writes
            .lock()
            .unwrap()
            .push((connector.id.clone(), enabled));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub tracks: Mutex<Vec<(TabId, SongInfo)>>,
    pub ready: Mutex<Vec<TabId>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn track_updated(&self, tab_id: TabId, song: &SongInfo) -> anyhow::Result<()> {
        self.tracks.lock().unwrap().push((tab_id, song.clone()));
        Ok(())
    }

    async fn ready(&self, tab_id: TabId) -> anyhow::Result<()> {
        self.ready.lock().unwrap().push(tab_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeLove {
    pub calls: Mutex<Vec<(Option<String>, bool)>>,
}

#[async_trait]
impl LoveService for FakeLove {
    async fn toggle_love(&self, song: &SongInfo, is_loved: bool) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((song.track.clone(), is_loved));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingListener {
    pub events: Mutex<Vec<(TabId, ControllerEvent)>>,
}

impl OrchestratorListener for RecordingListener {
    fn on_controller_event(&self, tab_id: TabId, event: &ControllerEvent) {
        self.events.lock().unwrap().push((tab_id, event.clone()));
    }
}

// ── harness ───────────────────────────────────────────────────────────────────

pub struct Harness {
    pub orch: Orchestrator,
    rx: mpsc::UnboundedReceiver<OrchestratorEvent>,
    pub ui: Arc<RecordingUi>,
    pub menu: Arc<RecordingMenu>,
    pub injector: Arc<FakeInjector>,
    pub settings: Arc<FakeSettings>,
    pub notifier: Arc<RecordingNotifier>,
    pub love: Arc<FakeLove>,
    pub listener: Arc<RecordingListener>,
}

impl Harness {
    pub fn new() -> Self {
        let ui = Arc::new(RecordingUi::default());
        let menu = Arc::new(RecordingMenu::default());
        let injector = Arc::new(FakeInjector::default());
        let settings = Arc::new(FakeSettings::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let love = Arc::new(FakeLove::default());
        let listener = Arc::new(RecordingListener::default());

        let collab = Collaborators {
            matcher: Arc::new(ConnectorCatalog::builtin()),
            injector: injector.clone(),
            settings: settings.clone(),
            notifier: notifier.clone(),
            ui: ui.clone(),
            menu: menu.clone(),
            love: love.clone(),
        };
        let (mut orch, rx) = Orchestrator::new(collab);
        orch.register_listener(listener.clone());

        Self {
            orch,
            rx,
            ui,
            menu,
            injector,
            settings,
            notifier,
            love,
            listener,
        }
    }

    /// Handle `evt`, then everything it caused.
    pub async fn send(&mut self, evt: OrchestratorEvent) {
        self.orch.handle(evt).await;
        self.settle().await;
    }

    /// Drain follow-up events until the loop goes quiet.
    pub async fn settle(&mut self) {
        while let Ok(Some(evt)) =
            tokio::time::timeout(Duration::from_millis(20), self.rx.recv()).await
        {
            self.orch.handle(evt).await;
        }
    }

    pub async fn focus(&mut self, tab: u32) {
        self.send(OrchestratorEvent::Tab(TabEvent::Focused { tab_id: TabId(tab) }))
            .await;
    }

    pub async fn navigate(&mut self, tab: u32, url: &str) {
        self.send(OrchestratorEvent::Tab(TabEvent::Navigated {
            tab_id: TabId(tab),
            url: url.to_string(),
        }))
        .await;
    }

    pub async fn close(&mut self, tab: u32) {
        self.send(OrchestratorEvent::Tab(TabEvent::Closed { tab_id: TabId(tab) }))
            .await;
    }

    pub async fn play(&mut self, tab: u32, artist: &str, track: &str) {
        self.send(OrchestratorEvent::Port {
            tab_id: TabId(tab),
            event: PortEvent::StateChanged {
                data: PageState {
                    artist: Some(artist.to_string()),
                    track: Some(track.to_string()),
                    is_playing: true,
                    ..PageState::default()
                },
            },
        })
        .await;
    }

    /// The page stopped showing any track.
    pub async fn stop(&mut self, tab: u32) {
        self.send(OrchestratorEvent::Port {
            tab_id: TabId(tab),
            event: PortEvent::StateChanged {
                data: PageState::default(),
            },
        })
        .await;
    }

    pub async fn command(&mut self, command: Command) {
        self.send(OrchestratorEvent::Command(command)).await;
    }

    pub async fn request(&mut self, tab: u32, request: Request) -> Option<Response> {
        let (tx, rx) = oneshot::channel();
        self.send(OrchestratorEvent::Request {
            tab_id: TabId(tab),
            request,
            reply: Some(tx),
        })
        .await;
        rx.await.ok()
    }

    pub async fn click(&mut self, title: &str) {
        let id = self
            .menu
            .items
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.title == title)
            .map(|i| i.id)
            .unwrap_or_else(|| panic!("no menu item titled {:?}", title));
        self.send(OrchestratorEvent::MenuClicked { item_id: id }).await;
    }

    pub fn mode(&self, tab: u32) -> Option<ControllerMode> {
        self.orch.session(TabId(tab)).map(|c| c.mode())
    }

    pub fn owner(&self) -> Option<u32> {
        self.orch.active_tab().map(|t| t.0)
    }
}
